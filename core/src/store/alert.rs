//! Compliance alert persistence and lifecycle.

use super::{parse_uuid, VerificationStore};
use crate::error::{VerifyError, VerifyResult};
use crate::rules::{AlertStatus, ComplianceAlert, RuleAction, RuleSeverity};
use crate::types::CaseId;
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::str::FromStr;
use uuid::Uuid;

/// An alert as stored, tied to the case it was raised on.
#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub case_id: CaseId,
    pub alert: ComplianceAlert,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
}

impl VerificationStore {
    pub fn insert_alert(&self, case_id: CaseId, alert: &ComplianceAlert) -> VerifyResult<()> {
        self.conn.execute(
            "INSERT INTO compliance_alert (
                alert_id, case_id, rule_id, rule_name, severity, action,
                description, details_json, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                alert.alert_id.to_string(),
                case_id.to_string(),
                alert.rule_id,
                alert.rule_name,
                alert.severity.as_str(),
                alert.action.as_str(),
                alert.description,
                serde_json::to_string(&alert.details)?,
                alert.status.as_str(),
                alert.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn alerts_for_case(&self, case_id: CaseId) -> VerifyResult<Vec<AlertRecord>> {
        self.query_alerts(
            "SELECT alert_id, case_id, rule_id, rule_name, severity, action,
                    description, details_json, status, created_at, resolved_at,
                    resolution_note
             FROM compliance_alert WHERE case_id = ?1
             ORDER BY created_at ASC, alert_id ASC",
            params![case_id.to_string()],
        )
    }

    pub fn open_alerts(&self) -> VerifyResult<Vec<AlertRecord>> {
        self.query_alerts(
            "SELECT alert_id, case_id, rule_id, rule_name, severity, action,
                    description, details_json, status, created_at, resolved_at,
                    resolution_note
             FROM compliance_alert WHERE status IN ('open', 'investigating')
             ORDER BY created_at ASC, alert_id ASC",
            [],
        )
    }

    /// Move an alert through its lifecycle. Resolution timestamps are set
    /// only for the two closed states.
    pub fn update_alert_status(
        &self,
        alert_id: Uuid,
        status: AlertStatus,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> VerifyResult<()> {
        let resolved_at = matches!(
            status,
            AlertStatus::Resolved | AlertStatus::FalsePositive
        )
        .then_some(now);
        let updated = self.conn.execute(
            "UPDATE compliance_alert
             SET status = ?2, resolved_at = ?3, resolution_note = ?4
             WHERE alert_id = ?1",
            params![alert_id.to_string(), status.as_str(), resolved_at, note],
        )?;
        if updated == 0 {
            return Err(VerifyError::Config(format!(
                "no alert with id {alert_id}"
            )));
        }
        Ok(())
    }

    fn query_alerts<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> VerifyResult<Vec<AlertRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(AlertRow {
                    alert_id: row.get(0)?,
                    case_id: row.get(1)?,
                    rule_id: row.get(2)?,
                    rule_name: row.get(3)?,
                    severity: row.get(4)?,
                    action: row.get(5)?,
                    description: row.get(6)?,
                    details_json: row.get(7)?,
                    status: row.get(8)?,
                    created_at: row.get(9)?,
                    resolved_at: row.get(10)?,
                    resolution_note: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(|r| r.into_record()).collect()
    }
}

struct AlertRow {
    alert_id: String,
    case_id: String,
    rule_id: String,
    rule_name: String,
    severity: String,
    action: String,
    description: String,
    details_json: String,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolution_note: Option<String>,
}

impl AlertRow {
    fn into_record(self) -> VerifyResult<AlertRecord> {
        let parse = |e: crate::case::ParseEnumError| VerifyError::Config(e.to_string());
        Ok(AlertRecord {
            case_id: parse_uuid(&self.case_id)?,
            alert: ComplianceAlert {
                alert_id: parse_uuid(&self.alert_id)?,
                rule_id: self.rule_id,
                rule_name: self.rule_name,
                severity: RuleSeverity::from_str(&self.severity).map_err(parse)?,
                action: RuleAction::from_str(&self.action).map_err(parse)?,
                description: self.description,
                details: serde_json::from_str(&self.details_json)?,
                status: AlertStatus::from_str(&self.status).map_err(parse)?,
                created_at: self.created_at,
            },
            resolved_at: self.resolved_at,
            resolution_note: self.resolution_note,
        })
    }
}
