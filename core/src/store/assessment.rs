//! Risk assessment persistence. Assessments are append-only; a case can be
//! re-assessed after new documents or owners arrive.

use super::VerificationStore;
use crate::case::{RiskAssessment, RiskDecision};
use crate::error::{VerifyError, VerifyResult};
use crate::types::CaseId;
use rusqlite::{params, OptionalExtension};
use std::str::FromStr;

impl VerificationStore {
    pub fn insert_assessment(
        &self,
        case_id: CaseId,
        assessment: &RiskAssessment,
    ) -> VerifyResult<()> {
        self.conn.execute(
            "INSERT INTO risk_assessment (
                case_id, score, decision, sanctions_match, pep_match,
                adverse_media_match, country_risk, screening_defaulted,
                factors_json, owner_scores_json, rule_contribution, assessed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                case_id.to_string(),
                assessment.score,
                assessment.decision.as_str(),
                assessment.sanctions_match as i32,
                assessment.pep_match as i32,
                assessment.adverse_media_match as i32,
                assessment.country_risk,
                assessment.screening_defaulted as i32,
                serde_json::to_string(&assessment.factors)?,
                serde_json::to_string(&assessment.owner_scores)?,
                assessment.rule_contribution,
                assessment.assessed_at,
            ],
        )?;
        Ok(())
    }

    pub fn latest_assessment(&self, case_id: CaseId) -> VerifyResult<Option<RiskAssessment>> {
        let row = self
            .conn
            .query_row(
                "SELECT score, decision, sanctions_match, pep_match, adverse_media_match,
                        country_risk, screening_defaulted, factors_json, owner_scores_json,
                        rule_contribution, assessed_at
                 FROM risk_assessment WHERE case_id = ?1
                 ORDER BY id DESC LIMIT 1",
                params![case_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, f64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i32>(2)? != 0,
                        row.get::<_, i32>(3)? != 0,
                        row.get::<_, i32>(4)? != 0,
                        row.get::<_, f64>(5)?,
                        row.get::<_, i32>(6)? != 0,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, f64>(9)?,
                        row.get::<_, chrono::DateTime<chrono::Utc>>(10)?,
                    ))
                },
            )
            .optional()?;

        row.map(
            |(
                score,
                decision,
                sanctions_match,
                pep_match,
                adverse_media_match,
                country_risk,
                screening_defaulted,
                factors_json,
                owner_scores_json,
                rule_contribution,
                assessed_at,
            )| {
                Ok(RiskAssessment {
                    score,
                    decision: RiskDecision::from_str(&decision)
                        .map_err(|e| VerifyError::Config(e.to_string()))?,
                    sanctions_match,
                    pep_match,
                    adverse_media_match,
                    country_risk,
                    screening_defaulted,
                    factors: serde_json::from_str(&factors_json)?,
                    owner_scores: serde_json::from_str(&owner_scores_json)?,
                    rule_contribution,
                    assessed_at,
                })
            },
        )
        .transpose()
    }
}
