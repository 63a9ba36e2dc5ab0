//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine calls store methods — it never executes SQL directly.

use crate::case::{
    CaseKind, CaseStatus, Declarations, KybStage, SubjectProfile, VerificationCase,
};
use crate::error::{VerifyError, VerifyResult};
use crate::event::EventLogEntry;
use crate::types::{CaseId, SubjectId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;

mod alert;
mod assessment;
mod document;
mod owner;

pub use alert::AlertRecord;

pub struct VerificationStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl VerificationStore {
    pub fn open(path: &str) -> VerifyResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> VerifyResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    /// For file-based databases, this opens the same file.
    pub fn reopen(&self) -> VerifyResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> VerifyResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_cases.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_documents.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_owners.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_assessments.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/005_alerts.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/006_event_log.sql"))?;
        Ok(())
    }

    // ── Cases ──────────────────────────────────────────────────

    pub fn insert_case(&self, case: &VerificationCase) -> VerifyResult<()> {
        self.conn.execute(
            "INSERT INTO verification_case (
                case_id, subject_id, kind, tier, status, stage, profile_json,
                declarations_json, risk_override, submitted_at, reviewed_by,
                reviewed_at, review_notes, rejection_reason, approved_at,
                expires_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                case.case_id.to_string(),
                case.subject_id,
                case.kind.kind_str(),
                case.kind.tier_str(),
                case.status.as_str(),
                case.stage.map(|s| s.as_str()),
                serde_json::to_string(&case.profile)?,
                serde_json::to_string(&case.declarations)?,
                case.risk_override as i32,
                case.submitted_at,
                case.reviewed_by,
                case.reviewed_at,
                case.review_notes,
                case.rejection_reason,
                case.approved_at,
                case.expires_at,
                case.created_at,
                case.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Persist the mutable half of a case row. Documents, owners, and
    /// assessments are written through their own methods.
    pub fn update_case(&self, case: &VerificationCase) -> VerifyResult<()> {
        self.conn.execute(
            "UPDATE verification_case SET
                status = ?2, stage = ?3, declarations_json = ?4,
                risk_override = ?5, submitted_at = ?6, reviewed_by = ?7,
                reviewed_at = ?8, review_notes = ?9, rejection_reason = ?10,
                approved_at = ?11, expires_at = ?12, updated_at = ?13
             WHERE case_id = ?1",
            params![
                case.case_id.to_string(),
                case.status.as_str(),
                case.stage.map(|s| s.as_str()),
                serde_json::to_string(&case.declarations)?,
                case.risk_override as i32,
                case.submitted_at,
                case.reviewed_by,
                case.reviewed_at,
                case.review_notes,
                case.rejection_reason,
                case.approved_at,
                case.expires_at,
                case.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Load a case with its documents, owners, and latest assessment.
    pub fn load_case(&self, case_id: CaseId) -> VerifyResult<Option<VerificationCase>> {
        let row = self
            .conn
            .query_row(
                "SELECT case_id, subject_id, kind, tier, status, stage, profile_json,
                        declarations_json, risk_override, submitted_at, reviewed_by,
                        reviewed_at, review_notes, rejection_reason, approved_at,
                        expires_at, created_at, updated_at
                 FROM verification_case WHERE case_id = ?1",
                params![case_id.to_string()],
                |row| {
                    Ok(CaseRow {
                        case_id: row.get(0)?,
                        subject_id: row.get(1)?,
                        kind: row.get(2)?,
                        tier: row.get(3)?,
                        status: row.get(4)?,
                        stage: row.get(5)?,
                        profile_json: row.get(6)?,
                        declarations_json: row.get(7)?,
                        risk_override: row.get::<_, i32>(8)? != 0,
                        submitted_at: row.get(9)?,
                        reviewed_by: row.get(10)?,
                        reviewed_at: row.get(11)?,
                        review_notes: row.get(12)?,
                        rejection_reason: row.get(13)?,
                        approved_at: row.get(14)?,
                        expires_at: row.get(15)?,
                        created_at: row.get(16)?,
                        updated_at: row.get(17)?,
                    })
                },
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut case = self.hydrate(row)?;
        case.documents = self.documents_for_case(case.case_id)?;
        case.owners = self.owners_for_case(case.case_id)?;
        case.assessment = self.latest_assessment(case.case_id)?;
        Ok(Some(case))
    }

    fn hydrate(&self, row: CaseRow) -> VerifyResult<VerificationCase> {
        let case_id = parse_uuid(&row.case_id)?;
        let kind = CaseKind::from_parts(&row.kind, &row.tier)
            .map_err(|e| VerifyError::Config(e.to_string()))?;
        let status = CaseStatus::from_str(&row.status)
            .map_err(|e| VerifyError::Config(e.to_string()))?;
        let stage = row
            .stage
            .as_deref()
            .map(KybStage::from_str)
            .transpose()
            .map_err(|e| VerifyError::Config(e.to_string()))?;
        let profile: SubjectProfile = serde_json::from_str(&row.profile_json)?;
        let declarations: Declarations = match row.declarations_json {
            Some(json) => serde_json::from_str(&json)?,
            None => Declarations::default(),
        };
        Ok(VerificationCase {
            case_id,
            subject_id: row.subject_id,
            kind,
            profile,
            status,
            stage,
            documents: Vec::new(),
            owners: Vec::new(),
            assessment: None,
            declarations,
            risk_override: row.risk_override,
            submitted_at: row.submitted_at,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            review_notes: row.review_notes,
            rejection_reason: row.rejection_reason,
            approved_at: row.approved_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    /// Any open case, or an approved case that has not yet expired, blocks
    /// a second case for the same subject.
    pub fn find_active_case(
        &self,
        subject_id: &SubjectId,
        now: DateTime<Utc>,
    ) -> VerifyResult<Option<CaseId>> {
        let id: Option<String> = self
            .conn
            .query_row(
                "SELECT case_id FROM verification_case
                 WHERE subject_id = ?1
                   AND (status IN ('PENDING', 'IN_PROGRESS', 'REQUIRES_MANUAL_REVIEW')
                        OR (status = 'APPROVED' AND (expires_at IS NULL OR expires_at > ?2)))
                 ORDER BY created_at DESC LIMIT 1",
                params![subject_id, now],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|s| parse_uuid(&s)).transpose()
    }

    pub fn case_ids_by_status(&self, status: CaseStatus) -> VerifyResult<Vec<CaseId>> {
        let mut stmt = self.conn.prepare(
            "SELECT case_id FROM verification_case WHERE status = ?1 ORDER BY created_at ASC",
        )?;
        let ids = stmt
            .query_map(params![status.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids.iter().map(|s| parse_uuid(s)).collect()
    }

    /// Approved cases whose validity window has closed.
    pub fn expired_case_ids(&self, now: DateTime<Utc>) -> VerifyResult<Vec<CaseId>> {
        let mut stmt = self.conn.prepare(
            "SELECT case_id FROM verification_case
             WHERE status = 'APPROVED' AND expires_at IS NOT NULL AND expires_at <= ?1
             ORDER BY expires_at ASC",
        )?;
        let ids = stmt
            .query_map(params![now], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids.iter().map(|s| parse_uuid(s)).collect()
    }

    /// Open cases untouched since the cutoff, oldest first.
    pub fn stale_case_ids(
        &self,
        cutoff: DateTime<Utc>,
    ) -> VerifyResult<Vec<(CaseId, DateTime<Utc>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT case_id, updated_at FROM verification_case
             WHERE status IN ('PENDING', 'IN_PROGRESS', 'REQUIRES_MANUAL_REVIEW')
               AND updated_at <= ?1
             ORDER BY updated_at ASC",
        )?;
        let rows = stmt
            .query_map(params![cutoff], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, DateTime<Utc>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, at)| Ok((parse_uuid(&id)?, at)))
            .collect()
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> VerifyResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (case_id, subject_id, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.case_id.to_string(),
                entry.subject_id,
                entry.event_type,
                entry.payload,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_case(&self, case_id: CaseId) -> VerifyResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, case_id, subject_id, event_type, payload, created_at
             FROM event_log WHERE case_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![case_id.to_string()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, DateTime<Utc>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        entries
            .into_iter()
            .map(|(id, case_id, subject_id, event_type, payload, created_at)| {
                Ok(EventLogEntry {
                    id: Some(id),
                    case_id: parse_uuid(&case_id)?,
                    subject_id,
                    event_type,
                    payload,
                    created_at,
                })
            })
            .collect()
    }

    // ── Caseload metrics ───────────────────────────────────────

    /// Point-in-time caseload snapshot for operational logging.
    pub fn caseload_metrics(&self) -> VerifyResult<CaseloadMetrics> {
        let count_status = |status: &str| -> VerifyResult<i64> {
            Ok(self.conn.query_row(
                "SELECT COUNT(*) FROM verification_case WHERE status = ?1",
                params![status],
                |row| row.get(0),
            )?)
        };
        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM verification_case",
            [],
            |row| row.get(0),
        )?;
        let open_alerts: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM compliance_alert WHERE status IN ('open', 'investigating')",
            [],
            |row| row.get(0),
        )?;
        let mean_score: Option<f64> = self.conn.query_row(
            "SELECT AVG(score) FROM risk_assessment a
             WHERE a.id = (SELECT MAX(id) FROM risk_assessment b WHERE b.case_id = a.case_id)",
            [],
            |row| row.get(0),
        )?;
        Ok(CaseloadMetrics {
            total_cases: total,
            pending: count_status("PENDING")?,
            in_progress: count_status("IN_PROGRESS")?,
            manual_review: count_status("REQUIRES_MANUAL_REVIEW")?,
            approved: count_status("APPROVED")?,
            rejected: count_status("REJECTED")?,
            expired: count_status("EXPIRED")?,
            open_alerts,
            mean_risk_score: mean_score,
        })
    }
}

pub(crate) fn parse_uuid(s: &str) -> VerifyResult<CaseId> {
    uuid::Uuid::parse_str(s).map_err(|e| VerifyError::Config(format!("bad uuid '{s}': {e}")))
}

// ── Row structs ────────────────────────────────────────────────

struct CaseRow {
    case_id: String,
    subject_id: String,
    kind: String,
    tier: String,
    status: String,
    stage: Option<String>,
    profile_json: String,
    declarations_json: Option<String>,
    risk_override: bool,
    submitted_at: Option<DateTime<Utc>>,
    reviewed_by: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    review_notes: Option<String>,
    rejection_reason: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CaseloadMetrics {
    pub total_cases: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub manual_review: i64,
    pub approved: i64,
    pub rejected: i64,
    pub expired: i64,
    pub open_alerts: i64,
    pub mean_risk_score: Option<f64>,
}
