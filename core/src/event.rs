//! Workflow events — the audit trail of every case.
//!
//! RULE: events are appended to the event log only after the case mutation
//! is durably persisted; bus publication happens last and is
//! fire-and-forget. A bus failure never rolls back a state change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::types::{CaseId, SubjectId};

/// Every event emitted by the verification workflow.
/// Variants are added as the lifecycle grows — never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaseEvent {
    // ── Lifecycle ──────────────────────────────────
    CaseInitiated {
        kind: String,
        tier: String,
    },
    PreScreenRejected {
        match_strength: f64,
        list_name: String,
    },
    VerificationStarted {
        first_document: String,
    },
    DocumentSubmitted {
        document_id: String,
        doc_type: String,
        side: String,
        quality: f64,
        fraud_risk: f64,
    },
    RequiredDocumentsComplete {
        document_count: usize,
    },
    RiskAssessed {
        score: f64,
        decision: String,
        sanctions_match: bool,
        pep_match: bool,
        screening_defaulted: bool,
    },
    MovedToManualReview {
        score: f64,
        reasons: Vec<String>,
    },
    AutoApproved {
        score: f64,
        expires_at: DateTime<Utc>,
    },
    AutoRejected {
        rule_name: String,
    },
    ReviewerApproved {
        reviewer: String,
        risk_override: bool,
        expires_at: DateTime<Utc>,
    },
    ReviewerRejected {
        reviewer: String,
        reason: String,
    },
    CaseExpired {
        expired_at: DateTime<Utc>,
    },

    // ── KYB ────────────────────────────────────────
    OwnerAdded {
        owner_id: String,
        ownership_pct: f64,
        is_ubo: bool,
    },
    StageAdvanced {
        stage: String,
    },

    // ── Sweeps ─────────────────────────────────────
    StaleCaseWarning {
        idle_days: i64,
        status: String,
    },
}

impl CaseEvent {
    /// The snake_case name used in the event log's `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            CaseEvent::CaseInitiated { .. } => "case_initiated",
            CaseEvent::PreScreenRejected { .. } => "pre_screen_rejected",
            CaseEvent::VerificationStarted { .. } => "verification_started",
            CaseEvent::DocumentSubmitted { .. } => "document_submitted",
            CaseEvent::RequiredDocumentsComplete { .. } => "required_documents_complete",
            CaseEvent::RiskAssessed { .. } => "risk_assessed",
            CaseEvent::MovedToManualReview { .. } => "moved_to_manual_review",
            CaseEvent::AutoApproved { .. } => "auto_approved",
            CaseEvent::AutoRejected { .. } => "auto_rejected",
            CaseEvent::ReviewerApproved { .. } => "reviewer_approved",
            CaseEvent::ReviewerRejected { .. } => "reviewer_rejected",
            CaseEvent::CaseExpired { .. } => "case_expired",
            CaseEvent::OwnerAdded { .. } => "owner_added",
            CaseEvent::StageAdvanced { .. } => "stage_advanced",
            CaseEvent::StaleCaseWarning { .. } => "stale_case_warning",
        }
    }
}

/// Envelope published to the bus and written to the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub case_id: CaseId,
    pub subject_id: SubjectId,
    pub event: CaseEvent,
    pub timestamp: DateTime<Utc>,
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub case_id: CaseId,
    pub subject_id: SubjectId,
    pub event_type: String,
    pub payload: String, // JSON-serialized CaseEvent
    pub created_at: DateTime<Utc>,
}

// ── Bus ──────────────────────────────────────────────────────────────────────

/// Fire-and-forget delivery. Implementations must not block the workflow;
/// failures are theirs to log.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: &WorkflowEvent);
}

/// Default bus: writes each event to the log output.
pub struct LogBus;

impl EventBus for LogBus {
    fn publish(&self, event: &WorkflowEvent) {
        log::info!(
            "event case={} subject={} type={}",
            event.case_id,
            event.subject_id,
            event.event.type_name()
        );
    }
}

/// Collecting bus for tests.
#[derive(Default)]
pub struct MemoryBus {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<WorkflowEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| e.event.type_name())
            .collect()
    }
}

impl EventBus for MemoryBus {
    fn publish(&self, event: &WorkflowEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
