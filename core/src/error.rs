use thiserror::Error;

use crate::types::{CaseId, SubjectId};

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Case {0} not found")]
    CaseNotFound(CaseId),

    #[error("Subject '{subject_id}' already has an active case {case_id}")]
    DuplicateActiveCase {
        subject_id: SubjectId,
        case_id: CaseId,
    },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Case {case_id} is in state {status}; operation '{operation}' not allowed")]
    InvalidState {
        case_id: CaseId,
        status: String,
        operation: &'static str,
    },

    #[error("Case {case_id} already holds a '{doc_type}' document ({side} side)")]
    DuplicateDocument {
        case_id: CaseId,
        doc_type: String,
        side: String,
    },

    #[error("Document type '{doc_type}' is not accepted for tier '{tier}'")]
    UnexpectedDocumentType { doc_type: String, tier: String },

    #[error("Case {case_id} is missing required documents: {missing:?}")]
    MissingRequiredDocuments {
        case_id: CaseId,
        missing: Vec<String>,
    },

    #[error("Approving case {case_id} over a sanctions match requires an explicit risk override")]
    OverrideRequired { case_id: CaseId },

    #[error("Rejection requires a non-empty reason")]
    EmptyRejectionReason,

    #[error("KYB submission requires all declarations: {missing:?}")]
    DeclarationsIncomplete { missing: Vec<&'static str> },

    #[error("Operation '{operation}' does not apply to {kind} cases")]
    KindMismatch {
        kind: String,
        operation: &'static str,
    },

    #[error(
        "Adding {attempted_pct}% ownership would bring case {case_id} to {new_total_pct}% (cap 100%)"
    )]
    OwnershipExceeded {
        case_id: CaseId,
        attempted_pct: f64,
        new_total_pct: f64,
    },

    /// Screening transport failure. Retryable by the caller; the case is
    /// left in its last durable state.
    #[error("Screening unavailable for case {case_id}: {reason}")]
    ScreeningUnavailable { case_id: CaseId, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type VerifyResult<T> = Result<T, VerifyError>;
