//! The case lifecycle as a pure transition function.
//!
//! `next_status(current, trigger)` is the single source of truth for legal
//! transitions. The engine computes the trigger, applies the returned
//! status to the locked case record, persists, then emits the event.

use crate::{
    case::CaseStatus,
    error::{VerifyError, VerifyResult},
};

/// What happened to the case. Each trigger aims at exactly one target
/// status; whether it is allowed depends on the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First document accepted.
    FirstDocument,
    /// Hard sanctions hit during the initiation pre-screen.
    PreScreenHit,
    /// Assessment decision: auto-approve.
    AssessApprove,
    /// Assessment decision: manual review.
    AssessReview,
    /// A BLOCK-action compliance rule triggered at assessment time.
    Disqualify,
    ReviewerApprove,
    ReviewerReject,
    Expire,
}

impl Trigger {
    pub fn target(&self) -> CaseStatus {
        match self {
            Trigger::FirstDocument => CaseStatus::InProgress,
            Trigger::PreScreenHit => CaseStatus::Rejected,
            Trigger::AssessApprove => CaseStatus::Approved,
            Trigger::AssessReview => CaseStatus::RequiresManualReview,
            Trigger::Disqualify => CaseStatus::Rejected,
            Trigger::ReviewerApprove => CaseStatus::Approved,
            Trigger::ReviewerReject => CaseStatus::Rejected,
            Trigger::Expire => CaseStatus::Expired,
        }
    }
}

/// The only legal transitions. Everything else is `InvalidTransition` and
/// leaves the case untouched.
pub fn next_status(current: CaseStatus, trigger: Trigger) -> VerifyResult<CaseStatus> {
    use CaseStatus::*;
    use Trigger::*;

    let allowed = matches!(
        (current, trigger),
        (Pending, FirstDocument)
            | (Pending, PreScreenHit)
            | (InProgress, AssessApprove)
            | (InProgress, AssessReview)
            | (InProgress, Disqualify)
            | (InProgress, ReviewerApprove)
            | (InProgress, ReviewerReject)
            | (RequiresManualReview, ReviewerApprove)
            | (RequiresManualReview, ReviewerReject)
            | (Approved, Expire)
    );

    if allowed {
        Ok(trigger.target())
    } else {
        Err(VerifyError::InvalidTransition {
            from: current.as_str().to_string(),
            to: trigger.target().as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [CaseStatus; 6] = [
        CaseStatus::Pending,
        CaseStatus::InProgress,
        CaseStatus::RequiresManualReview,
        CaseStatus::Approved,
        CaseStatus::Rejected,
        CaseStatus::Expired,
    ];

    const ALL_TRIGGERS: [Trigger; 8] = [
        Trigger::FirstDocument,
        Trigger::PreScreenHit,
        Trigger::AssessApprove,
        Trigger::AssessReview,
        Trigger::Disqualify,
        Trigger::ReviewerApprove,
        Trigger::ReviewerReject,
        Trigger::Expire,
    ];

    #[test]
    fn exactly_ten_transitions_are_legal() {
        let mut legal = 0;
        for status in ALL_STATUSES {
            for trigger in ALL_TRIGGERS {
                if next_status(status, trigger).is_ok() {
                    legal += 1;
                }
            }
        }
        assert_eq!(legal, 10, "Transition table should have exactly 10 entries");
    }

    #[test]
    fn terminal_statuses_admit_nothing_but_expiry() {
        for status in [CaseStatus::Rejected, CaseStatus::Expired] {
            for trigger in ALL_TRIGGERS {
                assert!(
                    next_status(status, trigger).is_err(),
                    "{} + {:?} should be rejected",
                    status,
                    trigger
                );
            }
        }
        for trigger in ALL_TRIGGERS {
            let result = next_status(CaseStatus::Approved, trigger);
            if trigger == Trigger::Expire {
                assert_eq!(result.unwrap(), CaseStatus::Expired);
            } else {
                assert!(result.is_err(), "APPROVED + {:?} should be rejected", trigger);
            }
        }
    }

    #[test]
    fn manual_review_only_exits_through_a_reviewer() {
        for trigger in [
            Trigger::FirstDocument,
            Trigger::PreScreenHit,
            Trigger::AssessApprove,
            Trigger::AssessReview,
            Trigger::Disqualify,
            Trigger::Expire,
        ] {
            assert!(
                next_status(CaseStatus::RequiresManualReview, trigger).is_err(),
                "REQUIRES_MANUAL_REVIEW should not exit via {:?}",
                trigger
            );
        }
        assert_eq!(
            next_status(CaseStatus::RequiresManualReview, Trigger::ReviewerApprove).unwrap(),
            CaseStatus::Approved
        );
        assert_eq!(
            next_status(CaseStatus::RequiresManualReview, Trigger::ReviewerReject).unwrap(),
            CaseStatus::Rejected
        );
    }

    #[test]
    fn failed_transition_reports_both_ends() {
        let err = next_status(CaseStatus::Pending, Trigger::Expire).unwrap_err();
        match err {
            VerifyError::InvalidTransition { from, to } => {
                assert_eq!(from, "PENDING");
                assert_eq!(to, "EXPIRED");
            }
            other => panic!("Expected InvalidTransition, got {other:?}"),
        }
    }
}
