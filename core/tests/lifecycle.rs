//! KYC lifecycle integration tests.
//!
//! Tests cover: the basic-tier happy path, document gating, duplicate
//! protection, pre-screen rejection, reviewer decisions, screening
//! degradation, and the audit event trail.

use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use image::{ImageBuffer, ImageFormat, Rgb};

use veriflow_core::capture::MemoryCapture;
use veriflow_core::case::{
    CaseKind, CaseStatus, Declarations, DocumentSide, DocumentType, IndividualProfile,
    KycTier, SubjectProfile,
};
use veriflow_core::clock::FixedClock;
use veriflow_core::config::VerificationConfig;
use veriflow_core::engine::{
    DocumentUpload, InitiateRequest, ReviewDecision, VerificationEngine,
};
use veriflow_core::error::VerifyError;
use veriflow_core::event::MemoryBus;
use veriflow_core::metrics::NullMetrics;
use veriflow_core::rules::{builtin_rules, RuleAction, RuleEngine};
use veriflow_core::screening::{
    BusinessQuery, IndividualQuery, ScreeningError, ScreeningProvider, ScreeningResult,
    StaticScreening, WatchlistScreening,
};
use veriflow_core::store::VerificationStore;

fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn build_engine(
    screening: Box<dyn ScreeningProvider>,
) -> (VerificationEngine, Arc<MemoryBus>, Arc<FixedClock>) {
    let store = VerificationStore::in_memory().expect("open in-memory store");
    store.migrate().expect("run migrations");
    let bus = Arc::new(MemoryBus::new());
    let clock = Arc::new(FixedClock::new(start_time()));
    let engine = VerificationEngine::new(
        store,
        VerificationConfig::default(),
        RuleEngine::new(builtin_rules()),
        screening,
        Box::new(MemoryCapture::new()),
        bus.clone(),
        Arc::new(NullMetrics),
        clock.clone(),
    );
    (engine, bus, clock)
}

fn kyc_request(subject: &str, name: &str) -> InitiateRequest {
    InitiateRequest {
        subject_id: subject.to_string(),
        kind: CaseKind::Kyc(KycTier::Basic),
        profile: SubjectProfile::Individual(IndividualProfile {
            full_name: name.to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1991, 6, 14),
            nationality: Some("US".into()),
            residence_country: Some("US".into()),
            address: Some("12 Harbor Lane".into()),
        }),
    }
}

fn encode_png(img: ImageBuffer<Rgb<u8>, Vec<u8>>) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Card-aspect frame with fine checkerboard text bands; scores well above
/// the document-quality floor.
fn crisp_png() -> Vec<u8> {
    encode_png(ImageBuffer::from_fn(400, 260, |x, y| {
        if y % 40 < 16 && (x + y) % 2 == 0 {
            Rgb([20u8, 20, 20])
        } else {
            Rgb([235u8, 235, 235])
        }
    }))
}

/// Featureless frame; scores far below the quality floor.
fn flat_png() -> Vec<u8> {
    encode_png(ImageBuffer::from_pixel(100, 100, Rgb([128u8, 128, 128])))
}

/// Single-channel card frame with an editing-tool byte signature appended
/// after the image data; fraud risk lands at 0.9.
fn forged_png() -> Vec<u8> {
    let mut bytes = encode_png(ImageBuffer::from_pixel(200, 140, Rgb([220u8, 30, 30])));
    bytes.extend_from_slice(b"photoshop");
    bytes
}

fn upload(doc_type: DocumentType, bytes: Vec<u8>) -> DocumentUpload {
    DocumentUpload {
        doc_type,
        side: DocumentSide::Front,
        file_name: format!("{}.png", doc_type.as_str().to_lowercase()),
        mime_type: "image/png".into(),
        bytes,
    }
}

fn approve(reviewer: &str, risk_override: bool) -> ReviewDecision {
    ReviewDecision {
        reviewer: reviewer.to_string(),
        approve: true,
        notes: None,
        rejection_reason: None,
        risk_override,
    }
}

fn reject(reviewer: &str, reason: Option<&str>) -> ReviewDecision {
    ReviewDecision {
        reviewer: reviewer.to_string(),
        approve: false,
        notes: None,
        rejection_reason: reason.map(String::from),
        risk_override: false,
    }
}

/// Clean subject, basic tier, two good documents: the case should approve
/// itself without a human and carry a one-year validity window.
#[test]
fn kyc_basic_happy_path_auto_approves() {
    let (engine, bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine.initiate(kyc_request("subj-happy", "Alice Morgan")).unwrap();
    assert_eq!(case.status, CaseStatus::Pending);
    assert!(case.stage.is_none(), "KYC cases carry no KYB stage");

    let case = engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    assert_eq!(
        case.status,
        CaseStatus::InProgress,
        "First document should start verification"
    );

    let case = engine
        .submit_document(case.case_id, upload(DocumentType::Selfie, crisp_png()))
        .unwrap();
    assert_eq!(case.status, CaseStatus::Approved, "Clean case should auto-approve");

    let assessment = case.assessment.expect("assessment recorded");
    assert!(
        assessment.score > 0.95,
        "Expected top-band score, got {}",
        assessment.score
    );
    assert_eq!(assessment.rule_contribution, 0.0, "No rules should trigger");
    assert_eq!(
        case.expires_at,
        Some(start_time() + chrono::Duration::days(365)),
        "Basic KYC approval is valid for one year"
    );
    assert!(case.approved_at.is_some());

    let names = bus.type_names();
    assert!(names.contains(&"auto_approved"), "Events published: {names:?}");
}

/// The event log is the audit trail; the happy path must leave a complete,
/// ordered record.
#[test]
fn event_log_records_the_full_lifecycle() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine.initiate(kyc_request("subj-log", "Alice Morgan")).unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::Selfie, crisp_png()))
        .unwrap();

    let events = engine.events_for_case(case.case_id).unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "case_initiated",
            "document_submitted",
            "verification_started",
            "document_submitted",
            "required_documents_complete",
            "risk_assessed",
            "auto_approved",
        ],
        "Unexpected event trail"
    );
    assert!(
        events.iter().all(|e| e.id.is_some()),
        "Persisted events carry row ids"
    );
}

/// A subject with an open case cannot open another one.
#[test]
fn duplicate_active_case_is_refused() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let first = engine.initiate(kyc_request("subj-dup", "Alice Morgan")).unwrap();
    let err = engine
        .initiate(kyc_request("subj-dup", "Alice Morgan"))
        .unwrap_err();
    match err {
        VerifyError::DuplicateActiveCase { case_id, .. } => {
            assert_eq!(case_id, first.case_id, "Error should name the open case")
        }
        other => panic!("Expected DuplicateActiveCase, got {other:?}"),
    }
}

/// A rejected case is not active; the subject may start over.
#[test]
fn rejected_subject_can_reinitiate() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine.initiate(kyc_request("subj-again", "Alice Morgan")).unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    engine
        .review(case.case_id, reject("lena.k", Some("documents do not match subject")))
        .unwrap();

    let second = engine.initiate(kyc_request("subj-again", "Alice Morgan")).unwrap();
    assert_ne!(second.case_id, case.case_id);
    assert_eq!(second.status, CaseStatus::Pending);
}

/// Same type and side twice is a client error, not an overwrite.
#[test]
fn duplicate_document_is_refused() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine.initiate(kyc_request("subj-double", "Alice Morgan")).unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    let err = engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap_err();
    assert!(
        matches!(err, VerifyError::DuplicateDocument { .. }),
        "Expected DuplicateDocument, got {err:?}"
    );

    let case = engine.case(case.case_id).unwrap();
    assert_eq!(case.documents.len(), 1, "The rejected upload must not persist");
}

/// The tier decides which document types are acceptable at all.
#[test]
fn document_outside_the_tier_is_refused() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine.initiate(kyc_request("subj-tier", "Alice Morgan")).unwrap();
    let err = engine
        .submit_document(case.case_id, upload(DocumentType::TaxReturn, crisp_png()))
        .unwrap_err();
    assert!(
        matches!(err, VerifyError::UnexpectedDocumentType { .. }),
        "Basic tier does not accept tax returns: {err:?}"
    );
}

/// Approval freezes the case; even optional documents bounce afterwards.
#[test]
fn terminal_case_refuses_further_documents() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine.initiate(kyc_request("subj-done", "Alice Morgan")).unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    let case = engine
        .submit_document(case.case_id, upload(DocumentType::Selfie, crisp_png()))
        .unwrap();
    assert_eq!(case.status, CaseStatus::Approved);

    let err = engine
        .submit_document(case.case_id, upload(DocumentType::Passport, crisp_png()))
        .unwrap_err();
    assert!(
        matches!(err, VerifyError::InvalidState { .. }),
        "Approved case must refuse documents: {err:?}"
    );
}

/// Poor legibility costs the quality deduction and routes to a human; the
/// low-quality rule also leaves an alert for the reviewer.
#[test]
fn low_quality_documents_route_to_manual_review() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine.initiate(kyc_request("subj-blurry", "Alice Morgan")).unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, flat_png()))
        .unwrap();
    let case = engine
        .submit_document(case.case_id, upload(DocumentType::Selfie, flat_png()))
        .unwrap();

    assert_eq!(case.status, CaseStatus::RequiresManualReview);
    let assessment = case.assessment.expect("assessment recorded");
    assert!(
        assessment.score < 0.95,
        "Quality deduction should apply, got {}",
        assessment.score
    );
    assert!(
        assessment
            .factors
            .iter()
            .any(|f| f.contains("mean document quality")),
        "Reviewer must see the quality factor: {:?}",
        assessment.factors
    );

    let alerts = engine.alerts_for_case(case.case_id).unwrap();
    assert!(
        alerts.iter().any(|a| a.alert.rule_id == "kyc_low_doc_quality"),
        "Low-quality rule should alert: {alerts:?}"
    );
    assert_eq!(assessment.rule_contribution, 0.2, "One medium rule triggered");
}

/// Fraud indicators above tolerance hit the blocking rule: the case is
/// rejected automatically with the rule named in the reason.
#[test]
fn forged_document_disqualifies_the_case() {
    let (engine, bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine.initiate(kyc_request("subj-forged", "Alice Morgan")).unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    let case = engine
        .submit_document(case.case_id, upload(DocumentType::Selfie, forged_png()))
        .unwrap();

    assert_eq!(case.status, CaseStatus::Rejected, "Blocking rule must reject");
    let reason = case.rejection_reason.expect("rejection reason recorded");
    assert!(
        reason.contains("disqualified by rule"),
        "Reason should name the rule: {reason}"
    );
    assert!(bus.type_names().contains(&"auto_rejected"));

    let alerts = engine.alerts_for_case(case.case_id).unwrap();
    assert!(
        alerts
            .iter()
            .any(|a| a.alert.rule_id == "kyc_forged_document"
                && a.alert.action == RuleAction::Block),
        "Blocking alert should persist: {alerts:?}"
    );
}

/// An exact sanctions hit at initiation rejects the case before any
/// document is requested. The rejected case is still returned and audited.
#[test]
fn pre_screen_hard_hit_rejects_at_initiation() {
    let (engine, bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine.initiate(kyc_request("subj-listed", "Viktor Bout")).unwrap();
    assert_eq!(case.status, CaseStatus::Rejected);
    assert_eq!(
        case.rejection_reason.as_deref(),
        Some("pre-screen sanctions hit")
    );

    let names = bus.type_names();
    assert!(names.contains(&"pre_screen_rejected"), "Events: {names:?}");

    let alerts = engine.alerts_for_case(case.case_id).unwrap();
    assert_eq!(alerts.len(), 2, "Exact and fuzzy sanction rules both alert");
}

/// A fuzzy sanctions hit is below the hard threshold: the case stays
/// pending with an alert, and the later assessment routes it to a human.
#[test]
fn fuzzy_sanctions_hit_stays_pending_then_reviews() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    // Token overlap with "Viktor Bout" at strength 0.8: flagged, not exact.
    let case = engine
        .initiate(kyc_request("subj-fuzzy", "Viktor Bout Jr"))
        .unwrap();
    assert_eq!(
        case.status,
        CaseStatus::Pending,
        "Sub-threshold hit must not hard-reject"
    );
    let alerts = engine.alerts_for_case(case.case_id).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert.rule_id, "sanctions_fuzzy_hit");

    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    let case = engine
        .submit_document(case.case_id, upload(DocumentType::Selfie, crisp_png()))
        .unwrap();
    assert_eq!(
        case.status,
        CaseStatus::RequiresManualReview,
        "Sanctions flag must land with a human, never auto-resolve"
    );
    assert!(case.assessment.unwrap().sanctions_match);
}

/// Approving over a sanctions flag demands an explicit override.
#[test]
fn sanctions_approval_requires_an_override() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine
        .initiate(kyc_request("subj-override", "Viktor Bout Jr"))
        .unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::Selfie, crisp_png()))
        .unwrap();

    let err = engine
        .review(case.case_id, approve("maria.c", false))
        .unwrap_err();
    assert!(
        matches!(err, VerifyError::OverrideRequired { .. }),
        "Plain approval must bounce: {err:?}"
    );

    let case = engine.review(case.case_id, approve("maria.c", true)).unwrap();
    assert_eq!(case.status, CaseStatus::Approved);
    assert!(case.risk_override, "The override must be recorded on the case");
    assert_eq!(case.reviewed_by.as_deref(), Some("maria.c"));
}

/// Rejections always carry a non-empty reason.
#[test]
fn rejection_requires_a_reason() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine.initiate(kyc_request("subj-reason", "Alice Morgan")).unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, flat_png()))
        .unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::Selfie, flat_png()))
        .unwrap();

    for bad in [None, Some(""), Some("   ")] {
        let err = engine.review(case.case_id, reject("lena.k", bad)).unwrap_err();
        assert!(
            matches!(err, VerifyError::EmptyRejectionReason),
            "Reason {bad:?} must be refused"
        );
    }

    let case = engine
        .review(case.case_id, reject("lena.k", Some("illegible documents")))
        .unwrap();
    assert_eq!(case.status, CaseStatus::Rejected);
    assert_eq!(case.rejection_reason.as_deref(), Some("illegible documents"));
}

/// A reviewer may close a case that is still collecting documents.
#[test]
fn reviewer_can_preempt_an_in_progress_case() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));

    let case = engine.initiate(kyc_request("subj-preempt", "Alice Morgan")).unwrap();
    let case = engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    assert_eq!(case.status, CaseStatus::InProgress);

    let case = engine
        .review(case.case_id, reject("lena.k", Some("withdrawn by subject")))
        .unwrap();
    assert_eq!(case.status, CaseStatus::Rejected);
}

/// A provider outage at initiation is not fatal: the case opens pending
/// and the pre-screen is simply skipped.
#[test]
fn screening_outage_at_initiation_leaves_case_pending() {
    let (engine, bus, _clock) =
        build_engine(Box::new(veriflow_core::screening::FailingScreening));

    let case = engine.initiate(kyc_request("subj-outage", "Alice Morgan")).unwrap();
    assert_eq!(case.status, CaseStatus::Pending);
    assert_eq!(bus.type_names(), vec!["case_initiated"]);
    assert!(engine.alerts_for_case(case.case_id).unwrap().is_empty());
}

/// Fails a fixed number of calls, then behaves like a clean provider.
struct FlakyScreening {
    failures_left: AtomicU32,
    inner: StaticScreening,
}

impl FlakyScreening {
    fn new(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            inner: StaticScreening::all_clean(0.05),
        }
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ScreeningProvider for FlakyScreening {
    fn screen_individual(
        &self,
        query: &IndividualQuery,
        timeout: Duration,
    ) -> Result<ScreeningResult, ScreeningError> {
        if self.take_failure() {
            return Err(ScreeningError::Unavailable("provider outage".into()));
        }
        self.inner.screen_individual(query, timeout)
    }

    fn screen_business(
        &self,
        query: &BusinessQuery,
        timeout: Duration,
    ) -> Result<ScreeningResult, ScreeningError> {
        if self.take_failure() {
            return Err(ScreeningError::Unavailable("provider outage".into()));
        }
        self.inner.screen_business(query, timeout)
    }
}

/// An outage during assessment surfaces as a retryable error; the accepted
/// documents survive, and an explicit submission completes the case once
/// the provider recovers.
#[test]
fn screening_outage_at_assessment_is_retryable() {
    // One failure for the pre-screen, one for the completeness assessment.
    let (engine, _bus, _clock) = build_engine(Box::new(FlakyScreening::new(2)));

    let case = engine.initiate(kyc_request("subj-retry", "Alice Morgan")).unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    let err = engine
        .submit_document(case.case_id, upload(DocumentType::Selfie, crisp_png()))
        .unwrap_err();
    assert!(
        matches!(err, VerifyError::ScreeningUnavailable { .. }),
        "Assessment outage must be explicit: {err:?}"
    );

    let case = engine.case(case.case_id).unwrap();
    assert_eq!(case.status, CaseStatus::InProgress, "No silent transition");
    assert_eq!(case.documents.len(), 2, "Accepted documents must survive");
    assert!(case.assessment.is_none());

    let case = engine.submit(case.case_id, Declarations::default()).unwrap();
    assert_eq!(case.status, CaseStatus::Approved, "Retry should complete the case");
}

/// A provider that degrades to safe defaults can never produce a silent
/// clean pass; the defaulted deduction keeps the score out of the top band.
#[test]
fn defaulted_screening_never_auto_approves() {
    let screening = StaticScreening {
        individual: ScreeningResult::safe_default(),
        business: ScreeningResult::safe_default(),
    };
    let (engine, _bus, _clock) = build_engine(Box::new(screening));

    let case = engine.initiate(kyc_request("subj-default", "Alice Morgan")).unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    let case = engine
        .submit_document(case.case_id, upload(DocumentType::Selfie, crisp_png()))
        .unwrap();

    assert_eq!(case.status, CaseStatus::RequiresManualReview);
    let assessment = case.assessment.expect("assessment recorded");
    assert!(assessment.screening_defaulted);
    assert!(
        assessment.score < 0.95,
        "Defaulted screening must cap the score, got {}",
        assessment.score
    );
}

/// With no rules loaded the engine still works; the empty set resolves to
/// allow and scoring alone decides.
#[test]
fn empty_rule_set_resolves_to_allow() {
    let (engine, _bus, _clock) = build_engine(Box::new(WatchlistScreening::builtin()));
    engine.replace_rules(Vec::new());

    let case = engine.initiate(kyc_request("subj-norules", "Alice Morgan")).unwrap();
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId, crisp_png()))
        .unwrap();
    let case = engine
        .submit_document(case.case_id, upload(DocumentType::Selfie, crisp_png()))
        .unwrap();
    assert_eq!(case.status, CaseStatus::Approved);
    assert!(engine.alerts_for_case(case.case_id).unwrap().is_empty());
}
