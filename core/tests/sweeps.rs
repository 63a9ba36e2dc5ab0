//! Expiry and staleness sweep tests.
//!
//! The sweeps are the only clock-driven transitions in the workflow:
//! approved cases lapse after their validity window, and idle open cases
//! draw warnings without changing state.

use std::io::Cursor;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use image::{ImageBuffer, ImageFormat, Rgb};

use veriflow_core::capture::MemoryCapture;
use veriflow_core::case::{
    CaseKind, CaseStatus, DocumentSide, DocumentType, IndividualProfile, KycTier,
    SubjectProfile,
};
use veriflow_core::clock::FixedClock;
use veriflow_core::config::VerificationConfig;
use veriflow_core::engine::{
    DocumentUpload, InitiateRequest, ReviewDecision, VerificationEngine,
};
use veriflow_core::event::MemoryBus;
use veriflow_core::metrics::NullMetrics;
use veriflow_core::rules::{builtin_rules, RuleEngine};
use veriflow_core::screening::WatchlistScreening;
use veriflow_core::store::VerificationStore;
use veriflow_core::types::CaseId;

fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn build_engine(
    config: VerificationConfig,
) -> (VerificationEngine, Arc<MemoryBus>, Arc<FixedClock>) {
    let store = VerificationStore::in_memory().expect("open in-memory store");
    store.migrate().expect("run migrations");
    let bus = Arc::new(MemoryBus::new());
    let clock = Arc::new(FixedClock::new(start_time()));
    let engine = VerificationEngine::new(
        store,
        config,
        RuleEngine::new(builtin_rules()),
        Box::new(WatchlistScreening::builtin()),
        Box::new(MemoryCapture::new()),
        bus.clone(),
        Arc::new(NullMetrics),
        clock.clone(),
    );
    (engine, bus, clock)
}

fn kyc_request(subject: &str) -> InitiateRequest {
    InitiateRequest {
        subject_id: subject.to_string(),
        kind: CaseKind::Kyc(KycTier::Basic),
        profile: SubjectProfile::Individual(IndividualProfile {
            full_name: "Alice Morgan".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1991, 6, 14),
            nationality: Some("US".into()),
            residence_country: Some("US".into()),
            address: None,
        }),
    }
}

fn crisp_png() -> Vec<u8> {
    let img = ImageBuffer::from_fn(400, 260, |x, y| {
        if y % 40 < 16 && (x + y) % 2 == 0 {
            Rgb([20u8, 20, 20])
        } else {
            Rgb([235u8, 235, 235])
        }
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn upload(doc_type: DocumentType) -> DocumentUpload {
    DocumentUpload {
        doc_type,
        side: DocumentSide::Front,
        file_name: format!("{}.png", doc_type.as_str().to_lowercase()),
        mime_type: "image/png".into(),
        bytes: crisp_png(),
    }
}

/// Runs a clean basic-tier case through to automatic approval.
fn approved_case(engine: &VerificationEngine, subject: &str) -> CaseId {
    let case = engine.initiate(kyc_request(subject)).expect("case opened");
    engine
        .submit_document(case.case_id, upload(DocumentType::NationalId))
        .expect("id accepted");
    let case = engine
        .submit_document(case.case_id, upload(DocumentType::Selfie))
        .expect("selfie accepted");
    assert_eq!(case.status, CaseStatus::Approved, "Fixture should auto-approve");
    case.case_id
}

/// One year after approval the sweep closes the case. The original expiry
/// timestamp stays on the record for audit.
#[test]
fn approved_cases_expire_after_their_validity_window() {
    let (engine, bus, clock) = build_engine(VerificationConfig::default());
    let case_id = approved_case(&engine, "subj-expire");
    bus.drain();

    clock.set(start_time() + chrono::Duration::days(366));
    let expired = engine.expire_sweep().unwrap();
    assert_eq!(expired, vec![case_id]);

    let case = engine.case(case_id).unwrap();
    assert_eq!(case.status, CaseStatus::Expired);
    assert_eq!(
        case.expires_at,
        Some(start_time() + chrono::Duration::days(365)),
        "Expiry timestamp must survive the transition"
    );
    assert_eq!(case.updated_at, start_time() + chrono::Duration::days(366));
    assert_eq!(bus.type_names(), vec!["case_expired"]);

    let events = engine.events_for_case(case_id).unwrap();
    assert_eq!(
        events.last().map(|e| e.event_type.as_str()),
        Some("case_expired")
    );
}

/// A still-valid approval is left alone.
#[test]
fn sweep_ignores_cases_inside_the_window() {
    let (engine, _bus, clock) = build_engine(VerificationConfig::default());
    let case_id = approved_case(&engine, "subj-valid");

    clock.set(start_time() + chrono::Duration::days(364));
    assert!(engine.expire_sweep().unwrap().is_empty());
    assert_eq!(engine.case(case_id).unwrap().status, CaseStatus::Approved);
}

/// The grace period shifts the sweep cutoff, not the recorded expiry.
#[test]
fn expiry_grace_defers_the_sweep() {
    let mut config = VerificationConfig::default();
    config.sweeps.expiry_grace_days = 5;
    let (engine, _bus, clock) = build_engine(config);
    let case_id = approved_case(&engine, "subj-grace");

    // Four days past expiry is still inside the grace window.
    clock.set(start_time() + chrono::Duration::days(369));
    assert!(engine.expire_sweep().unwrap().is_empty());

    clock.set(start_time() + chrono::Duration::days(370));
    assert_eq!(engine.expire_sweep().unwrap(), vec![case_id]);
    assert_eq!(engine.case(case_id).unwrap().status, CaseStatus::Expired);
}

/// Only approvals lapse; terminal rejections and open cases have no
/// expiry no matter how old they get.
#[test]
fn non_approved_cases_never_expire() {
    let (engine, _bus, clock) = build_engine(VerificationConfig::default());

    let rejected = engine.initiate(kyc_request("subj-rej")).unwrap();
    engine
        .submit_document(rejected.case_id, upload(DocumentType::NationalId))
        .unwrap();
    engine
        .review(
            rejected.case_id,
            ReviewDecision {
                reviewer: "lena.k".into(),
                approve: false,
                notes: None,
                rejection_reason: Some("withdrawn".into()),
                risk_override: false,
            },
        )
        .unwrap();

    let open = engine.initiate(kyc_request("subj-open")).unwrap();
    engine
        .submit_document(open.case_id, upload(DocumentType::NationalId))
        .unwrap();

    clock.set(start_time() + chrono::Duration::days(1000));
    assert!(engine.expire_sweep().unwrap().is_empty());
    assert_eq!(engine.case(rejected.case_id).unwrap().status, CaseStatus::Rejected);
    assert_eq!(engine.case(open.case_id).unwrap().status, CaseStatus::InProgress);
}

/// Idle open cases draw a warning event on every sweep but never move;
/// the warning must not reset the idle clock.
#[test]
fn stale_open_cases_draw_repeated_warnings() {
    let (engine, bus, clock) = build_engine(VerificationConfig::default());
    let case = engine.initiate(kyc_request("subj-idle")).unwrap();
    bus.drain();

    clock.set(start_time() + chrono::Duration::days(15));
    let warned = engine.stale_sweep().unwrap();
    assert_eq!(warned, vec![case.case_id]);
    assert_eq!(bus.type_names(), vec!["stale_case_warning"]);

    let reloaded = engine.case(case.case_id).unwrap();
    assert_eq!(reloaded.status, CaseStatus::Pending, "Warning is not a transition");
    assert_eq!(
        reloaded.updated_at,
        start_time(),
        "Warning must not touch the idle clock"
    );

    // A second sweep sees the same idle case and warns again.
    let warned = engine.stale_sweep().unwrap();
    assert_eq!(warned, vec![case.case_id]);
    let events = engine.events_for_case(case.case_id).unwrap();
    let warnings = events
        .iter()
        .filter(|e| e.event_type == "stale_case_warning")
        .count();
    assert_eq!(warnings, 2);
}

/// Recently touched and terminal cases stay out of the stale sweep.
#[test]
fn fresh_and_terminal_cases_are_not_stale() {
    let (engine, _bus, clock) = build_engine(VerificationConfig::default());

    approved_case(&engine, "subj-approved");
    let fresh = engine.initiate(kyc_request("subj-fresh")).unwrap();

    // Touch the fresh case ten days in; at day fifteen it is five days
    // idle, inside the threshold.
    clock.set(start_time() + chrono::Duration::days(10));
    engine
        .submit_document(fresh.case_id, upload(DocumentType::NationalId))
        .unwrap();

    clock.set(start_time() + chrono::Duration::days(15));
    assert!(engine.stale_sweep().unwrap().is_empty());
}
