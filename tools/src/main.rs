//! case-runner: headless demo driver for the verification workflow.
//!
//! Usage:
//!   case-runner --db cases.db
//!   case-runner --data-dir ./data --scenario kyb

use std::env;
use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use image::{ImageBuffer, ImageFormat, Rgb};

use veriflow_core::capture::MemoryCapture;
use veriflow_core::case::{
    BusinessProfile, BusinessType, CaseKind, Declarations, DocumentSide, DocumentType,
    IndividualProfile, KycTier, OwnerParty, SubjectProfile, VerificationCase,
};
use veriflow_core::clock::SystemClock;
use veriflow_core::config::VerificationConfig;
use veriflow_core::engine::{
    DocumentUpload, InitiateRequest, OwnerRequest, ReviewDecision, VerificationEngine,
};
use veriflow_core::error::VerifyError;
use veriflow_core::event::LogBus;
use veriflow_core::metrics::LogMetrics;
use veriflow_core::rules::{builtin_rules, RuleEngine};
use veriflow_core::screening::WatchlistScreening;
use veriflow_core::store::VerificationStore;
use veriflow_core::types::CaseId;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");
    let scenario = args
        .windows(2)
        .find(|w| w[0] == "--scenario")
        .map(|w| w[1].as_str())
        .unwrap_or("all");

    println!("veriflow — case-runner");
    println!("  db:        {db}");
    println!("  data_dir:  {data_dir}");
    println!("  scenario:  {scenario}");
    println!();

    // For :memory: use a SQLite shared-memory URI so a reopened connection
    // would still see the same database.
    let db_effective: String = if db == ":memory:" {
        format!("file:caserun_{}?mode=memory&cache=shared", unix_seconds())
    } else {
        db.to_string()
    };
    let store = VerificationStore::open(&db_effective)?;
    store.migrate()?;

    let config = match VerificationConfig::load(data_dir) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Falling back to default config: {e}");
            VerificationConfig::default()
        }
    };
    let rules = match RuleEngine::load(data_dir) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("Falling back to builtin rules: {e}");
            RuleEngine::new(builtin_rules())
        }
    };
    let screening = match WatchlistScreening::load(data_dir) {
        Ok(w) => w,
        Err(e) => {
            log::warn!("Falling back to builtin watchlist: {e}");
            WatchlistScreening::builtin()
        }
    };

    let max_attempts = config.screening.max_attempts;
    let engine = VerificationEngine::new(
        store,
        config,
        rules,
        Box::new(screening),
        Box::new(MemoryCapture::new()),
        Arc::new(LogBus),
        Arc::new(LogMetrics),
        Arc::new(SystemClock),
    );

    match scenario {
        "kyc" => run_kyc(&engine)?,
        "kyb" => run_kyb(&engine, max_attempts)?,
        "sanctions" => run_sanctions(&engine)?,
        "all" => {
            run_kyc(&engine)?;
            run_sanctions(&engine)?;
            run_kyb(&engine, max_attempts)?;
        }
        other => anyhow::bail!("Unknown scenario '{other}' (kyc | kyb | sanctions | all)"),
    }

    print_summary(&engine)?;
    Ok(())
}

/// Clean individual through the basic tier; should auto-approve.
fn run_kyc(engine: &VerificationEngine) -> Result<()> {
    println!("=== KYC: basic tier, clean subject ===");
    let case = engine.initiate(InitiateRequest {
        subject_id: "alice.morgan".into(),
        kind: CaseKind::Kyc(KycTier::Basic),
        profile: SubjectProfile::Individual(IndividualProfile {
            full_name: "Alice Morgan".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1991, 6, 14),
            nationality: Some("US".into()),
            residence_country: Some("US".into()),
            address: Some("12 Harbor Lane".into()),
        }),
    })?;
    print_status(&case, "initiated");

    let case = engine.submit_document(
        case.case_id,
        png_upload(DocumentType::NationalId, "national_id.png")?,
    )?;
    print_status(&case, "national id accepted");

    let case = engine.submit_document(
        case.case_id,
        png_upload(DocumentType::Selfie, "selfie.png")?,
    )?;
    print_status(&case, "selfie accepted");
    print_assessment(&case);
    println!();
    Ok(())
}

/// A listed name; the pre-screen rejects before any document is asked for.
fn run_sanctions(engine: &VerificationEngine) -> Result<()> {
    println!("=== KYC: sanctioned subject ===");
    let case = engine.initiate(InitiateRequest {
        subject_id: "viktor.bout".into(),
        kind: CaseKind::Kyc(KycTier::Basic),
        profile: SubjectProfile::Individual(IndividualProfile {
            full_name: "Viktor Bout".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1967, 1, 13),
            nationality: Some("RU".into()),
            residence_country: None,
            address: None,
        }),
    })?;
    print_status(&case, "initiated");
    if let Some(reason) = &case.rejection_reason {
        println!("  rejection:  {reason}");
    }
    for record in engine.alerts_for_case(case.case_id)? {
        println!(
            "  alert:      {} [{}] {}",
            record.alert.rule_id,
            record.alert.severity.as_str(),
            record.alert.description
        );
    }
    println!();
    Ok(())
}

/// Limited company with three owners; lands in manual review and is
/// approved by a reviewer.
fn run_kyb(engine: &VerificationEngine, max_attempts: u32) -> Result<()> {
    println!("=== KYB: limited company ===");
    let case = engine.initiate(InitiateRequest {
        subject_id: "northgate.trading".into(),
        kind: CaseKind::Kyb(BusinessType::LimitedCompany),
        profile: SubjectProfile::Business(BusinessProfile {
            legal_name: "Northgate Trading Ltd".into(),
            registration_number: Some("NT-88412".into()),
            country: Some("US".into()),
            industry: Some("software consulting".into()),
            address: Some("400 Commerce Way".into()),
        }),
    })?;
    print_status(&case, "initiated");

    for (name, pct) in [
        ("Dana Whitfield", 40.0),
        ("Erik Lund", 40.0),
        ("Priya Nair", 20.0),
    ] {
        let owner = engine.add_owner(
            case.case_id,
            OwnerRequest {
                party: OwnerParty::Individual {
                    full_name: name.to_string(),
                    date_of_birth: NaiveDate::from_ymd_opt(1980, 2, 2),
                    nationality: Some("US".into()),
                },
                ownership_pct: pct,
                control_pct: 0.0,
            },
        )?;
        println!(
            "  owner:      {name} {pct}%{}",
            if owner.is_ubo { " (UBO)" } else { "" }
        );
    }

    for doc_type in [
        DocumentType::CertificateOfIncorporation,
        DocumentType::ArticlesOfAssociation,
        DocumentType::ShareholderRegister,
        DocumentType::BusinessProofOfAddress,
        DocumentType::UboDeclaration,
    ] {
        engine.submit_document(case.case_id, pdf_upload(doc_type))?;
    }
    let case = engine.case(case.case_id)?;
    print_status(&case, "documents complete");

    let declarations = Declarations {
        ubo_complete: true,
        final_attestation: true,
    };
    let case = submit_with_retry(engine, case.case_id, declarations, max_attempts)?;
    print_status(&case, "submitted");
    print_assessment(&case);

    let case = engine.review(
        case.case_id,
        ReviewDecision {
            reviewer: "demo.reviewer".into(),
            approve: true,
            notes: Some("registry extract matches declared owners".into()),
            rejection_reason: None,
            risk_override: false,
        },
    )?;
    print_status(&case, "reviewed");
    println!();
    Ok(())
}

/// The engine never retries screening itself; the retry budget lives with
/// the caller.
fn submit_with_retry(
    engine: &VerificationEngine,
    case_id: CaseId,
    declarations: Declarations,
    max_attempts: u32,
) -> Result<VerificationCase> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match engine.submit(case_id, declarations) {
            Err(VerifyError::ScreeningUnavailable { reason, .. })
                if attempt < max_attempts =>
            {
                log::warn!("Screening unavailable (attempt {attempt}/{max_attempts}): {reason}");
            }
            other => return Ok(other?),
        }
    }
}

fn print_status(case: &VerificationCase, step: &str) {
    let stage = case
        .stage
        .map(|s| format!(" / {}", s.as_str()))
        .unwrap_or_default();
    println!(
        "  {:<20} {} {}{stage}",
        format!("{step}:"),
        case.case_id,
        case.status.as_str()
    );
}

fn print_assessment(case: &VerificationCase) {
    let Some(assessment) = &case.assessment else {
        return;
    };
    println!(
        "  assessment: score {:.3} ({})",
        assessment.score,
        assessment.decision.as_str()
    );
    for factor in &assessment.factors {
        println!("    - {factor}");
    }
    for owner in &assessment.owner_scores {
        println!("    owner {} scored {:.3}", owner.name, owner.score);
    }
}

fn print_summary(engine: &VerificationEngine) -> Result<()> {
    let metrics = engine.caseload_metrics()?;
    println!("=== CASELOAD SUMMARY ===");
    println!("  total cases:    {}", metrics.total_cases);
    println!("  pending:        {}", metrics.pending);
    println!("  in progress:    {}", metrics.in_progress);
    println!("  manual review:  {}", metrics.manual_review);
    println!("  approved:       {}", metrics.approved);
    println!("  rejected:       {}", metrics.rejected);
    println!("  expired:        {}", metrics.expired);
    println!("  open alerts:    {}", metrics.open_alerts);
    if let Some(mean) = metrics.mean_risk_score {
        println!("  mean score:     {mean:.3}");
    }
    Ok(())
}

/// Card-aspect synthetic document with fine text bands; scores well above
/// the quality floor.
fn png_upload(doc_type: DocumentType, file_name: &str) -> Result<DocumentUpload> {
    let img = ImageBuffer::from_fn(400, 260, |x, y| {
        if y % 40 < 16 && (x + y) % 2 == 0 {
            Rgb([20u8, 20, 20])
        } else {
            Rgb([235u8, 235, 235])
        }
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png)?;
    Ok(DocumentUpload {
        doc_type,
        side: DocumentSide::Front,
        file_name: file_name.to_string(),
        mime_type: "image/png".into(),
        bytes: out.into_inner(),
    })
}

fn pdf_upload(doc_type: DocumentType) -> DocumentUpload {
    DocumentUpload {
        doc_type,
        side: DocumentSide::Front,
        file_name: format!("{}.pdf", doc_type.as_str().to_lowercase()),
        mime_type: "application/pdf".into(),
        bytes: b"%PDF-1.7 corporate filing body".to_vec(),
    }
}

fn unix_seconds() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
