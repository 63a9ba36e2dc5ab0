//! The verification engine — the heart of the workflow.
//!
//! OPERATION ORDER within one call (fixed, documented, never reordered):
//!   1. Take the per-case lock (all mutations on one case are serialized)
//!   2. Load the case from the store
//!   3. Validate state and input; compute the transition as a pure function
//!   4. Call collaborators (screening, capture) outside any store lock
//!   5. Persist the mutation and its events in one store pass
//!   6. Publish events fire-and-forget; a bus failure never rolls back
//!
//! RULES:
//!   - The engine never retries screening; callers own the retry budget.
//!   - The store mutex is held only across statements, never across I/O.
//!   - Rule evaluation and document analysis are pure; no locks needed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::capture::DocumentCapture;
use crate::case::{
    BeneficialOwner, CaseKind, CaseStatus, Declarations, Document, DocumentSide,
    DocumentType, KybStage, OwnerParty, RiskDecision, SubjectProfile, VerificationCase,
};
use crate::clock::Clock;
use crate::config::VerificationConfig;
use crate::document_analyzer::DocumentAnalyzer;
use crate::error::{VerifyError, VerifyResult};
use crate::event::{CaseEvent, EventBus, EventLogEntry, WorkflowEvent};
use crate::metrics::MetricsSink;
use crate::risk::{OwnerInput, RiskEngine};
use crate::rules::{
    AlertStatus, ComplianceRule, EvaluationOutcome, RuleAction, RuleContext, RuleEngine,
    RuleKind,
};
use crate::screening::{
    BusinessQuery, IndividualQuery, MatchCategory, ScreeningProvider, ScreeningResult,
};
use crate::store::{AlertRecord, CaseloadMetrics, VerificationStore};
use crate::types::{CaseId, SubjectId};
use crate::workflow::{next_status, Trigger};

// ── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub subject_id: SubjectId,
    pub kind: CaseKind,
    pub profile: SubjectProfile,
}

#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub doc_type: DocumentType,
    pub side: DocumentSide,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OwnerRequest {
    pub party: OwnerParty,
    pub ownership_pct: f64,
    pub control_pct: f64,
}

#[derive(Debug, Clone)]
pub struct ReviewDecision {
    pub reviewer: String,
    pub approve: bool,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    /// Required to approve a case whose assessment carries a sanctions match.
    pub risk_override: bool,
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct VerificationEngine {
    store: Mutex<VerificationStore>,
    config: VerificationConfig,
    rules: RwLock<RuleEngine>,
    risk: RiskEngine,
    analyzer: DocumentAnalyzer,
    screening: Box<dyn ScreeningProvider>,
    capture: Box<dyn DocumentCapture>,
    bus: Arc<dyn EventBus>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    case_locks: Mutex<HashMap<CaseId, Arc<Mutex<()>>>>,
}

impl VerificationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: VerificationStore,
        config: VerificationConfig,
        rules: RuleEngine,
        screening: Box<dyn ScreeningProvider>,
        capture: Box<dyn DocumentCapture>,
        bus: Arc<dyn EventBus>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let risk = RiskEngine::new(&config);
        Self {
            store: Mutex::new(store),
            config,
            rules: RwLock::new(rules),
            risk,
            analyzer: DocumentAnalyzer::new(),
            screening,
            capture,
            bus,
            metrics,
            clock,
            case_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    /// Swap the whole rule set at runtime. In-flight evaluations finish
    /// against the old set.
    pub fn replace_rules(&self, rules: Vec<ComplianceRule>) {
        self.rules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(rules);
    }

    // ── Lifecycle operations ───────────────────────────────────

    /// Open a case for a subject and run the pre-screen. A hard sanctions
    /// hit rejects the case outright; the rejected case is still returned
    /// so callers can inspect it.
    pub fn initiate(&self, req: InitiateRequest) -> VerifyResult<VerificationCase> {
        let now = self.clock.now();
        match (&req.kind, &req.profile) {
            (CaseKind::Kyc(_), SubjectProfile::Individual(_)) => {}
            (CaseKind::Kyb(_), SubjectProfile::Business(_)) => {}
            _ => {
                return Err(VerifyError::KindMismatch {
                    kind: req.kind.kind_str().to_string(),
                    operation: "initiate",
                })
            }
        }

        let mut case = VerificationCase::new(req.subject_id, req.kind, req.profile, now);
        let init_event = CaseEvent::CaseInitiated {
            kind: case.kind.kind_str().to_string(),
            tier: case.kind.tier_str().to_string(),
        };
        {
            // Duplicate check and insert must see the same store state.
            let store = self.store();
            if let Some(existing) = store.find_active_case(&case.subject_id, now)? {
                return Err(VerifyError::DuplicateActiveCase {
                    subject_id: case.subject_id,
                    case_id: existing,
                });
            }
            store.insert_case(&case)?;
            append_events(&store, &case, std::slice::from_ref(&init_event), now)?;
        }
        self.publish(&case, vec![init_event], now);
        self.metrics.incr("verification.case_initiated");

        // Pre-screen on declared data only. A provider failure here leaves
        // the case pending; the full assessment will screen again.
        let screening = match self.screen_subject(&case.profile) {
            Ok(result) => result,
            Err(e) => {
                log::warn!(
                    "Pre-screen unavailable for case {}, continuing pending: {e}",
                    case.case_id
                );
                return Ok(case);
            }
        };

        let ctx = self.base_context(&case, &screening, now);
        let outcome = self.evaluate_rules(RuleKind::Sanctions, &ctx, now);
        let hard_hit = outcome.resolved_action == RuleAction::Block
            && screening.strongest_match() >= self.config.thresholds.hard_sanctions_match;

        if !outcome.alerts.is_empty() {
            let store = self.store();
            for alert in &outcome.alerts {
                store.insert_alert(case.case_id, alert)?;
            }
        }

        if hard_hit {
            let top = screening
                .matches
                .iter()
                .filter(|m| m.category == MatchCategory::Sanctions)
                .max_by(|a, b| {
                    a.strength
                        .partial_cmp(&b.strength)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            case.status = next_status(case.status, Trigger::PreScreenHit)?;
            case.rejection_reason = Some("pre-screen sanctions hit".to_string());
            case.updated_at = now;
            let event = CaseEvent::PreScreenRejected {
                match_strength: screening.strongest_match(),
                list_name: top
                    .map(|m| m.list_name.clone())
                    .unwrap_or_else(|| "sanctions".to_string()),
            };
            self.commit(&case, vec![event], now)?;
            self.metrics.incr("verification.pre_screen_rejected");
        }

        Ok(case)
    }

    /// Accept one document: analyze, persist, and auto-assess the moment
    /// the required set is complete (KYC; KYB assessment waits for
    /// `submit`, which gates on declarations).
    pub fn submit_document(
        &self,
        case_id: CaseId,
        upload: DocumentUpload,
    ) -> VerifyResult<VerificationCase> {
        let lock = self.case_lock(case_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        let mut case = self.load_case(case_id)?;

        if !case.status.accepts_documents() {
            return Err(VerifyError::InvalidState {
                case_id,
                status: case.status.as_str().to_string(),
                operation: "submit_document",
            });
        }
        let requirements = self
            .config
            .requirements_for(&case.kind)
            .ok_or_else(|| {
                VerifyError::Config(format!(
                    "no document requirements for '{}'",
                    case.kind.requirement_key()
                ))
            })?
            .clone();
        if !requirements.accepts(upload.doc_type) {
            return Err(VerifyError::UnexpectedDocumentType {
                doc_type: upload.doc_type.as_str().to_string(),
                tier: case.kind.tier_str().to_string(),
            });
        }
        if case.has_document(upload.doc_type, upload.side) {
            return Err(VerifyError::DuplicateDocument {
                case_id,
                doc_type: upload.doc_type.as_str().to_string(),
                side: upload.side.as_str().to_string(),
            });
        }

        // Capture and analysis run outside the store lock.
        let captured =
            self.capture
                .upload(&upload.bytes, &upload.file_name, &upload.mime_type)?;
        let analysis = self.analyzer.analyze(&upload.bytes, &upload.mime_type);

        let doc = Document {
            document_id: uuid::Uuid::new_v4(),
            doc_type: upload.doc_type,
            side: upload.side,
            file_name: upload.file_name,
            mime_type: upload.mime_type,
            storage_ref: captured.storage_ref,
            quality: analysis.quality,
            fraud: analysis.fraud,
            extracted_fields: captured.extracted_fields,
            ocr_confidence: captured.ocr_confidence,
            submitted_at: now,
        };
        let mut events = vec![CaseEvent::DocumentSubmitted {
            document_id: doc.document_id.to_string(),
            doc_type: doc.doc_type.as_str().to_string(),
            side: doc.side.as_str().to_string(),
            quality: doc.quality.overall,
            fraud_risk: doc.fraud.risk_score,
        }];
        case.documents.push(doc.clone());

        if case.status == CaseStatus::Pending {
            case.status = next_status(case.status, Trigger::FirstDocument)?;
            events.push(CaseEvent::VerificationStarted {
                first_document: upload.doc_type.as_str().to_string(),
            });
        }

        let complete = requirements.missing(&case.submitted_types()).is_empty();
        if complete {
            events.push(CaseEvent::RequiredDocumentsComplete {
                document_count: case.documents.len(),
            });
            if case.kind.is_kyb() {
                events.extend(advance_stage(&mut case, KybStage::DocumentsUploaded));
            }
        }
        case.updated_at = now;

        // First durable pass: the document and any status change survive
        // even if the assessment below cannot reach the screening provider.
        {
            let store = self.store();
            store.insert_document(case_id, &doc)?;
            store.update_case(&case)?;
            append_events(&store, &case, &events, now)?;
        }
        self.publish(&case, events, now);
        self.metrics.incr("verification.document_submitted");

        if complete && !case.kind.is_kyb() {
            let assessment_events = self.assess_and_apply(&mut case, now)?;
            self.commit_assessment(&case, assessment_events, now)?;
        }
        Ok(case)
    }

    /// Explicit submission. Recomputes the risk assessment and applies its
    /// transition; for KYB this is where declarations are enforced and
    /// owners are screened. Also the retry surface after
    /// `ScreeningUnavailable`.
    pub fn submit(
        &self,
        case_id: CaseId,
        declarations: Declarations,
    ) -> VerifyResult<VerificationCase> {
        let lock = self.case_lock(case_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        let mut case = self.load_case(case_id)?;

        if case.status != CaseStatus::InProgress {
            return Err(VerifyError::InvalidState {
                case_id,
                status: case.status.as_str().to_string(),
                operation: "submit",
            });
        }
        if let Some(requirements) = self.config.requirements_for(&case.kind) {
            let missing = requirements.missing(&case.submitted_types());
            if !missing.is_empty() {
                return Err(VerifyError::MissingRequiredDocuments {
                    case_id,
                    missing: missing.iter().map(|t| t.as_str().to_string()).collect(),
                });
            }
        }

        let mut events = Vec::new();
        if case.kind.is_kyb() {
            let missing = declarations.missing();
            if !missing.is_empty() {
                return Err(VerifyError::DeclarationsIncomplete { missing });
            }
            case.declarations = declarations;
            events.extend(advance_stage(&mut case, KybStage::EntityVerification));
        }
        case.submitted_at = Some(now);

        events.extend(self.assess_and_apply(&mut case, now)?);
        self.commit_assessment(&case, events, now)?;
        self.metrics.incr("verification.submitted");
        Ok(case)
    }

    /// Reviewer verdict on a case awaiting a human.
    pub fn review(
        &self,
        case_id: CaseId,
        decision: ReviewDecision,
    ) -> VerifyResult<VerificationCase> {
        let lock = self.case_lock(case_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        let mut case = self.load_case(case_id)?;

        if !matches!(
            case.status,
            CaseStatus::RequiresManualReview | CaseStatus::InProgress
        ) {
            return Err(VerifyError::InvalidState {
                case_id,
                status: case.status.as_str().to_string(),
                operation: "review",
            });
        }

        let event = if decision.approve {
            let flagged = case
                .assessment
                .as_ref()
                .is_some_and(|a| a.sanctions_match);
            if flagged && !decision.risk_override {
                return Err(VerifyError::OverrideRequired { case_id });
            }
            case.status = next_status(case.status, Trigger::ReviewerApprove)?;
            case.risk_override = flagged && decision.risk_override;
            case.approved_at = Some(now);
            let expires = now + Duration::days(self.config.validity_days(&case.kind));
            case.expires_at = Some(expires);
            CaseEvent::ReviewerApproved {
                reviewer: decision.reviewer.clone(),
                risk_override: case.risk_override,
                expires_at: expires,
            }
        } else {
            let reason = decision
                .rejection_reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or(VerifyError::EmptyRejectionReason)?
                .to_string();
            case.status = next_status(case.status, Trigger::ReviewerReject)?;
            case.rejection_reason = Some(reason.clone());
            CaseEvent::ReviewerRejected {
                reviewer: decision.reviewer.clone(),
                reason,
            }
        };
        case.reviewed_by = Some(decision.reviewer);
        case.reviewed_at = Some(now);
        case.review_notes = decision.notes;
        case.updated_at = now;

        let mut events = vec![event];
        if case.status == CaseStatus::Approved && case.kind.is_kyb() {
            events.extend(advance_stage(&mut case, KybStage::Completed));
        }
        self.commit(&case, events, now)?;
        self.metrics.incr(if decision.approve {
            "verification.reviewer_approved"
        } else {
            "verification.reviewer_rejected"
        });
        Ok(case)
    }

    /// Declare a beneficial owner on a KYB case. The UBO flag is derived
    /// here; callers never set it.
    pub fn add_owner(
        &self,
        case_id: CaseId,
        req: OwnerRequest,
    ) -> VerifyResult<BeneficialOwner> {
        let lock = self.case_lock(case_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        let mut case = self.load_case(case_id)?;

        if !case.kind.is_kyb() {
            return Err(VerifyError::KindMismatch {
                kind: case.kind.kind_str().to_string(),
                operation: "add_owner",
            });
        }
        if !case.status.accepts_documents() {
            return Err(VerifyError::InvalidState {
                case_id,
                status: case.status.as_str().to_string(),
                operation: "add_owner",
            });
        }
        let cap = self.config.thresholds.ownership_cap_pct;
        let new_total = case.total_ownership_pct() + req.ownership_pct;
        if req.ownership_pct < 0.0 || new_total > cap {
            return Err(VerifyError::OwnershipExceeded {
                case_id,
                attempted_pct: req.ownership_pct,
                new_total_pct: new_total,
            });
        }

        let mut owner = BeneficialOwner {
            owner_id: uuid::Uuid::new_v4(),
            party: req.party,
            ownership_pct: req.ownership_pct,
            control_pct: req.control_pct,
            is_ubo: false,
            sanctions_match: None,
            pep_match: None,
            risk_score: None,
            active: true,
            added_at: now,
        };
        owner.recompute_ubo();
        case.owners.push(owner.clone());
        case.updated_at = now;

        let events = vec![CaseEvent::OwnerAdded {
            owner_id: owner.owner_id.to_string(),
            ownership_pct: owner.ownership_pct,
            is_ubo: owner.is_ubo,
        }];
        {
            let store = self.store();
            store.insert_owner(case_id, &owner)?;
            store.update_case(&case)?;
            append_events(&store, &case, &events, now)?;
        }
        self.publish(&case, events, now);
        self.metrics.incr("verification.owner_added");
        Ok(owner)
    }

    // ── Sweeps ─────────────────────────────────────────────────

    /// Expire every approved case whose validity window (plus grace) has
    /// closed. Each case is locked individually; the sweep never holds one
    /// case's lock while working on another.
    pub fn expire_sweep(&self) -> VerifyResult<Vec<CaseId>> {
        let now = self.clock.now();
        let cutoff = now - Duration::days(self.config.sweeps.expiry_grace_days);
        let candidates = self.store().expired_case_ids(cutoff)?;

        let mut expired = Vec::new();
        for case_id in candidates {
            let lock = self.case_lock(case_id);
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut case = self.load_case(case_id)?;
            // Re-check under the lock; a concurrent review may have moved it.
            let due = case.status == CaseStatus::Approved
                && case.expires_at.is_some_and(|at| at <= cutoff);
            if !due {
                continue;
            }
            case.status = next_status(case.status, Trigger::Expire)?;
            case.updated_at = now;
            self.commit(&case, vec![CaseEvent::CaseExpired { expired_at: now }], now)?;
            expired.push(case_id);
        }
        if !expired.is_empty() {
            log::info!("Expire sweep closed {} case(s)", expired.len());
        }
        self.metrics
            .observe("verification.expire_sweep.count", expired.len() as f64);
        Ok(expired)
    }

    /// Emit a warning event for every open case idle past the configured
    /// threshold. No status change.
    pub fn stale_sweep(&self) -> VerifyResult<Vec<CaseId>> {
        let now = self.clock.now();
        let cutoff = now - Duration::days(self.config.sweeps.stale_after_days);
        let stale = self.store().stale_case_ids(cutoff)?;

        let mut warned = Vec::new();
        for (case_id, last_update) in stale {
            let lock = self.case_lock(case_id);
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            let case = self.load_case(case_id)?;
            let event = CaseEvent::StaleCaseWarning {
                idle_days: (now - last_update).num_days(),
                status: case.status.as_str().to_string(),
            };
            {
                let store = self.store();
                append_events(&store, &case, std::slice::from_ref(&event), now)?;
            }
            self.publish(&case, vec![event], now);
            warned.push(case_id);
        }
        if !warned.is_empty() {
            log::info!("Stale sweep warned on {} case(s)", warned.len());
        }
        Ok(warned)
    }

    // ── Read surface ───────────────────────────────────────────

    pub fn case(&self, case_id: CaseId) -> VerifyResult<VerificationCase> {
        self.load_case(case_id)
    }

    pub fn cases_by_status(&self, status: CaseStatus) -> VerifyResult<Vec<CaseId>> {
        self.store().case_ids_by_status(status)
    }

    pub fn events_for_case(&self, case_id: CaseId) -> VerifyResult<Vec<EventLogEntry>> {
        self.store().events_for_case(case_id)
    }

    pub fn alerts_for_case(&self, case_id: CaseId) -> VerifyResult<Vec<AlertRecord>> {
        self.store().alerts_for_case(case_id)
    }

    pub fn open_alerts(&self) -> VerifyResult<Vec<AlertRecord>> {
        self.store().open_alerts()
    }

    pub fn update_alert_status(
        &self,
        alert_id: uuid::Uuid,
        status: AlertStatus,
        note: Option<&str>,
    ) -> VerifyResult<()> {
        let now = self.clock.now();
        self.store().update_alert_status(alert_id, status, note, now)
    }

    pub fn caseload_metrics(&self) -> VerifyResult<CaseloadMetrics> {
        self.store().caseload_metrics()
    }

    // ── Assessment ─────────────────────────────────────────────

    /// Screen, score, evaluate rules, and apply the resulting transition to
    /// the in-memory case. Returns the events to log; the caller persists.
    fn assess_and_apply(
        &self,
        case: &mut VerificationCase,
        now: DateTime<Utc>,
    ) -> VerifyResult<Vec<CaseEvent>> {
        let screening = self
            .screen_subject(&case.profile)
            .map_err(|e| VerifyError::ScreeningUnavailable {
                case_id: case.case_id,
                reason: e.to_string(),
            })?;

        let mut events = Vec::new();
        let mean_quality = case.mean_document_quality().unwrap_or(1.0);

        // Owners are screened before scoring so their outcome feeds the
        // business assessment.
        let owners = if case.kind.is_kyb() {
            let inputs = self.screen_owners(case)?;
            events.extend(advance_stage(case, KybStage::OwnerVerification));
            inputs
        } else {
            Vec::new()
        };

        let mut assessment = match (&case.kind, &case.profile) {
            (CaseKind::Kyb(_), SubjectProfile::Business(business)) => self.risk.assess_business(
                business,
                mean_quality,
                &screening,
                &owners,
                case.total_ownership_pct(),
                now,
            ),
            (_, SubjectProfile::Individual(profile)) => {
                self.risk
                    .assess_individual(profile, mean_quality, &screening, now)
            }
            // Kind/profile coherence is enforced at initiation.
            (_, SubjectProfile::Business(_)) => {
                return Err(VerifyError::Config(format!(
                    "case {} has a business profile on a KYC case",
                    case.case_id
                )))
            }
        };

        let kind = if case.kind.is_kyb() {
            RuleKind::Kyb
        } else {
            RuleKind::Kyc
        };
        let ctx = self.assessment_context(case, &screening, now);
        let outcome = self.evaluate_rules(kind, &ctx, now);
        assessment.rule_contribution = outcome.risk_contribution;

        events.push(CaseEvent::RiskAssessed {
            score: assessment.score,
            decision: assessment.decision.as_str().to_string(),
            sanctions_match: assessment.sanctions_match,
            pep_match: assessment.pep_match,
            screening_defaulted: assessment.screening_defaulted,
        });
        self.metrics
            .observe("verification.risk_score", assessment.score);

        match (outcome.resolved_action, assessment.decision) {
            (RuleAction::Block, _) => {
                let rule_name = outcome
                    .alerts
                    .iter()
                    .find(|a| a.action == RuleAction::Block)
                    .map(|a| a.rule_name.clone())
                    .unwrap_or_else(|| "blocking rule".to_string());
                case.status = next_status(case.status, Trigger::Disqualify)?;
                case.rejection_reason = Some(format!("disqualified by rule: {rule_name}"));
                events.push(CaseEvent::AutoRejected { rule_name });
            }
            (RuleAction::Allow, RiskDecision::AutoApprove) => {
                case.status = next_status(case.status, Trigger::AssessApprove)?;
                case.approved_at = Some(now);
                let expires = now + Duration::days(self.config.validity_days(&case.kind));
                case.expires_at = Some(expires);
                if case.kind.is_kyb() {
                    events.extend(advance_stage(case, KybStage::Completed));
                }
                events.push(CaseEvent::AutoApproved {
                    score: assessment.score,
                    expires_at: expires,
                });
            }
            // Any restrictive rule action, or any decision short of the top
            // band, lands with a human.
            _ => {
                case.status = next_status(case.status, Trigger::AssessReview)?;
                events.push(CaseEvent::MovedToManualReview {
                    score: assessment.score,
                    reasons: assessment.factors.clone(),
                });
            }
        }

        case.assessment = Some(assessment);
        case.updated_at = now;
        self.stash_alerts(case.case_id, &outcome)?;
        Ok(events)
    }

    /// Screen every active owner and write the outcome onto the in-memory
    /// owner records. Store writes happen in the commit pass.
    fn screen_owners(&self, case: &mut VerificationCase) -> VerifyResult<Vec<OwnerInput>> {
        let timeout = self.config.screening_timeout();
        let mut inputs = Vec::new();
        for owner in case.owners.iter_mut().filter(|o| o.active) {
            let result = match &owner.party {
                OwnerParty::Individual {
                    full_name,
                    date_of_birth,
                    nationality,
                } => self.screening.screen_individual(
                    &IndividualQuery {
                        full_name: full_name.clone(),
                        date_of_birth: *date_of_birth,
                        nationality: nationality.clone(),
                        address: None,
                    },
                    timeout,
                ),
                OwnerParty::Entity {
                    legal_name,
                    registration_number,
                    country,
                } => self.screening.screen_business(
                    &BusinessQuery {
                        legal_name: legal_name.clone(),
                        registration_number: registration_number.clone(),
                        country: country.clone(),
                        address: None,
                    },
                    timeout,
                ),
            }
            .map_err(|e| VerifyError::ScreeningUnavailable {
                case_id: case.case_id,
                reason: format!("owner {}: {e}", owner.owner_id),
            })?;

            owner.sanctions_match = Some(result.sanctions_match);
            owner.pep_match = Some(result.pep_match);
            inputs.push(OwnerInput {
                owner_id: owner.owner_id,
                name: owner.party.name().to_string(),
                screening: result,
            });
        }
        Ok(inputs)
    }

    /// Persist an assessed case: owner screening columns, the assessment
    /// row, the case row, and the event log, then publish.
    fn commit_assessment(
        &self,
        case: &VerificationCase,
        events: Vec<CaseEvent>,
        now: DateTime<Utc>,
    ) -> VerifyResult<()> {
        {
            let store = self.store();
            for owner in case.active_owners() {
                if let (Some(sanctions), Some(pep)) =
                    (owner.sanctions_match, owner.pep_match)
                {
                    let score = case
                        .assessment
                        .as_ref()
                        .and_then(|a| {
                            a.owner_scores
                                .iter()
                                .find(|s| s.owner_id == owner.owner_id)
                        })
                        .map(|s| s.score)
                        .unwrap_or(0.0);
                    store.update_owner_screening(owner.owner_id, sanctions, pep, score)?;
                }
            }
            if let Some(assessment) = &case.assessment {
                store.insert_assessment(case.case_id, assessment)?;
            }
            store.update_case(case)?;
            append_events(&store, case, &events, now)?;
        }
        self.publish(case, events, now);
        Ok(())
    }

    fn stash_alerts(&self, case_id: CaseId, outcome: &EvaluationOutcome) -> VerifyResult<()> {
        if outcome.alerts.is_empty() {
            return Ok(());
        }
        let store = self.store();
        for alert in &outcome.alerts {
            store.insert_alert(case_id, alert)?;
        }
        Ok(())
    }

    // ── Contexts ───────────────────────────────────────────────

    /// Declared subject data plus the screening result; everything the
    /// pre-screen rules may probe.
    fn base_context(
        &self,
        case: &VerificationCase,
        screening: &ScreeningResult,
        now: DateTime<Utc>,
    ) -> RuleContext {
        let mut ctx = RuleContext::new();
        match &case.profile {
            SubjectProfile::Individual(p) => {
                ctx.insert("subject.full_name".to_string(), json!(p.full_name));
                if let Some(n) = &p.nationality {
                    ctx.insert("subject.nationality".to_string(), json!(n));
                }
                if let Some(c) = &p.residence_country {
                    ctx.insert("subject.residence_country".to_string(), json!(c));
                }
                if let Some(age) = p.age_at(now) {
                    ctx.insert("subject.age".to_string(), json!(age));
                }
            }
            SubjectProfile::Business(b) => {
                ctx.insert("business.legal_name".to_string(), json!(b.legal_name));
                if let Some(c) = &b.country {
                    ctx.insert("business.country".to_string(), json!(c));
                }
                if let Some(i) = &b.industry {
                    ctx.insert("business.industry".to_string(), json!(i));
                }
            }
        }
        ctx.insert(
            "screening.sanctions_match".to_string(),
            json!(screening.sanctions_match),
        );
        ctx.insert(
            "screening.pep_match".to_string(),
            json!(screening.pep_match),
        );
        ctx.insert(
            "screening.adverse_media_match".to_string(),
            json!(screening.adverse_media_match),
        );
        ctx.insert(
            "screening.country_risk".to_string(),
            json!(screening.country_risk),
        );
        ctx.insert(
            "screening.strongest_match".to_string(),
            json!(screening.strongest_match()),
        );
        ctx.insert("screening.defaulted".to_string(), json!(screening.defaulted));
        ctx
    }

    fn assessment_context(
        &self,
        case: &VerificationCase,
        screening: &ScreeningResult,
        now: DateTime<Utc>,
    ) -> RuleContext {
        let mut ctx = self.base_context(case, screening, now);
        ctx.insert("documents.count".to_string(), json!(case.documents.len()));
        if let Some(q) = case.mean_document_quality() {
            ctx.insert("documents.mean_quality".to_string(), json!(q));
        }
        if let Some(min) = case
            .documents
            .iter()
            .map(|d| d.quality.overall)
            .fold(None, |acc: Option<f64>, q| Some(acc.map_or(q, |a| a.min(q))))
        {
            ctx.insert("documents.min_quality".to_string(), json!(min));
        }
        if let Some(r) = case.max_fraud_risk() {
            ctx.insert("documents.max_fraud_risk".to_string(), json!(r));
        }
        if case.kind.is_kyb() {
            let owners: Vec<&BeneficialOwner> = case.active_owners().collect();
            ctx.insert("owners.count".to_string(), json!(owners.len()));
            ctx.insert(
                "owners.total_ownership_pct".to_string(),
                json!(case.total_ownership_pct()),
            );
            ctx.insert(
                "owners.ubo_count".to_string(),
                json!(owners.iter().filter(|o| o.is_ubo).count()),
            );
            ctx.insert(
                "owners.any_sanctions".to_string(),
                json!(owners.iter().any(|o| o.sanctions_match == Some(true))),
            );
            ctx.insert(
                "owners.any_pep".to_string(),
                json!(owners.iter().any(|o| o.pep_match == Some(true))),
            );
        }
        ctx
    }

    // ── Plumbing ───────────────────────────────────────────────

    fn store(&self) -> MutexGuard<'_, VerificationStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn case_lock(&self, case_id: CaseId) -> Arc<Mutex<()>> {
        let mut locks = self.case_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(case_id).or_default().clone()
    }

    fn load_case(&self, case_id: CaseId) -> VerifyResult<VerificationCase> {
        self.store()
            .load_case(case_id)?
            .ok_or(VerifyError::CaseNotFound(case_id))
    }

    fn screen_subject(
        &self,
        profile: &SubjectProfile,
    ) -> Result<ScreeningResult, crate::screening::ScreeningError> {
        let timeout = self.config.screening_timeout();
        match profile {
            SubjectProfile::Individual(p) => self.screening.screen_individual(
                &IndividualQuery {
                    full_name: p.full_name.clone(),
                    date_of_birth: p.date_of_birth,
                    nationality: p.nationality.clone(),
                    address: p.address.clone(),
                },
                timeout,
            ),
            SubjectProfile::Business(b) => self.screening.screen_business(
                &BusinessQuery {
                    legal_name: b.legal_name.clone(),
                    registration_number: b.registration_number.clone(),
                    country: b.country.clone(),
                    address: b.address.clone(),
                },
                timeout,
            ),
        }
    }

    fn evaluate_rules(
        &self,
        kind: RuleKind,
        ctx: &RuleContext,
        now: DateTime<Utc>,
    ) -> EvaluationOutcome {
        self.rules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .evaluate(kind, ctx, now)
    }

    /// Persist the case row and event log in one store pass, then publish.
    fn commit(
        &self,
        case: &VerificationCase,
        events: Vec<CaseEvent>,
        now: DateTime<Utc>,
    ) -> VerifyResult<()> {
        {
            let store = self.store();
            store.update_case(case)?;
            append_events(&store, case, &events, now)?;
        }
        self.publish(case, events, now);
        Ok(())
    }

    fn publish(&self, case: &VerificationCase, events: Vec<CaseEvent>, now: DateTime<Utc>) {
        for event in events {
            self.bus.publish(&WorkflowEvent {
                case_id: case.case_id,
                subject_id: case.subject_id.clone(),
                event,
                timestamp: now,
            });
        }
    }
}

fn append_events(
    store: &VerificationStore,
    case: &VerificationCase,
    events: &[CaseEvent],
    now: DateTime<Utc>,
) -> VerifyResult<()> {
    for event in events {
        store.append_event(&EventLogEntry {
            id: None,
            case_id: case.case_id,
            subject_id: case.subject_id.clone(),
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(event)?,
            created_at: now,
        })?;
    }
    Ok(())
}

/// Move the KYB stage forward, emitting an event only on actual movement.
fn advance_stage(case: &mut VerificationCase, to: KybStage) -> Option<CaseEvent> {
    let before = case.stage;
    case.advance_stage(to);
    (case.stage != before).then(|| CaseEvent::StageAdvanced {
        stage: to.as_str().to_string(),
    })
}
