//! Verification case data model.
//!
//! One `VerificationCase` covers either a person (KYC) or a business (KYB)
//! and exclusively owns its submitted documents, beneficial owners, and
//! risk assessment. Status and stage strings are stored verbatim in the
//! database, so every enum here carries `as_str`/`FromStr`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{
    document_analyzer::{FraudReport, QualityReport},
    types::{CaseId, DocumentId, OwnerId, SubjectId},
};

/// Ownership or control at or above this percentage marks an ultimate
/// beneficial owner. The flag is always derived, never taken from input.
pub const UBO_THRESHOLD_PCT: f64 = 25.0;

// ── Enum parsing ─────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("unknown {what}: '{value}'")]
pub struct ParseEnumError {
    pub what: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

// ── Case status ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Pending,
    InProgress,
    RequiresManualReview,
    Approved,
    Rejected,
    Expired,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Pending => "PENDING",
            CaseStatus::InProgress => "IN_PROGRESS",
            CaseStatus::RequiresManualReview => "REQUIRES_MANUAL_REVIEW",
            CaseStatus::Approved => "APPROVED",
            CaseStatus::Rejected => "REJECTED",
            CaseStatus::Expired => "EXPIRED",
        }
    }

    /// APPROVED and REJECTED freeze the case record entirely; EXPIRED
    /// additionally ends the lifecycle (only re-initiation follows it).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaseStatus::Approved | CaseStatus::Rejected | CaseStatus::Expired
        )
    }

    pub fn accepts_documents(&self) -> bool {
        matches!(self, CaseStatus::Pending | CaseStatus::InProgress)
    }

    /// Statuses that block a subject from opening another case. APPROVED
    /// counts only while unexpired, which the store checks against
    /// `expires_at`.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CaseStatus::Pending
                | CaseStatus::InProgress
                | CaseStatus::RequiresManualReview
                | CaseStatus::Approved
        )
    }
}

impl FromStr for CaseStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(CaseStatus::Pending),
            "IN_PROGRESS" => Ok(CaseStatus::InProgress),
            "REQUIRES_MANUAL_REVIEW" => Ok(CaseStatus::RequiresManualReview),
            "APPROVED" => Ok(CaseStatus::Approved),
            "REJECTED" => Ok(CaseStatus::Rejected),
            "EXPIRED" => Ok(CaseStatus::Expired),
            other => Err(ParseEnumError::new("case status", other)),
        }
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── KYB stage ────────────────────────────────────────────────────────────────

/// Finer-grained progress marker for KYB cases. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KybStage {
    DocumentsPending,
    DocumentsUploaded,
    EntityVerification,
    OwnerVerification,
    Completed,
}

impl KybStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            KybStage::DocumentsPending => "DOCUMENTS_PENDING",
            KybStage::DocumentsUploaded => "DOCUMENTS_UPLOADED",
            KybStage::EntityVerification => "ENTITY_VERIFICATION",
            KybStage::OwnerVerification => "OWNER_VERIFICATION",
            KybStage::Completed => "COMPLETED",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            KybStage::DocumentsPending => 0,
            KybStage::DocumentsUploaded => 1,
            KybStage::EntityVerification => 2,
            KybStage::OwnerVerification => 3,
            KybStage::Completed => 4,
        }
    }
}

impl FromStr for KybStage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DOCUMENTS_PENDING" => Ok(KybStage::DocumentsPending),
            "DOCUMENTS_UPLOADED" => Ok(KybStage::DocumentsUploaded),
            "ENTITY_VERIFICATION" => Ok(KybStage::EntityVerification),
            "OWNER_VERIFICATION" => Ok(KybStage::OwnerVerification),
            "COMPLETED" => Ok(KybStage::Completed),
            other => Err(ParseEnumError::new("kyb stage", other)),
        }
    }
}

// ── Kind and tier ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycTier {
    Basic,
    Standard,
    Enhanced,
}

impl KycTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycTier::Basic => "BASIC",
            KycTier::Standard => "STANDARD",
            KycTier::Enhanced => "ENHANCED",
        }
    }
}

impl FromStr for KycTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BASIC" => Ok(KycTier::Basic),
            "STANDARD" => Ok(KycTier::Standard),
            "ENHANCED" => Ok(KycTier::Enhanced),
            other => Err(ParseEnumError::new("kyc tier", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusinessType {
    SoleProprietorship,
    Partnership,
    LimitedCompany,
    Corporation,
    Nonprofit,
}

impl BusinessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessType::SoleProprietorship => "SOLE_PROPRIETORSHIP",
            BusinessType::Partnership => "PARTNERSHIP",
            BusinessType::LimitedCompany => "LIMITED_COMPANY",
            BusinessType::Corporation => "CORPORATION",
            BusinessType::Nonprofit => "NONPROFIT",
        }
    }
}

impl FromStr for BusinessType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOLE_PROPRIETORSHIP" => Ok(BusinessType::SoleProprietorship),
            "PARTNERSHIP" => Ok(BusinessType::Partnership),
            "LIMITED_COMPANY" => Ok(BusinessType::LimitedCompany),
            "CORPORATION" => Ok(BusinessType::Corporation),
            "NONPROFIT" => Ok(BusinessType::Nonprofit),
            other => Err(ParseEnumError::new("business type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tier", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseKind {
    Kyc(KycTier),
    Kyb(BusinessType),
}

impl CaseKind {
    pub fn kind_str(&self) -> &'static str {
        match self {
            CaseKind::Kyc(_) => "KYC",
            CaseKind::Kyb(_) => "KYB",
        }
    }

    pub fn tier_str(&self) -> &'static str {
        match self {
            CaseKind::Kyc(tier) => tier.as_str(),
            CaseKind::Kyb(bt) => bt.as_str(),
        }
    }

    pub fn is_kyb(&self) -> bool {
        matches!(self, CaseKind::Kyb(_))
    }

    /// Lookup key into the document-requirements config, e.g.
    /// "kyc.basic" or "kyb.limited_company".
    pub fn requirement_key(&self) -> String {
        format!(
            "{}.{}",
            self.kind_str().to_ascii_lowercase(),
            self.tier_str().to_ascii_lowercase()
        )
    }

    pub fn from_parts(kind: &str, tier: &str) -> Result<Self, ParseEnumError> {
        match kind {
            "KYC" => Ok(CaseKind::Kyc(tier.parse()?)),
            "KYB" => Ok(CaseKind::Kyb(tier.parse()?)),
            other => Err(ParseEnumError::new("case kind", other)),
        }
    }
}

// ── Documents ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    NationalId,
    Passport,
    DriversLicense,
    Selfie,
    ProofOfAddress,
    BankStatement,
    SourceOfFunds,
    TaxReturn,
    BusinessRegistration,
    CertificateOfIncorporation,
    ArticlesOfAssociation,
    PartnershipAgreement,
    ShareholderRegister,
    UboDeclaration,
    BusinessProofOfAddress,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::NationalId => "NATIONAL_ID",
            DocumentType::Passport => "PASSPORT",
            DocumentType::DriversLicense => "DRIVERS_LICENSE",
            DocumentType::Selfie => "SELFIE",
            DocumentType::ProofOfAddress => "PROOF_OF_ADDRESS",
            DocumentType::BankStatement => "BANK_STATEMENT",
            DocumentType::SourceOfFunds => "SOURCE_OF_FUNDS",
            DocumentType::TaxReturn => "TAX_RETURN",
            DocumentType::BusinessRegistration => "BUSINESS_REGISTRATION",
            DocumentType::CertificateOfIncorporation => "CERTIFICATE_OF_INCORPORATION",
            DocumentType::ArticlesOfAssociation => "ARTICLES_OF_ASSOCIATION",
            DocumentType::PartnershipAgreement => "PARTNERSHIP_AGREEMENT",
            DocumentType::ShareholderRegister => "SHAREHOLDER_REGISTER",
            DocumentType::UboDeclaration => "UBO_DECLARATION",
            DocumentType::BusinessProofOfAddress => "BUSINESS_PROOF_OF_ADDRESS",
        }
    }
}

impl FromStr for DocumentType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NATIONAL_ID" => Ok(DocumentType::NationalId),
            "PASSPORT" => Ok(DocumentType::Passport),
            "DRIVERS_LICENSE" => Ok(DocumentType::DriversLicense),
            "SELFIE" => Ok(DocumentType::Selfie),
            "PROOF_OF_ADDRESS" => Ok(DocumentType::ProofOfAddress),
            "BANK_STATEMENT" => Ok(DocumentType::BankStatement),
            "SOURCE_OF_FUNDS" => Ok(DocumentType::SourceOfFunds),
            "TAX_RETURN" => Ok(DocumentType::TaxReturn),
            "BUSINESS_REGISTRATION" => Ok(DocumentType::BusinessRegistration),
            "CERTIFICATE_OF_INCORPORATION" => Ok(DocumentType::CertificateOfIncorporation),
            "ARTICLES_OF_ASSOCIATION" => Ok(DocumentType::ArticlesOfAssociation),
            "PARTNERSHIP_AGREEMENT" => Ok(DocumentType::PartnershipAgreement),
            "SHAREHOLDER_REGISTER" => Ok(DocumentType::ShareholderRegister),
            "UBO_DECLARATION" => Ok(DocumentType::UboDeclaration),
            "BUSINESS_PROOF_OF_ADDRESS" => Ok(DocumentType::BusinessProofOfAddress),
            other => Err(ParseEnumError::new("document type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentSide {
    #[default]
    Front,
    Back,
}

impl DocumentSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSide::Front => "FRONT",
            DocumentSide::Back => "BACK",
        }
    }
}

impl FromStr for DocumentSide {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FRONT" => Ok(DocumentSide::Front),
            "BACK" => Ok(DocumentSide::Back),
            other => Err(ParseEnumError::new("document side", other)),
        }
    }
}

/// One accepted submission. Owned by its case; never shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: DocumentId,
    pub doc_type: DocumentType,
    pub side: DocumentSide,
    pub file_name: String,
    pub mime_type: String,
    pub storage_ref: String,
    pub quality: QualityReport,
    pub fraud: FraudReport,
    pub extracted_fields: Option<serde_json::Value>,
    pub ocr_confidence: Option<f64>,
    pub submitted_at: DateTime<Utc>,
}

// ── Subject profile ──────────────────────────────────────────────────────────

/// Declared data captured at initiation. This is what the pre-screen runs
/// on, before any document exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubjectProfile {
    Individual(IndividualProfile),
    Business(BusinessProfile),
}

impl SubjectProfile {
    pub fn display_name(&self) -> &str {
        match self {
            SubjectProfile::Individual(p) => &p.full_name,
            SubjectProfile::Business(p) => &p.legal_name,
        }
    }

    pub fn as_individual(&self) -> Option<&IndividualProfile> {
        match self {
            SubjectProfile::Individual(p) => Some(p),
            SubjectProfile::Business(_) => None,
        }
    }

    pub fn as_business(&self) -> Option<&BusinessProfile> {
        match self {
            SubjectProfile::Business(p) => Some(p),
            SubjectProfile::Individual(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualProfile {
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub residence_country: Option<String>,
    pub address: Option<String>,
}

impl IndividualProfile {
    /// Whole years between date of birth and `now`. None when DOB is
    /// undeclared or in the future.
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<u32> {
        self.date_of_birth
            .and_then(|dob| now.date_naive().years_since(dob))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub legal_name: String,
    pub registration_number: Option<String>,
    pub country: Option<String>,
    pub industry: Option<String>,
    pub address: Option<String>,
}

// ── Beneficial owners ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "party", rename_all = "snake_case")]
pub enum OwnerParty {
    Individual {
        full_name: String,
        date_of_birth: Option<NaiveDate>,
        nationality: Option<String>,
    },
    Entity {
        legal_name: String,
        registration_number: Option<String>,
        country: Option<String>,
    },
}

impl OwnerParty {
    pub fn name(&self) -> &str {
        match self {
            OwnerParty::Individual { full_name, .. } => full_name,
            OwnerParty::Entity { legal_name, .. } => legal_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeneficialOwner {
    pub owner_id: OwnerId,
    pub party: OwnerParty,
    pub ownership_pct: f64,
    pub control_pct: f64,
    /// Derived from the 25% threshold; recomputed on every ownership or
    /// control change, never trusted from input.
    pub is_ubo: bool,
    pub sanctions_match: Option<bool>,
    pub pep_match: Option<bool>,
    pub risk_score: Option<f64>,
    pub active: bool,
    pub added_at: DateTime<Utc>,
}

impl BeneficialOwner {
    pub fn recompute_ubo(&mut self) {
        self.is_ubo =
            self.ownership_pct >= UBO_THRESHOLD_PCT || self.control_pct >= UBO_THRESHOLD_PCT;
    }
}

// ── Risk assessment ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskDecision {
    AutoApprove,
    ManualReview,
}

impl RiskDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskDecision::AutoApprove => "AUTO_APPROVE",
            RiskDecision::ManualReview => "MANUAL_REVIEW",
        }
    }
}

impl FromStr for RiskDecision {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTO_APPROVE" => Ok(RiskDecision::AutoApprove),
            "MANUAL_REVIEW" => Ok(RiskDecision::ManualReview),
            other => Err(ParseEnumError::new("risk decision", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerScore {
    pub owner_id: OwnerId,
    pub name: String,
    pub score: f64,
    pub sanctions_match: bool,
    pub pep_match: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Normalized confidence, 1.0 = lowest risk.
    pub score: f64,
    pub decision: RiskDecision,
    pub sanctions_match: bool,
    pub pep_match: bool,
    pub adverse_media_match: bool,
    pub country_risk: f64,
    /// True when the screening provider failed and the safe default was
    /// used. Never a silent clean pass.
    pub screening_defaulted: bool,
    /// Human-readable list of every deduction applied.
    pub factors: Vec<String>,
    /// KYB only: per-owner scores in owner insertion order.
    pub owner_scores: Vec<OwnerScore>,
    /// Aggregate severity weight of triggered compliance rules, already
    /// divided by 100 and clamped to [0,1]. Audit-only.
    pub rule_contribution: f64,
    pub assessed_at: DateTime<Utc>,
}

// ── KYB declarations ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Declarations {
    /// All beneficial owners at or above the UBO threshold are declared.
    pub ubo_complete: bool,
    /// Submitter attests the information is accurate and complete.
    pub final_attestation: bool,
}

impl Declarations {
    pub fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.ubo_complete {
            out.push("ubo_complete");
        }
        if !self.final_attestation {
            out.push("final_attestation");
        }
        out
    }
}

// ── The case ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCase {
    pub case_id: CaseId,
    pub subject_id: SubjectId,
    pub kind: CaseKind,
    pub profile: SubjectProfile,
    pub status: CaseStatus,
    pub stage: Option<KybStage>,
    pub documents: Vec<Document>,
    pub owners: Vec<BeneficialOwner>,
    pub assessment: Option<RiskAssessment>,
    /// KYB submission declarations; stays default for KYC.
    pub declarations: Declarations,
    /// Set when a reviewer approved over a sanctions or PEP flag.
    pub risk_override: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationCase {
    pub fn new(
        subject_id: SubjectId,
        kind: CaseKind,
        profile: SubjectProfile,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            case_id: uuid::Uuid::new_v4(),
            subject_id,
            kind,
            stage: kind.is_kyb().then_some(KybStage::DocumentsPending),
            profile,
            status: CaseStatus::Pending,
            documents: Vec::new(),
            owners: Vec::new(),
            assessment: None,
            declarations: Declarations::default(),
            risk_override: false,
            submitted_at: None,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            rejection_reason: None,
            approved_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_document(&self, doc_type: DocumentType, side: DocumentSide) -> bool {
        self.documents
            .iter()
            .any(|d| d.doc_type == doc_type && d.side == side)
    }

    pub fn submitted_types(&self) -> Vec<DocumentType> {
        self.documents.iter().map(|d| d.doc_type).collect()
    }

    pub fn active_owners(&self) -> impl Iterator<Item = &BeneficialOwner> {
        self.owners.iter().filter(|o| o.active)
    }

    pub fn total_ownership_pct(&self) -> f64 {
        self.active_owners().map(|o| o.ownership_pct).sum()
    }

    pub fn mean_document_quality(&self) -> Option<f64> {
        if self.documents.is_empty() {
            return None;
        }
        let sum: f64 = self.documents.iter().map(|d| d.quality.overall).sum();
        Some(sum / self.documents.len() as f64)
    }

    pub fn max_fraud_risk(&self) -> Option<f64> {
        self.documents
            .iter()
            .map(|d| d.fraud.risk_score)
            .fold(None, |acc, r| Some(acc.map_or(r, |a: f64| a.max(r))))
    }

    /// Advance the KYB stage. Stages only move forward; a lower or equal
    /// target is ignored.
    pub fn advance_stage(&mut self, to: KybStage) {
        if let Some(current) = self.stage {
            if to.rank() > current.rank() {
                self.stage = Some(to);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_never_moves_backwards() {
        let mut case = VerificationCase::new(
            "biz-1".into(),
            CaseKind::Kyb(BusinessType::LimitedCompany),
            SubjectProfile::Business(BusinessProfile {
                legal_name: "Acme Ltd".into(),
                registration_number: None,
                country: None,
                industry: None,
                address: None,
            }),
            Utc::now(),
        );
        case.advance_stage(KybStage::OwnerVerification);
        case.advance_stage(KybStage::DocumentsUploaded);
        assert_eq!(
            case.stage,
            Some(KybStage::OwnerVerification),
            "Stage should stay at OWNER_VERIFICATION, got {:?}",
            case.stage
        );
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            CaseStatus::Pending,
            CaseStatus::InProgress,
            CaseStatus::RequiresManualReview,
            CaseStatus::Approved,
            CaseStatus::Rejected,
            CaseStatus::Expired,
        ] {
            let parsed: CaseStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn ubo_flag_follows_threshold() {
        let mut owner = BeneficialOwner {
            owner_id: uuid::Uuid::new_v4(),
            party: OwnerParty::Individual {
                full_name: "Pat Doe".into(),
                date_of_birth: None,
                nationality: None,
            },
            ownership_pct: 20.0,
            control_pct: 0.0,
            is_ubo: true, // stale input value, must be recomputed
            sanctions_match: None,
            pep_match: None,
            risk_score: None,
            active: true,
            added_at: Utc::now(),
        };
        owner.recompute_ubo();
        assert!(!owner.is_ubo, "20%/0% should not be a UBO");

        owner.control_pct = 30.0;
        owner.recompute_ubo();
        assert!(owner.is_ubo, "30% control crosses the threshold");
    }
}
