//! Verification engine configuration.
//!
//! Thresholds, validity windows, per-tier document requirements, and the
//! industry risk table. Defaults carry the production values; `load`
//! overrides them from the data/ directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::case::{CaseKind, DocumentType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Minimum score for the auto-approve decision.
    pub auto_approve: f64,
    /// Scores below this always route to manual review; there is no
    /// auto-reject band.
    pub review_floor: f64,
    /// KYB: every owner must score at least this for auto-approval.
    pub owner_auto_approve: f64,
    /// KYB: owners below this add a per-owner penalty to the case score.
    pub owner_low: f64,
    /// Pre-screen: a sanctions match at or above this strength rejects the
    /// case outright at initiation.
    pub hard_sanctions_match: f64,
    pub min_age_years: u32,
    pub ownership_cap_pct: f64,
    /// KYB: declared ownership coverage below this adds a penalty.
    pub ownership_coverage_min_pct: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            auto_approve: 0.95,
            review_floor: 0.5,
            owner_auto_approve: 0.95,
            owner_low: 0.5,
            hard_sanctions_match: 0.95,
            min_age_years: 18,
            ownership_cap_pct: 100.0,
            ownership_coverage_min_pct: 75.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidityWindows {
    pub kyc_days: i64,
    pub kyb_days: i64,
}

impl Default for ValidityWindows {
    fn default() -> Self {
        Self {
            kyc_days: 365,
            kyb_days: 730,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub timeout_secs: u64,
    /// Caller-side retry budget for `ScreeningUnavailable`. The engine
    /// itself never retries.
    pub max_attempts: u32,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// PENDING/IN_PROGRESS cases idle this long get a stale warning event.
    pub stale_after_days: i64,
    /// Approved cases are expired once now > expires_at + grace.
    pub expiry_grace_days: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            stale_after_days: 14,
            expiry_grace_days: 0,
        }
    }
}

/// Document expectations for one tier or business type. A submission
/// outside required+optional fails as unexpected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierRequirements {
    pub required: Vec<DocumentType>,
    #[serde(default)]
    pub optional: Vec<DocumentType>,
}

impl TierRequirements {
    pub fn accepts(&self, doc_type: DocumentType) -> bool {
        self.required.contains(&doc_type) || self.optional.contains(&doc_type)
    }

    pub fn missing(&self, submitted: &[DocumentType]) -> Vec<DocumentType> {
        self.required
            .iter()
            .filter(|t| !submitted.contains(t))
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndustryRiskTable {
    pub high_risk_keywords: Vec<String>,
    pub medium_risk_keywords: Vec<String>,
    pub high_score: f64,
    pub medium_score: f64,
    /// Industry not declared at all.
    pub unknown_score: f64,
    /// Declared and matching no risk keyword.
    pub base_score: f64,
}

impl IndustryRiskTable {
    /// Case-insensitive keyword containment against the declared industry.
    pub fn score_for(&self, industry: Option<&str>) -> f64 {
        let Some(industry) = industry else {
            return self.unknown_score;
        };
        let lowered = industry.to_lowercase();
        if self
            .high_risk_keywords
            .iter()
            .any(|k| lowered.contains(&k.to_lowercase()))
        {
            self.high_score
        } else if self
            .medium_risk_keywords
            .iter()
            .any(|k| lowered.contains(&k.to_lowercase()))
        {
            self.medium_score
        } else {
            self.base_score
        }
    }
}

impl Default for IndustryRiskTable {
    fn default() -> Self {
        Self {
            high_risk_keywords: [
                "crypto",
                "virtual asset",
                "gambling",
                "casino",
                "money service",
                "remittance",
                "arms",
                "defense",
                "cannabis",
                "adult entertainment",
                "precious metals",
                "shell",
            ]
            .map(String::from)
            .to_vec(),
            medium_risk_keywords: [
                "jewelry",
                "art dealer",
                "real estate",
                "construction",
                "import",
                "export",
                "pawn",
                "used car",
                "nightclub",
                "travel agency",
            ]
            .map(String::from)
            .to_vec(),
            high_score: 0.8,
            medium_score: 0.5,
            unknown_score: 0.3,
            base_score: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub thresholds: RiskThresholds,
    pub validity: ValidityWindows,
    pub screening: ScreeningConfig,
    pub sweeps: SweepConfig,
    /// Keyed by `CaseKind::requirement_key()`, e.g. "kyc.basic".
    pub document_requirements: HashMap<String, TierRequirements>,
    pub industry_risk: IndustryRiskTable,
}

#[derive(Debug, Clone, Deserialize)]
struct ThresholdsFile {
    #[serde(default)]
    thresholds: RiskThresholds,
    #[serde(default)]
    validity: ValidityWindows,
    #[serde(default)]
    screening: ScreeningConfig,
    #[serde(default)]
    sweeps: SweepConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct RequirementsFile {
    tiers: HashMap<String, TierRequirements>,
}

impl VerificationConfig {
    /// Load from the data/ directory. In tests, use
    /// `VerificationConfig::default()`.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/verification/thresholds.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: ThresholdsFile = serde_json::from_str(&content)?;

        let req_path = format!("{data_dir}/verification/document_requirements.json");
        let req_content = std::fs::read_to_string(&req_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {req_path}: {e}"))?;
        let req_file: RequirementsFile = serde_json::from_str(&req_content)?;

        let industry_path = format!("{data_dir}/risk/industry_risk.json");
        let industry_content = std::fs::read_to_string(&industry_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {industry_path}: {e}"))?;
        let industry_risk: IndustryRiskTable = serde_json::from_str(&industry_content)?;

        Ok(Self {
            thresholds: file.thresholds,
            validity: file.validity,
            screening: file.screening,
            sweeps: file.sweeps,
            document_requirements: req_file.tiers,
            industry_risk,
        })
    }

    pub fn requirements_for(&self, kind: &CaseKind) -> Option<&TierRequirements> {
        self.document_requirements.get(&kind.requirement_key())
    }

    pub fn validity_days(&self, kind: &CaseKind) -> i64 {
        if kind.is_kyb() {
            self.validity.kyb_days
        } else {
            self.validity.kyc_days
        }
    }

    pub fn screening_timeout(&self) -> Duration {
        Duration::from_secs(self.screening.timeout_secs)
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        use DocumentType::*;

        let tiers = [
            (
                "kyc.basic".to_string(),
                TierRequirements {
                    required: vec![NationalId, Selfie],
                    optional: vec![Passport, ProofOfAddress],
                },
            ),
            (
                "kyc.standard".to_string(),
                TierRequirements {
                    required: vec![NationalId, Selfie, ProofOfAddress],
                    optional: vec![Passport, BankStatement],
                },
            ),
            (
                "kyc.enhanced".to_string(),
                TierRequirements {
                    required: vec![NationalId, Selfie, ProofOfAddress, SourceOfFunds],
                    optional: vec![Passport, BankStatement, TaxReturn],
                },
            ),
            (
                "kyb.sole_proprietorship".to_string(),
                TierRequirements {
                    required: vec![BusinessRegistration, NationalId, BusinessProofOfAddress],
                    optional: vec![BankStatement, TaxReturn],
                },
            ),
            (
                "kyb.partnership".to_string(),
                TierRequirements {
                    required: vec![
                        PartnershipAgreement,
                        BusinessRegistration,
                        BusinessProofOfAddress,
                        UboDeclaration,
                    ],
                    optional: vec![BankStatement],
                },
            ),
            (
                "kyb.limited_company".to_string(),
                TierRequirements {
                    required: vec![
                        CertificateOfIncorporation,
                        ArticlesOfAssociation,
                        ShareholderRegister,
                        BusinessProofOfAddress,
                        UboDeclaration,
                    ],
                    optional: vec![BankStatement, TaxReturn],
                },
            ),
            (
                "kyb.corporation".to_string(),
                TierRequirements {
                    required: vec![
                        CertificateOfIncorporation,
                        ArticlesOfAssociation,
                        ShareholderRegister,
                        BusinessProofOfAddress,
                        UboDeclaration,
                    ],
                    optional: vec![BankStatement, TaxReturn],
                },
            ),
            (
                "kyb.nonprofit".to_string(),
                TierRequirements {
                    required: vec![
                        CertificateOfIncorporation,
                        ArticlesOfAssociation,
                        BusinessProofOfAddress,
                    ],
                    optional: vec![TaxReturn, UboDeclaration],
                },
            ),
        ]
        .into();

        Self {
            thresholds: RiskThresholds::default(),
            validity: ValidityWindows::default(),
            screening: ScreeningConfig::default(),
            sweeps: SweepConfig::default(),
            document_requirements: tiers,
            industry_risk: IndustryRiskTable::default(),
        }
    }
}
