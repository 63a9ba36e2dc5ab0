//! Risk scoring.
//!
//! Fuses document quality, screening results, and entity attributes into a
//! normalized confidence score plus a decision. This module:
//!   1. Scores individuals from quality, watchlist flags, country risk,
//!      and age verification
//!   2. Scores businesses by folding in industry and jurisdiction risk and
//!      aggregating per-owner scores
//!   3. Decides auto-approve vs manual review; there is no auto-reject
//!      band, everything below the top band routes to a human
//!
//! Every deduction is recorded as a factor string so a reviewer can see
//! exactly how the score was reached.

use chrono::{DateTime, Utc};

use crate::case::{
    BusinessProfile, IndividualProfile, OwnerScore, RiskAssessment, RiskDecision,
};
use crate::config::{IndustryRiskTable, RiskThresholds, VerificationConfig};
use crate::screening::ScreeningResult;
use crate::types::OwnerId;

// ── Constants ────────────────────────────────────────────────────────────────

/// Mean document quality below this loses the quality deduction.
const DOC_QUALITY_FLOOR: f64 = 0.8;
const DOC_QUALITY_DEDUCTION: f64 = 0.2;

const SANCTIONS_DEDUCTION: f64 = 0.5;
const PEP_DEDUCTION: f64 = 0.3;
const ADVERSE_MEDIA_DEDUCTION: f64 = 0.2;

/// Country (KYC) and jurisdiction (KYB) risk weight.
const COUNTRY_RISK_WEIGHT: f64 = 0.3;
const INDUSTRY_RISK_WEIGHT: f64 = 0.2;

const AGE_DEDUCTION: f64 = 0.1;

/// Per owner scoring below the low-owner threshold.
const LOW_OWNER_DEDUCTION: f64 = 0.1;
/// Flat penalty when declared ownership coverage is under the minimum.
const LOW_COVERAGE_DEDUCTION: f64 = 0.1;

// ── Inputs ───────────────────────────────────────────────────────────────────

/// One beneficial owner plus that owner's screening result.
#[derive(Debug, Clone)]
pub struct OwnerInput {
    pub owner_id: OwnerId,
    pub name: String,
    pub screening: ScreeningResult,
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct RiskEngine {
    thresholds: RiskThresholds,
    industry: IndustryRiskTable,
}

impl RiskEngine {
    pub fn new(config: &VerificationConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            industry: config.industry_risk.clone(),
        }
    }

    pub fn assess_individual(
        &self,
        profile: &IndividualProfile,
        mean_doc_quality: f64,
        screening: &ScreeningResult,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let mut score = 1.0;
        let mut factors = Vec::new();

        if mean_doc_quality < DOC_QUALITY_FLOOR {
            score -= DOC_QUALITY_DEDUCTION;
            factors.push(format!(
                "mean document quality {mean_doc_quality:.2} below {DOC_QUALITY_FLOOR:.2} (-{DOC_QUALITY_DEDUCTION:.2})"
            ));
        }
        self.apply_screening_deductions(&mut score, &mut factors, screening);

        match profile.age_at(now) {
            Some(age) if age < self.thresholds.min_age_years => {
                score -= AGE_DEDUCTION;
                factors.push(format!(
                    "age {age} below minimum {} (-{AGE_DEDUCTION:.2})",
                    self.thresholds.min_age_years
                ));
            }
            Some(_) => {}
            None => {
                // Unverifiable age is treated as a failed check.
                score -= AGE_DEDUCTION;
                factors.push(format!(
                    "date of birth undeclared, age unverified (-{AGE_DEDUCTION:.2})"
                ));
            }
        }

        let score = score.clamp(0.0, 1.0);
        self.annotate_floor(score, &mut factors);
        let decision =
            self.decide(score, screening.sanctions_match, screening.pep_match, None);

        RiskAssessment {
            score,
            decision,
            sanctions_match: screening.sanctions_match,
            pep_match: screening.pep_match,
            adverse_media_match: screening.adverse_media_match,
            country_risk: screening.country_risk,
            screening_defaulted: screening.defaulted,
            factors,
            owner_scores: Vec::new(),
            rule_contribution: 0.0,
            assessed_at: now,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn assess_business(
        &self,
        business: &BusinessProfile,
        mean_doc_quality: f64,
        screening: &ScreeningResult,
        owners: &[OwnerInput],
        total_ownership_pct: f64,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let mut score = 1.0;
        let mut factors = Vec::new();

        if mean_doc_quality < DOC_QUALITY_FLOOR {
            score -= DOC_QUALITY_DEDUCTION;
            factors.push(format!(
                "mean document quality {mean_doc_quality:.2} below {DOC_QUALITY_FLOOR:.2} (-{DOC_QUALITY_DEDUCTION:.2})"
            ));
        }
        self.apply_screening_deductions(&mut score, &mut factors, screening);

        let industry_risk = self.industry.score_for(business.industry.as_deref());
        score -= industry_risk * INDUSTRY_RISK_WEIGHT;
        factors.push(format!(
            "industry risk {industry_risk:.2} (-{:.2})",
            industry_risk * INDUSTRY_RISK_WEIGHT
        ));

        let owner_scores: Vec<OwnerScore> =
            owners.iter().map(|o| self.score_owner(o)).collect();
        let low_owners = owner_scores
            .iter()
            .filter(|o| o.score < self.thresholds.owner_low)
            .count();
        if low_owners > 0 {
            let penalty = low_owners as f64 * LOW_OWNER_DEDUCTION;
            score -= penalty;
            factors.push(format!(
                "{low_owners} owner(s) below {:.2} (-{penalty:.2})",
                self.thresholds.owner_low
            ));
        }
        if total_ownership_pct < self.thresholds.ownership_coverage_min_pct {
            score -= LOW_COVERAGE_DEDUCTION;
            factors.push(format!(
                "declared ownership {total_ownership_pct:.1}% below {:.1}% (-{LOW_COVERAGE_DEDUCTION:.2})",
                self.thresholds.ownership_coverage_min_pct
            ));
        }

        let score = score.clamp(0.0, 1.0);
        self.annotate_floor(score, &mut factors);

        // Case-level flags include the owners; an owner hit must demand the
        // same override a business hit does.
        let sanctions_match =
            screening.sanctions_match || owner_scores.iter().any(|o| o.sanctions_match);
        let pep_match = owner_scores.iter().any(|o| o.pep_match);
        let min_owner = owner_scores
            .iter()
            .map(|o| o.score)
            .fold(None, |acc: Option<f64>, s| {
                Some(acc.map_or(s, |a| a.min(s)))
            });
        let decision = self.decide(score, sanctions_match, pep_match, min_owner);

        RiskAssessment {
            score,
            decision,
            sanctions_match,
            pep_match,
            adverse_media_match: screening.adverse_media_match,
            country_risk: screening.country_risk,
            screening_defaulted: screening.defaulted
                || owners.iter().any(|o| o.screening.defaulted),
            factors,
            owner_scores,
            rule_contribution: 0.0,
            assessed_at: now,
        }
    }

    /// Individual formula minus the document term; owners submit no
    /// documents of their own.
    fn score_owner(&self, owner: &OwnerInput) -> OwnerScore {
        let mut score = 1.0;
        let s = &owner.screening;
        if s.sanctions_match {
            score -= SANCTIONS_DEDUCTION;
        }
        if s.pep_match {
            score -= PEP_DEDUCTION;
        }
        if s.adverse_media_match {
            score -= ADVERSE_MEDIA_DEDUCTION;
        }
        score -= s.country_risk * COUNTRY_RISK_WEIGHT;
        OwnerScore {
            owner_id: owner.owner_id,
            name: owner.name.clone(),
            score: score.clamp(0.0, 1.0),
            sanctions_match: s.sanctions_match,
            pep_match: s.pep_match,
        }
    }

    fn apply_screening_deductions(
        &self,
        score: &mut f64,
        factors: &mut Vec<String>,
        screening: &ScreeningResult,
    ) {
        if screening.sanctions_match {
            *score -= SANCTIONS_DEDUCTION;
            factors.push(format!("sanctions list match (-{SANCTIONS_DEDUCTION:.2})"));
        }
        if screening.pep_match {
            *score -= PEP_DEDUCTION;
            factors.push(format!("pep match (-{PEP_DEDUCTION:.2})"));
        }
        if screening.adverse_media_match {
            *score -= ADVERSE_MEDIA_DEDUCTION;
            factors.push(format!(
                "adverse media match (-{ADVERSE_MEDIA_DEDUCTION:.2})"
            ));
        }
        *score -= screening.country_risk * COUNTRY_RISK_WEIGHT;
        factors.push(format!(
            "country risk {:.2} (-{:.2})",
            screening.country_risk,
            screening.country_risk * COUNTRY_RISK_WEIGHT
        ));
        if screening.defaulted {
            factors.push("screening defaulted to safe values".to_string());
        }
    }

    fn annotate_floor(&self, score: f64, factors: &mut Vec<String>) {
        if score < self.thresholds.review_floor {
            factors.push(format!(
                "score {score:.2} below review floor {:.2}",
                self.thresholds.review_floor
            ));
        }
    }

    /// Auto-approve is strict: top-band score, clean flags, and for KYB
    /// every owner in the top band too. Everything else is a human's call.
    fn decide(
        &self,
        score: f64,
        sanctions: bool,
        pep: bool,
        min_owner: Option<f64>,
    ) -> RiskDecision {
        let owners_ok =
            min_owner.is_none_or(|m| m >= self.thresholds.owner_auto_approve);
        if score >= self.thresholds.auto_approve && !sanctions && !pep && owners_ok {
            RiskDecision::AutoApprove
        } else {
            RiskDecision::ManualReview
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn config() -> VerificationConfig {
        VerificationConfig::default()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn adult() -> IndividualProfile {
        IndividualProfile {
            full_name: "Jane Ordinary".into(),
            date_of_birth: chrono::NaiveDate::from_ymd_opt(1996, 5, 4),
            nationality: Some("US".into()),
            residence_country: Some("US".into()),
            address: None,
        }
    }

    #[test]
    fn clean_adult_with_good_documents_auto_approves() {
        let engine = RiskEngine::new(&config());
        let assessment =
            engine.assess_individual(&adult(), 0.95, &ScreeningResult::clean(0.05), now());
        assert!(
            assessment.score > 0.95,
            "Expected top-band score, got {}",
            assessment.score
        );
        assert_eq!(assessment.decision, RiskDecision::AutoApprove);
        assert_eq!(
            assessment.factors.len(),
            1,
            "Only the country-risk line should be recorded: {:?}",
            assessment.factors
        );
    }

    #[test]
    fn sanctions_match_never_auto_approves() {
        let engine = RiskEngine::new(&config());
        let mut screening = ScreeningResult::clean(0.05);
        screening.sanctions_match = true;
        let assessment = engine.assess_individual(&adult(), 0.95, &screening, now());
        assert_eq!(assessment.decision, RiskDecision::ManualReview);
        assert!(assessment.score < 0.5);
        assert!(assessment.sanctions_match);
    }

    #[test]
    fn defaulted_screening_cannot_reach_the_top_band() {
        let engine = RiskEngine::new(&config());
        let assessment = engine.assess_individual(
            &adult(),
            0.95,
            &ScreeningResult::safe_default(),
            now(),
        );
        assert!(assessment.score < 0.95, "Safe default must cap the score");
        assert_eq!(assessment.decision, RiskDecision::ManualReview);
        assert!(assessment.screening_defaulted);
        assert!(
            assessment.factors.iter().any(|f| f.contains("defaulted")),
            "Default must be visible to reviewers: {:?}",
            assessment.factors
        );
    }

    #[test]
    fn underage_subject_loses_the_age_deduction() {
        let engine = RiskEngine::new(&config());
        let minor = IndividualProfile {
            date_of_birth: chrono::NaiveDate::from_ymd_opt(2010, 1, 1),
            ..adult()
        };
        let assessment =
            engine.assess_individual(&minor, 0.95, &ScreeningResult::clean(0.05), now());
        assert_eq!(assessment.decision, RiskDecision::ManualReview);
        assert!(assessment
            .factors
            .iter()
            .any(|f| f.contains("below minimum")));
    }

    #[test]
    fn undeclared_birth_date_counts_as_failed_age_check() {
        let engine = RiskEngine::new(&config());
        let unknown = IndividualProfile {
            date_of_birth: None,
            ..adult()
        };
        let assessment =
            engine.assess_individual(&unknown, 0.95, &ScreeningResult::clean(0.05), now());
        assert!(assessment
            .factors
            .iter()
            .any(|f| f.contains("unverified")));
        assert_eq!(assessment.decision, RiskDecision::ManualReview);
    }

    fn business() -> BusinessProfile {
        BusinessProfile {
            legal_name: "Northlake Consulting LLC".into(),
            registration_number: Some("C-1008842".into()),
            country: Some("US".into()),
            industry: Some("software consulting".into()),
            address: None,
        }
    }

    fn clean_owner(name: &str) -> OwnerInput {
        OwnerInput {
            owner_id: Uuid::new_v4(),
            name: name.into(),
            screening: ScreeningResult::clean(0.05),
        }
    }

    #[test]
    fn clean_business_still_lands_in_manual_review() {
        // Base industry risk 0.2 folds in at weight 0.2, which keeps even a
        // spotless low-risk business just under the auto-approve bar.
        let engine = RiskEngine::new(&config());
        let owners = vec![clean_owner("Dana Wells"), clean_owner("Priya Nair")];
        let assessment = engine.assess_business(
            &business(),
            0.9,
            &ScreeningResult::clean(0.05),
            &owners,
            80.0,
            now(),
        );
        assert!((assessment.score - 0.945).abs() < 1e-9);
        assert_eq!(assessment.decision, RiskDecision::ManualReview);
        assert_eq!(assessment.owner_scores.len(), 2);
        assert!(assessment.owner_scores.iter().all(|o| o.score > 0.95));
    }

    #[test]
    fn sanctioned_owner_drags_the_case_down() {
        let engine = RiskEngine::new(&config());
        let mut bad = clean_owner("Viktor Bout");
        bad.screening.sanctions_match = true;
        let owners = vec![clean_owner("Dana Wells"), bad];
        let assessment = engine.assess_business(
            &business(),
            0.9,
            &ScreeningResult::clean(0.05),
            &owners,
            100.0,
            now(),
        );
        assert!(assessment.sanctions_match, "Owner hit must flag the case");
        assert_eq!(assessment.decision, RiskDecision::ManualReview);
        let worst = assessment
            .owner_scores
            .iter()
            .map(|o| o.score)
            .fold(f64::MAX, f64::min);
        assert!(worst < 0.5, "Sanctioned owner should score low, got {worst}");
        assert!(assessment
            .factors
            .iter()
            .any(|f| f.contains("owner(s) below")));
    }

    #[test]
    fn thin_ownership_coverage_is_penalized() {
        let engine = RiskEngine::new(&config());
        let owners = vec![clean_owner("Dana Wells")];
        let assessment = engine.assess_business(
            &business(),
            0.9,
            &ScreeningResult::clean(0.05),
            &owners,
            40.0,
            now(),
        );
        assert!(assessment
            .factors
            .iter()
            .any(|f| f.contains("declared ownership")));
        assert!((assessment.score - 0.845).abs() < 1e-9);
    }
}
