//! Screening provider boundary.
//!
//! This module:
//!   1. Defines the provider trait the engine calls for individuals,
//!      businesses, and beneficial owners
//!   2. Ships a deterministic in-process watchlist provider
//!   3. Ships fixture providers for tests and demos
//!
//! Logical provider failures degrade to a safe default result flagged
//! `defaulted`; only transport problems (timeouts) surface as errors.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// ── Constants ────────────────────────────────────────────────────────────────

/// Minimum name similarity to count as a match, per category.
const SANCTIONS_MATCH_THRESHOLD: f64 = 0.80;
const PEP_MATCH_THRESHOLD: f64 = 0.85;
const ADVERSE_MEDIA_MATCH_THRESHOLD: f64 = 0.80;

/// Country risk when the provider fails or knows nothing. Chosen so a
/// defaulted screen alone keeps the risk score under the auto-approve bar.
pub const DEFAULT_COUNTRY_RISK: f64 = 0.2;

// ── Queries and results ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IndividualQuery {
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BusinessQuery {
    pub legal_name: String,
    pub registration_number: Option<String>,
    pub country: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCategory {
    Sanctions,
    Pep,
    AdverseMedia,
}

impl MatchCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchCategory::Sanctions => "sanctions",
            MatchCategory::Pep => "pep",
            MatchCategory::AdverseMedia => "adverse_media",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistMatch {
    pub list_name: String,
    pub matched_name: String,
    pub category: MatchCategory,
    pub strength: f64,
}

/// One result shape for individuals and businesses; businesses simply
/// never carry a PEP flag, and `country_risk` doubles as jurisdiction
/// risk for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningResult {
    pub sanctions_match: bool,
    pub pep_match: bool,
    pub adverse_media_match: bool,
    pub country_risk: f64,
    pub matches: Vec<WatchlistMatch>,
    /// True when this is the safe default after a provider failure.
    /// Recorded as a risk factor downstream, never a silent clean pass.
    pub defaulted: bool,
}

impl ScreeningResult {
    pub fn clean(country_risk: f64) -> Self {
        Self {
            sanctions_match: false,
            pep_match: false,
            adverse_media_match: false,
            country_risk,
            matches: Vec::new(),
            defaulted: false,
        }
    }

    pub fn safe_default() -> Self {
        Self {
            defaulted: true,
            ..Self::clean(DEFAULT_COUNTRY_RISK)
        }
    }

    pub fn strongest_match(&self) -> f64 {
        self.matches.iter().map(|m| m.strength).fold(0.0, f64::max)
    }

    pub fn any_match(&self) -> bool {
        self.sanctions_match || self.pep_match || self.adverse_media_match
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScreeningError {
    #[error("screening timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("screening provider unavailable: {0}")]
    Unavailable(String),
}

// ── Provider trait ───────────────────────────────────────────────────────────

pub trait ScreeningProvider: Send + Sync {
    fn screen_individual(
        &self,
        query: &IndividualQuery,
        timeout: Duration,
    ) -> Result<ScreeningResult, ScreeningError>;

    fn screen_business(
        &self,
        query: &BusinessQuery,
        timeout: Duration,
    ) -> Result<ScreeningResult, ScreeningError>;
}

// ── Watchlist provider ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub name: String,
    pub list_name: String,
    pub category: MatchCategory,
}

#[derive(Debug, Clone, Deserialize)]
struct WatchlistFile {
    entries: Vec<WatchlistEntry>,
    #[serde(default)]
    country_risk: HashMap<String, f64>,
    #[serde(default = "default_country_risk")]
    default_country_risk: f64,
}

fn default_country_risk() -> f64 {
    DEFAULT_COUNTRY_RISK
}

/// Deterministic in-process screening against a fixed watchlist.
///
/// Name matching is normalized token overlap: 1.0 for an exact normalized
/// match, otherwise the Dice coefficient over whitespace tokens. No
/// network, no jitter.
pub struct WatchlistScreening {
    entries: Vec<WatchlistEntry>,
    country_risk: HashMap<String, f64>,
    default_country_risk: f64,
}

impl WatchlistScreening {
    pub fn new(
        entries: Vec<WatchlistEntry>,
        country_risk: HashMap<String, f64>,
        default_country_risk: f64,
    ) -> Self {
        Self {
            entries,
            country_risk,
            default_country_risk,
        }
    }

    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/screening/watchlist.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: WatchlistFile = serde_json::from_str(&content)?;
        Ok(Self::new(
            file.entries,
            file.country_risk,
            file.default_country_risk,
        ))
    }

    /// The shipped defaults, mirrored by data/screening/watchlist.json.
    pub fn builtin() -> Self {
        let entries = vec![
            WatchlistEntry {
                name: "Viktor Bout".into(),
                list_name: "OFAC SDN".into(),
                category: MatchCategory::Sanctions,
            },
            WatchlistEntry {
                name: "Draco Holdings Ltd".into(),
                list_name: "OFAC SDN".into(),
                category: MatchCategory::Sanctions,
            },
            WatchlistEntry {
                name: "Alejandro Vargas".into(),
                list_name: "PEP Registry".into(),
                category: MatchCategory::Pep,
            },
            WatchlistEntry {
                name: "Marcus Webb".into(),
                list_name: "Adverse Media Index".into(),
                category: MatchCategory::AdverseMedia,
            },
        ];
        let country_risk = [
            ("US", 0.05),
            ("GB", 0.05),
            ("DE", 0.05),
            ("FR", 0.05),
            ("CA", 0.05),
            ("AU", 0.05),
            ("JP", 0.05),
            ("CH", 0.05),
            ("AE", 0.45),
            ("PA", 0.45),
            ("NG", 0.45),
            ("PK", 0.45),
            ("AF", 0.7),
            ("MM", 0.7),
            ("YE", 0.7),
            ("VE", 0.7),
            ("KP", 0.9),
            ("IR", 0.9),
            ("SY", 0.9),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self::new(entries, country_risk, DEFAULT_COUNTRY_RISK)
    }

    fn country_risk_for(&self, country: Option<&str>) -> f64 {
        country
            .and_then(|c| self.country_risk.get(&c.to_uppercase()).copied())
            .unwrap_or(self.default_country_risk)
    }

    fn screen_name(&self, name: &str, country: Option<&str>) -> ScreeningResult {
        let mut result = ScreeningResult::clean(self.country_risk_for(country));

        for entry in &self.entries {
            let strength = name_similarity(name, &entry.name);
            let threshold = match entry.category {
                MatchCategory::Sanctions => SANCTIONS_MATCH_THRESHOLD,
                MatchCategory::Pep => PEP_MATCH_THRESHOLD,
                MatchCategory::AdverseMedia => ADVERSE_MEDIA_MATCH_THRESHOLD,
            };
            if strength < threshold {
                continue;
            }
            match entry.category {
                MatchCategory::Sanctions => result.sanctions_match = true,
                MatchCategory::Pep => result.pep_match = true,
                MatchCategory::AdverseMedia => result.adverse_media_match = true,
            }
            result.matches.push(WatchlistMatch {
                list_name: entry.list_name.clone(),
                matched_name: entry.name.clone(),
                category: entry.category,
                strength,
            });
        }

        result
    }
}

impl ScreeningProvider for WatchlistScreening {
    fn screen_individual(
        &self,
        query: &IndividualQuery,
        _timeout: Duration,
    ) -> Result<ScreeningResult, ScreeningError> {
        Ok(self.screen_name(&query.full_name, query.nationality.as_deref()))
    }

    fn screen_business(
        &self,
        query: &BusinessQuery,
        _timeout: Duration,
    ) -> Result<ScreeningResult, ScreeningError> {
        let mut result = self.screen_name(&query.legal_name, query.country.as_deref());
        // Businesses carry no PEP category.
        result.pep_match = false;
        result
            .matches
            .retain(|m| m.category != MatchCategory::Pep);
        Ok(result)
    }
}

/// Normalized name similarity in [0,1]. Exact normalized equality is 1.0;
/// otherwise the Dice coefficient over the token sets.
fn name_similarity(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }
    let ta: Vec<&str> = na.split_whitespace().collect();
    let tb: Vec<&str> = nb.split_whitespace().collect();
    let shared = ta.iter().filter(|t| tb.contains(t)).count();
    (2.0 * shared as f64) / (ta.len() + tb.len()) as f64
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Fixture providers ────────────────────────────────────────────────────────

/// Returns the same result for every query. Deterministic stand-in for a
/// remote provider in tests and demos.
pub struct StaticScreening {
    pub individual: ScreeningResult,
    pub business: ScreeningResult,
}

impl StaticScreening {
    pub fn all_clean(country_risk: f64) -> Self {
        Self {
            individual: ScreeningResult::clean(country_risk),
            business: ScreeningResult::clean(country_risk),
        }
    }
}

impl ScreeningProvider for StaticScreening {
    fn screen_individual(
        &self,
        _query: &IndividualQuery,
        _timeout: Duration,
    ) -> Result<ScreeningResult, ScreeningError> {
        Ok(self.individual.clone())
    }

    fn screen_business(
        &self,
        _query: &BusinessQuery,
        _timeout: Duration,
    ) -> Result<ScreeningResult, ScreeningError> {
        Ok(self.business.clone())
    }
}

/// Always times out. Exercises the retryable-failure path.
pub struct FailingScreening;

impl ScreeningProvider for FailingScreening {
    fn screen_individual(
        &self,
        _query: &IndividualQuery,
        timeout: Duration,
    ) -> Result<ScreeningResult, ScreeningError> {
        Err(ScreeningError::Timeout { timeout })
    }

    fn screen_business(
        &self,
        _query: &BusinessQuery,
        timeout: Duration,
    ) -> Result<ScreeningResult, ScreeningError> {
        Err(ScreeningError::Timeout { timeout })
    }
}
