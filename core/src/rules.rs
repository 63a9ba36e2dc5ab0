//! Declarative compliance rules.
//!
//! A rule is an AND-combined list of `(field, operator, value)` conditions
//! over a flat context map. Evaluation is pure: it returns triggered rule
//! ids, one open alert per triggered rule, the most restrictive action,
//! and an aggregate severity contribution. Persisting alerts is the
//! caller's job.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::case::ParseEnumError;

/// Severity-to-contribution weights, summed over triggered rules and
/// divided by 100 by the evaluator.
const WEIGHT_CRITICAL: u32 = 40;
const WEIGHT_HIGH: u32 = 30;
const WEIGHT_MEDIUM: u32 = 20;
const WEIGHT_LOW: u32 = 10;

/// Flat evaluation context; keys are dot paths like
/// "screening.sanctions_match".
pub type RuleContext = serde_json::Map<String, Value>;

// ── Rule vocabulary ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Transaction,
    Kyc,
    Kyb,
    Sanctions,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Transaction => "transaction",
            RuleKind::Kyc => "kyc",
            RuleKind::Kyb => "kyb",
            RuleKind::Sanctions => "sanctions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    /// Case-insensitive substring.
    Contains,
    In,
    NotIn,
    Regex,
}

/// Declared in ascending restrictiveness; the derived `Ord` is the
/// resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    RequestAdditionalInfo,
    EnhancedMonitoring,
    ManualReview,
    Block,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::RequestAdditionalInfo => "request_additional_info",
            RuleAction::EnhancedMonitoring => "enhanced_monitoring",
            RuleAction::ManualReview => "manual_review",
            RuleAction::Block => "block",
        }
    }
}

impl FromStr for RuleAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(RuleAction::Allow),
            "request_additional_info" => Ok(RuleAction::RequestAdditionalInfo),
            "enhanced_monitoring" => Ok(RuleAction::EnhancedMonitoring),
            "manual_review" => Ok(RuleAction::ManualReview),
            "block" => Ok(RuleAction::Block),
            other => Err(ParseEnumError {
                what: "rule action",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RuleSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSeverity::Low => "low",
            RuleSeverity::Medium => "medium",
            RuleSeverity::High => "high",
            RuleSeverity::Critical => "critical",
        }
    }

    pub fn weight(&self) -> u32 {
        match self {
            RuleSeverity::Critical => WEIGHT_CRITICAL,
            RuleSeverity::High => WEIGHT_HIGH,
            RuleSeverity::Medium => WEIGHT_MEDIUM,
            RuleSeverity::Low => WEIGHT_LOW,
        }
    }
}

impl FromStr for RuleSeverity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RuleSeverity::Low),
            "medium" => Ok(RuleSeverity::Medium),
            "high" => Ok(RuleSeverity::High),
            "critical" => Ok(RuleSeverity::Critical),
            other => Err(ParseEnumError {
                what: "rule severity",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub operator: RuleOperator,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: RuleKind,
    pub conditions: Vec<RuleCondition>,
    pub action: RuleAction,
    pub severity: RuleSeverity,
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

// ── Alerts ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Investigating => "investigating",
            AlertStatus::Resolved => "resolved",
            AlertStatus::FalsePositive => "false_positive",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AlertStatus::Open),
            "investigating" => Ok(AlertStatus::Investigating),
            "resolved" => Ok(AlertStatus::Resolved),
            "false_positive" => Ok(AlertStatus::FalsePositive),
            other => Err(ParseEnumError {
                what: "alert status",
                value: other.to_string(),
            }),
        }
    }
}

/// Append-only audit artifact. `details` is frozen at creation; only
/// `status` moves afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceAlert {
    pub alert_id: uuid::Uuid,
    pub rule_id: String,
    pub rule_name: String,
    pub severity: RuleSeverity,
    pub action: RuleAction,
    pub description: String,
    pub details: Value,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

// ── Evaluation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub triggered_rule_ids: Vec<String>,
    pub alerts: Vec<ComplianceAlert>,
    pub resolved_action: RuleAction,
    /// Sum of triggered severity weights / 100, clamped to [0,1].
    pub risk_contribution: f64,
}

impl EvaluationOutcome {
    fn empty() -> Self {
        Self {
            triggered_rule_ids: Vec::new(),
            alerts: Vec::new(),
            resolved_action: RuleAction::Allow,
            risk_contribution: 0.0,
        }
    }
}

/// Ordered rule store plus the evaluator. Injected into the verification
/// engine at construction; `replace` exists for hot-reload.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<ComplianceRule>,
}

#[derive(Debug, Clone, Deserialize)]
struct RulesFile {
    rules: Vec<ComplianceRule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<ComplianceRule>) -> Self {
        Self { rules }
    }

    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/rules/compliance_rules.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: RulesFile = serde_json::from_str(&content)?;
        Ok(Self::new(file.rules))
    }

    /// Swap the whole rule set. Insertion order of the new set becomes the
    /// new tie-break order.
    pub fn replace(&mut self, rules: Vec<ComplianceRule>) {
        self.rules = rules;
    }

    pub fn rules(&self) -> &[ComplianceRule] {
        &self.rules
    }

    /// Evaluate all active rules of `kind` against `context`.
    ///
    /// Rules run in descending priority order; the sort is stable so equal
    /// priorities keep insertion order. Ordering affects alert emission
    /// only — the resolved action is the most restrictive among triggered
    /// rules either way.
    pub fn evaluate(
        &self,
        kind: RuleKind,
        context: &RuleContext,
        now: DateTime<Utc>,
    ) -> EvaluationOutcome {
        let mut candidates: Vec<&ComplianceRule> = self
            .rules
            .iter()
            .filter(|r| r.active && r.kind == kind)
            .collect();
        candidates.sort_by_key(|r| std::cmp::Reverse(r.priority));

        let mut outcome = EvaluationOutcome::empty();
        let mut weight_sum: u32 = 0;

        for rule in candidates {
            if !rule_triggers(rule, context) {
                continue;
            }
            weight_sum += rule.severity.weight();
            outcome.resolved_action = outcome.resolved_action.max(rule.action);
            outcome.triggered_rule_ids.push(rule.id.clone());
            outcome.alerts.push(build_alert(rule, context, now));
        }

        outcome.risk_contribution = (f64::from(weight_sum) / 100.0).clamp(0.0, 1.0);
        outcome
    }
}

fn rule_triggers(rule: &ComplianceRule, context: &RuleContext) -> bool {
    rule.conditions
        .iter()
        .all(|c| condition_holds(c, context.get(&c.field)))
}

/// A condition over a missing field is false for every operator,
/// including the negated ones. Never an error.
fn condition_holds(condition: &RuleCondition, probe: Option<&Value>) -> bool {
    let Some(probe) = probe else {
        return false;
    };

    match condition.operator {
        RuleOperator::Equals => value_eq(probe, &condition.value),
        RuleOperator::NotEquals => !value_eq(probe, &condition.value),
        RuleOperator::GreaterThan => match (probe.as_f64(), condition.value.as_f64()) {
            (Some(p), Some(v)) => p > v,
            _ => false,
        },
        RuleOperator::LessThan => match (probe.as_f64(), condition.value.as_f64()) {
            (Some(p), Some(v)) => p < v,
            _ => false,
        },
        RuleOperator::Contains => match (probe.as_str(), condition.value.as_str()) {
            (Some(p), Some(v)) => p.to_lowercase().contains(&v.to_lowercase()),
            _ => false,
        },
        RuleOperator::In => condition
            .value
            .as_array()
            .is_some_and(|arr| arr.iter().any(|v| value_eq(probe, v))),
        RuleOperator::NotIn => condition
            .value
            .as_array()
            .is_some_and(|arr| !arr.iter().any(|v| value_eq(probe, v))),
        RuleOperator::Regex => match (probe.as_str(), condition.value.as_str()) {
            // An unparseable pattern evaluates false, same as a missing
            // field.
            (Some(p), Some(v)) => Regex::new(v).map(|re| re.is_match(p)).unwrap_or(false),
            _ => false,
        },
    }
}

/// Numbers compare as f64 so integer config values match float context
/// values; everything else uses strict equality.
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn build_alert(rule: &ComplianceRule, context: &RuleContext, now: DateTime<Utc>) -> ComplianceAlert {
    // Freeze the probed fields into the alert so the audit trail shows
    // what the rule saw.
    let probed: serde_json::Map<String, Value> = rule
        .conditions
        .iter()
        .filter_map(|c| context.get(&c.field).map(|v| (c.field.clone(), v.clone())))
        .collect();

    let description = if rule.description.is_empty() {
        format!("Rule '{}' triggered", rule.name)
    } else {
        rule.description.clone()
    };

    ComplianceAlert {
        alert_id: uuid::Uuid::new_v4(),
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        severity: rule.severity,
        action: rule.action,
        description,
        details: serde_json::json!({
            "rule_id": rule.id,
            "priority": rule.priority,
            "probed": probed,
        }),
        status: AlertStatus::Open,
        created_at: now,
    }
}

// ── Built-in rule set ────────────────────────────────────────────────────────

/// The shipped defaults, mirrored by data/rules/compliance_rules.json.
/// Used directly by tests and as the fallback when no data dir is given.
pub fn builtin_rules() -> Vec<ComplianceRule> {
    use serde_json::json;

    fn cond(field: &str, operator: RuleOperator, value: Value) -> RuleCondition {
        RuleCondition {
            field: field.to_string(),
            operator,
            value,
        }
    }

    fn rule(
        id: &str,
        name: &str,
        kind: RuleKind,
        conditions: Vec<RuleCondition>,
        action: RuleAction,
        severity: RuleSeverity,
        priority: i32,
    ) -> ComplianceRule {
        ComplianceRule {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            kind,
            conditions,
            action,
            severity,
            priority,
            active: true,
        }
    }

    vec![
        // Sanctions rules run during the initiation pre-screen.
        rule(
            "sanctions_exact_hit",
            "Exact sanctions list match",
            RuleKind::Sanctions,
            vec![
                cond("screening.sanctions_match", RuleOperator::Equals, json!(true)),
                cond("screening.strongest_match", RuleOperator::GreaterThan, json!(0.94)),
            ],
            RuleAction::Block,
            RuleSeverity::Critical,
            100,
        ),
        rule(
            "sanctions_fuzzy_hit",
            "Fuzzy sanctions list match",
            RuleKind::Sanctions,
            vec![cond(
                "screening.sanctions_match",
                RuleOperator::Equals,
                json!(true),
            )],
            RuleAction::ManualReview,
            RuleSeverity::High,
            90,
        ),
        // KYC rules run at assessment time.
        rule(
            "kyc_forged_document",
            "Document fraud indicators above tolerance",
            RuleKind::Kyc,
            vec![cond(
                "documents.max_fraud_risk",
                RuleOperator::GreaterThan,
                json!(0.85),
            )],
            RuleAction::Block,
            RuleSeverity::Critical,
            95,
        ),
        rule(
            "kyc_embargoed_nationality",
            "Declared nationality on embargo list",
            RuleKind::Kyc,
            vec![cond(
                "subject.nationality",
                RuleOperator::In,
                json!(["KP", "IR", "SY", "CU"]),
            )],
            RuleAction::ManualReview,
            RuleSeverity::High,
            85,
        ),
        rule(
            "kyc_pep_review",
            "Politically exposed person",
            RuleKind::Kyc,
            vec![cond("screening.pep_match", RuleOperator::Equals, json!(true))],
            RuleAction::ManualReview,
            RuleSeverity::High,
            80,
        ),
        rule(
            "kyc_high_risk_country",
            "High country risk",
            RuleKind::Kyc,
            vec![cond(
                "screening.country_risk",
                RuleOperator::GreaterThan,
                json!(0.7),
            )],
            RuleAction::ManualReview,
            RuleSeverity::High,
            70,
        ),
        rule(
            "kyc_adverse_media",
            "Adverse media coverage",
            RuleKind::Kyc,
            vec![cond(
                "screening.adverse_media_match",
                RuleOperator::Equals,
                json!(true),
            )],
            RuleAction::EnhancedMonitoring,
            RuleSeverity::Medium,
            60,
        ),
        rule(
            "kyc_low_doc_quality",
            "Mean document quality below tolerance",
            RuleKind::Kyc,
            vec![cond(
                "documents.mean_quality",
                RuleOperator::LessThan,
                json!(0.5),
            )],
            RuleAction::RequestAdditionalInfo,
            RuleSeverity::Medium,
            50,
        ),
        // KYB rules run at assessment time for business cases.
        rule(
            "kyb_owner_sanctions",
            "Beneficial owner on a sanctions list",
            RuleKind::Kyb,
            vec![cond("owners.any_sanctions", RuleOperator::Equals, json!(true))],
            RuleAction::ManualReview,
            RuleSeverity::Critical,
            90,
        ),
        rule(
            "kyb_forged_document",
            "Document fraud indicators above tolerance",
            RuleKind::Kyb,
            vec![cond(
                "documents.max_fraud_risk",
                RuleOperator::GreaterThan,
                json!(0.85),
            )],
            RuleAction::Block,
            RuleSeverity::Critical,
            95,
        ),
        rule(
            "kyb_msb_industry",
            "Money service business",
            RuleKind::Kyb,
            vec![cond(
                "business.industry",
                RuleOperator::Contains,
                json!("money service"),
            )],
            RuleAction::ManualReview,
            RuleSeverity::High,
            65,
        ),
        rule(
            "kyb_high_risk_industry",
            "High-risk industry keyword",
            RuleKind::Kyb,
            vec![cond(
                "business.industry",
                RuleOperator::Regex,
                json!("(?i)(crypto|gambling|casino|cannabis|arms)"),
            )],
            RuleAction::EnhancedMonitoring,
            RuleSeverity::Medium,
            55,
        ),
        rule(
            "kyb_low_ownership_coverage",
            "Declared ownership below coverage floor",
            RuleKind::Kyb,
            vec![cond(
                "owners.total_ownership_pct",
                RuleOperator::LessThan,
                json!(75),
            )],
            RuleAction::RequestAdditionalInfo,
            RuleSeverity::Medium,
            40,
        ),
        // Transaction monitoring rules are not wired into the verification
        // lifecycle; hosts evaluate them through `RuleEngine::evaluate`.
        rule(
            "txn_large_cash",
            "Large cash transaction",
            RuleKind::Transaction,
            vec![
                cond("transaction.amount", RuleOperator::GreaterThan, json!(10_000)),
                cond("transaction.method", RuleOperator::Equals, json!("cash")),
            ],
            RuleAction::ManualReview,
            RuleSeverity::High,
            70,
        ),
    ]
}
