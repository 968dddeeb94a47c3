//! Decision rule
//!
//! Maps the three per-stage risk scores and the synthetic-document flag to a
//! provisional decision and risk level. Pure: no clock, no randomness, no state.

use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Aggregate risk strictly above this rejects
pub const REJECT_THRESHOLD: f64 = 0.7;

/// Aggregate risk strictly above this (and not rejected) goes to review
pub const REVIEW_THRESHOLD: f64 = 0.3;

/// Provisional or officer-assigned decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Accept,
    Review,
    Reject,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Accept => write!(f, "ACCEPT"),
            Decision::Review => write!(f, "REVIEW"),
            Decision::Reject => write!(f, "REJECT"),
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACCEPT" => Ok(Decision::Accept),
            "REVIEW" => Ok(Decision::Review),
            "REJECT" => Ok(Decision::Reject),
            other => Err(AppError::InvalidInput(format!("Unknown decision '{}'", other))),
        }
    }
}

/// Risk classification derived together with the system decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Output of the decision rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    pub risk_level: RiskLevel,
    pub aggregate_risk: f64,
}

/// Arithmetic mean of the three sub-scores
pub fn aggregate_risk(document: f64, biometric: f64, behavior: f64) -> f64 {
    (document + biometric + behavior) / 3.0
}

/// Reject NaN and anything outside [0, 1]
pub fn ensure_unit_score(name: &str, value: f64) -> Result<f64, AppError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(AppError::InvalidInput(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

/// Same bound for a score produced by an analysis backend. Out of range
/// there is a failed analysis rather than bad client input.
pub fn ensure_analysis_score(name: &str, value: f64) -> Result<f64, AppError> {
    ensure_unit_score(name, value).map_err(|e| match e {
        AppError::InvalidInput(msg) => AppError::AnalysisFailed(msg),
        other => other,
    })
}

/// Threshold step of the rule, on an already aggregated score
pub fn classify(aggregate: f64, is_synthetic_document: bool) -> (Decision, RiskLevel) {
    if is_synthetic_document || aggregate > REJECT_THRESHOLD {
        (Decision::Reject, RiskLevel::High)
    } else if aggregate > REVIEW_THRESHOLD {
        (Decision::Review, RiskLevel::Medium)
    } else {
        (Decision::Accept, RiskLevel::Low)
    }
}

/// Apply the decision rule. First match wins:
/// synthetic document or aggregate > 0.7 rejects, aggregate > 0.3 reviews,
/// everything else accepts.
pub fn decide(
    document: f64,
    biometric: f64,
    behavior: f64,
    is_synthetic_document: bool,
) -> Result<Verdict, AppError> {
    let document = ensure_unit_score("documentRisk", document)?;
    let biometric = ensure_unit_score("biometricRisk", biometric)?;
    let behavior = ensure_unit_score("behaviorRisk", behavior)?;

    let aggregate = aggregate_risk(document, biometric, behavior);
    let (decision, risk_level) = classify(aggregate, is_synthetic_document);

    Ok(Verdict {
        decision,
        risk_level,
        aggregate_risk: aggregate,
    })
}
