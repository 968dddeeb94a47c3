//! Outcome record
//!
//! The result of one citizen's verification. Scores, risk level and rationale
//! are fixed at creation; only the decision and the reviewer fields move,
//! and only through [`Outcome::apply_amendment`].

use crate::verification::decision::{Decision, RiskLevel, Verdict};
use chrono::{DateTime, Utc};
use rand::distributions::Uniform;
use rand::Rng;
use serde::{Deserialize, Serialize};

const ID_PREFIX: &str = "KYC-";
const ID_SUFFIX_LEN: usize = 9;
const ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a case identifier such as `KYC-7QX2M0D4B`
pub fn generate_outcome_id() -> String {
    let mut rng = rand::thread_rng();
    let pick = Uniform::from(0..ID_ALPHABET.len());
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.sample(pick)] as char)
        .collect();
    format!("{}{}", ID_PREFIX, suffix)
}

/// Sub-scores collected by the pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScores {
    pub document_risk: f64,
    pub biometric_risk: f64,
    pub behavior_risk: f64,
}

/// A verification outcome, stored flat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub document_risk: f64,
    pub biometric_risk: f64,
    pub behavior_risk: f64,
    pub aggregate_risk: f64,
    pub is_synthetic_document: bool,
    pub decision: Decision,
    pub risk_level: RiskLevel,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_comment: Option<String>,
}

/// Officer override of a stored outcome
#[derive(Debug, Clone, PartialEq)]
pub struct Amendment {
    pub decision: Decision,
    pub reviewer_id: String,
    pub comment: String,
}

impl Outcome {
    /// Build a fresh outcome from the rule's verdict
    pub fn from_verdict(
        scores: RiskScores,
        is_synthetic_document: bool,
        verdict: Verdict,
        document_reasoning: Option<&str>,
    ) -> Self {
        Self {
            id: generate_outcome_id(),
            created_at: Utc::now(),
            document_risk: scores.document_risk,
            biometric_risk: scores.biometric_risk,
            behavior_risk: scores.behavior_risk,
            aggregate_risk: verdict.aggregate_risk,
            is_synthetic_document,
            decision: verdict.decision,
            risk_level: verdict.risk_level,
            rationale: rationale(is_synthetic_document, &verdict, document_reasoning),
            reviewer_id: None,
            reviewed_at: None,
            reviewer_comment: None,
        }
    }

    /// Whether an officer has touched this record
    pub fn is_reviewed(&self) -> bool {
        self.reviewer_id.is_some()
    }

    /// Overwrite the decision and reviewer fields. Scores, risk level and
    /// rationale keep the values the system computed.
    pub fn apply_amendment(&mut self, amendment: Amendment, at: DateTime<Utc>) {
        self.decision = amendment.decision;
        self.reviewer_id = Some(amendment.reviewer_id);
        self.reviewed_at = Some(at);
        self.reviewer_comment = Some(amendment.comment);
    }

    /// The system's trust in this profile, `1 - aggregate`
    pub fn trust(&self) -> f64 {
        1.0 - self.aggregate_risk
    }
}

fn rationale(is_synthetic: bool, verdict: &Verdict, document_reasoning: Option<&str>) -> String {
    let mut text = if is_synthetic {
        "Synthetic document artifacts detected.".to_string()
    } else {
        match verdict.decision {
            Decision::Accept => "Standard identity profile.".to_string(),
            Decision::Review => format!(
                "Aggregate risk {:.2} is above the automatic acceptance threshold; routed for officer review.",
                verdict.aggregate_risk
            ),
            Decision::Reject => format!(
                "Aggregate risk {:.2} is above the rejection threshold.",
                verdict.aggregate_risk
            ),
        }
    };

    if let Some(reasoning) = document_reasoning.map(str::trim).filter(|r| !r.is_empty()) {
        text.push_str(" Document analysis: ");
        text.push_str(reasoning);
    }

    text
}
