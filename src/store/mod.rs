//! Adjudication store
//!
//! Keyed collection of outcomes. The pipeline creates records, officers amend
//! them. Listing order is newest first.

mod json_file;
mod memory;

pub use json_file::JsonFileAdjudicationStore;
pub use memory::InMemoryAdjudicationStore;

use crate::error::AppError;
use crate::verification::{Amendment, Decision, Outcome};
use async_trait::async_trait;
use serde::Serialize;

/// Result of an amendment: the updated record and what it replaced
#[derive(Debug, Clone)]
pub struct Amended {
    pub outcome: Outcome,
    pub previous_decision: Decision,
    pub previous_reviewer: Option<String>,
}

#[async_trait]
pub trait AdjudicationStore: Send + Sync {
    /// Insert a new outcome. Fails with `DuplicateId` if the id is taken.
    async fn create(&self, outcome: Outcome) -> Result<Outcome, AppError>;

    /// Fetch one outcome by id
    async fn get(&self, id: &str) -> Result<Outcome, AppError>;

    /// All outcomes, most recently created first
    async fn list(&self) -> Vec<Outcome>;

    /// Overwrite the decision and reviewer fields of an outcome.
    /// Fails with `NotFound` and leaves the store untouched when `id` is absent.
    async fn amend(&self, id: &str, amendment: Amendment) -> Result<Amended, AppError>;

    /// Remove every outcome
    async fn clear(&self) -> Result<(), AppError>;
}

/// Keep only outcomes carrying `decision`, when one is given
pub fn filter_by_decision(outcomes: Vec<Outcome>, decision: Option<Decision>) -> Vec<Outcome> {
    match decision {
        Some(d) => outcomes.into_iter().filter(|o| o.decision == d).collect(),
        None => outcomes,
    }
}

/// Oversight dashboard figures
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeStats {
    pub total: usize,
    pub synthetic_documents: usize,
    pub pending_review: usize,
    pub reviewed: usize,
    /// Mean of `1 - aggregateRisk`; 0 for an empty store
    pub average_trust: f64,
}

impl OutcomeStats {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let total = outcomes.len();
        let average_trust = if total == 0 {
            0.0
        } else {
            outcomes.iter().map(Outcome::trust).sum::<f64>() / total as f64
        };

        Self {
            total,
            synthetic_documents: outcomes.iter().filter(|o| o.is_synthetic_document).count(),
            pending_review: outcomes
                .iter()
                .filter(|o| o.decision == Decision::Review)
                .count(),
            reviewed: outcomes.iter().filter(|o| o.is_reviewed()).count(),
            average_trust,
        }
    }
}
