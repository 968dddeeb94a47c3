//! In-memory adjudication store

use crate::error::AppError;
use crate::store::{AdjudicationStore, Amended};
use crate::verification::{Amendment, Outcome};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

/// Thread-safe outcome store. Records are kept newest first.
pub struct InMemoryAdjudicationStore {
    records: RwLock<Vec<Outcome>>,
}

impl InMemoryAdjudicationStore {
    pub fn new() -> Self {
        Self::from_records(Vec::new())
    }

    /// Seed the store with records already ordered newest first
    pub fn from_records(records: Vec<Outcome>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub(crate) fn into_records(self) -> Vec<Outcome> {
        self.records.into_inner()
    }

    /// Swap in a full record list, already ordered newest first
    pub(crate) async fn replace(&self, records: Vec<Outcome>) {
        *self.records.write().await = records;
    }

    #[cfg(test)]
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for InMemoryAdjudicationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdjudicationStore for InMemoryAdjudicationStore {
    async fn create(&self, outcome: Outcome) -> Result<Outcome, AppError> {
        let mut records = self.records.write().await;
        if records.iter().any(|o| o.id == outcome.id) {
            return Err(AppError::DuplicateId(format!(
                "Outcome {} already exists",
                outcome.id
            )));
        }

        records.insert(0, outcome.clone());
        info!(
            "Stored outcome {} ({}, aggregate risk {:.3})",
            outcome.id, outcome.decision, outcome.aggregate_risk
        );
        Ok(outcome)
    }

    async fn get(&self, id: &str) -> Result<Outcome, AppError> {
        let records = self.records.read().await;
        records
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Outcome {} not found", id)))
    }

    async fn list(&self) -> Vec<Outcome> {
        self.records.read().await.clone()
    }

    async fn amend(&self, id: &str, amendment: Amendment) -> Result<Amended, AppError> {
        let mut records = self.records.write().await;
        let outcome = records
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Outcome {} not found", id)))?;

        let previous_decision = outcome.decision;
        let previous_reviewer = outcome.reviewer_id.clone();
        outcome.apply_amendment(amendment, Utc::now());

        info!(
            "Outcome {} amended {} -> {} by {}",
            id,
            previous_decision,
            outcome.decision,
            outcome.reviewer_id.as_deref().unwrap_or("unknown")
        );

        Ok(Amended {
            outcome: outcome.clone(),
            previous_decision,
            previous_reviewer,
        })
    }

    async fn clear(&self) -> Result<(), AppError> {
        let mut records = self.records.write().await;
        let removed = records.len();
        records.clear();
        info!("Cleared {} outcomes", removed);
        Ok(())
    }
}
