//! Audit log
//!
//! Append-only record of what happened to outcomes and who did it. Amendments
//! overwrite the stored outcome, so this log is where earlier officer
//! decisions survive. Retention is bounded: past `capacity` entries the
//! oldest are dropped.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Officer id, when an officer acted
    pub actor: Option<String>,
    pub action: AuditAction,
    /// Outcome id, when the entry concerns one outcome
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(action: AuditAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: None,
            action,
            resource_id: None,
            details: None,
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Outcome actions
    OutcomeCreated,
    OutcomeAmended,
    StoreCleared,

    // Officer gate
    OfficerLoginSucceeded,
    OfficerLoginFailed,
}

const DEFAULT_CAPACITY: usize = 10_000;

/// In-memory audit log
pub struct AuditLog {
    entries: RwLock<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Log an audit entry
    pub async fn record(&self, entry: AuditEntry) {
        debug!(
            "Audit: {:?} resource={:?} actor={:?}",
            entry.action, entry.resource_id, entry.actor
        );
        let mut entries = self.entries.write().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Get audit log entries, most recent first
    pub async fn entries(&self, resource_id: Option<&str>, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;

        entries
            .iter()
            .rev()
            .filter(|e| resource_id.map_or(true, |id| e.resource_id.as_deref() == Some(id)))
            .take(limit)
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
