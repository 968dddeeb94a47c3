//! JSON file adjudication store
//!
//! Write-through persistence over the in-memory store: the whole record list
//! is rewritten after every mutation. A mutation is applied to a staged copy
//! and only becomes visible once the file write succeeded.

use crate::error::AppError;
use crate::store::{AdjudicationStore, Amended, InMemoryAdjudicationStore};
use crate::verification::{Amendment, Outcome};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct JsonFileAdjudicationStore {
    path: PathBuf,
    inner: InMemoryAdjudicationStore,
    /// Serializes mutate-then-persist so file writes land in mutation order
    write_lock: Mutex<()>,
}

impl JsonFileAdjudicationStore {
    /// Open the store, loading existing records. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice::<Vec<Outcome>>(&bytes).map_err(|e| {
                AppError::Storage(format!("Corrupt outcome file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Loaded {} outcomes from {}",
            records.len(),
            path.display()
        );

        Ok(Self {
            path,
            inner: InMemoryAdjudicationStore::from_records(records),
            write_lock: Mutex::new(()),
        })
    }

    /// Scratch copy of the current records for a mutation to work on
    async fn stage(&self) -> InMemoryAdjudicationStore {
        InMemoryAdjudicationStore::from_records(self.inner.list().await)
    }

    /// Write the staged records to disk, then swap them in. The served records
    /// only change once the file holds them.
    async fn commit(&self, staged: InMemoryAdjudicationStore) -> Result<(), AppError> {
        let records = staged.into_records();
        self.persist(&records).await?;
        self.inner.replace(records).await;
        Ok(())
    }

    async fn persist(&self, records: &[Outcome]) -> Result<(), AppError> {
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| AppError::Storage(format!("Failed to serialize outcomes: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            warn!("Failed to persist outcomes to {}: {}", self.path.display(), e);
            return Err(e.into());
        }

        debug!("Persisted {} outcomes to {}", records.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl AdjudicationStore for JsonFileAdjudicationStore {
    async fn create(&self, outcome: Outcome) -> Result<Outcome, AppError> {
        let _guard = self.write_lock.lock().await;
        let staged = self.stage().await;
        let created = staged.create(outcome).await?;
        self.commit(staged).await?;
        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Outcome, AppError> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Vec<Outcome> {
        self.inner.list().await
    }

    async fn amend(&self, id: &str, amendment: Amendment) -> Result<Amended, AppError> {
        let _guard = self.write_lock.lock().await;
        let staged = self.stage().await;
        let amended = staged.amend(id, amendment).await?;
        self.commit(staged).await?;
        Ok(amended)
    }

    async fn clear(&self) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        self.commit(InMemoryAdjudicationStore::new()).await
    }
}
