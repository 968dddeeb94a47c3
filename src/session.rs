//! Session registry
//!
//! Live verification pipelines keyed by an opaque handle. The handle stays
//! the same across resets; the session id inside the pipeline does not.
//!
//! Sessions are evicted once idle for `idle_ttl`, or `result_ttl` after their
//! last touch in RESULT. A busy session is never evicted. Stale entries are
//! swept when a session is opened and dropped on lookup.

use crate::config::SessionConfig;
use crate::error::AppError;
use crate::verification::{VerificationPipeline, VerificationServices};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

struct Entry {
    pipeline: Arc<VerificationPipeline>,
    last_touched: Instant,
}

impl Entry {
    fn is_stale(&self, config: &SessionConfig, now: Instant) -> bool {
        let view = self.pipeline.view();
        if view.busy {
            return false;
        }
        let idle = now.saturating_duration_since(self.last_touched);
        idle >= config.idle_ttl || (view.outcome.is_some() && idle >= config.result_ttl)
    }
}

pub struct SessionRegistry {
    services: Arc<VerificationServices>,
    config: SessionConfig,
    sessions: RwLock<HashMap<Uuid, Entry>>,
}

impl SessionRegistry {
    pub fn new(services: Arc<VerificationServices>, config: SessionConfig) -> Self {
        Self {
            services,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a new pipeline in START and return its handle
    pub async fn create(&self) -> (Uuid, Arc<VerificationPipeline>) {
        let handle = Uuid::new_v4();
        let pipeline = Arc::new(VerificationPipeline::new(self.services.clone()));
        let now = Instant::now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_stale(&self.config, now));
        if sessions.len() < before {
            debug!("Evicted {} stale sessions", before - sessions.len());
        }

        sessions.insert(
            handle,
            Entry {
                pipeline: pipeline.clone(),
                last_touched: now,
            },
        );
        info!("Opened verification session {} ({} live)", handle, sessions.len());

        (handle, pipeline)
    }

    /// Look up a pipeline and mark it as used
    pub async fn get(&self, handle: Uuid) -> Result<Arc<VerificationPipeline>, AppError> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        let stale = match sessions.get(&handle) {
            Some(entry) => entry.is_stale(&self.config, now),
            None => return Err(not_found(handle)),
        };
        if stale {
            sessions.remove(&handle);
            debug!("Session {} expired", handle);
            return Err(not_found(handle));
        }

        let entry = sessions.get_mut(&handle).ok_or_else(|| not_found(handle))?;
        entry.last_touched = now;
        Ok(entry.pipeline.clone())
    }

    /// Discard a pipeline. A request already holding it finishes normally.
    pub async fn remove(&self, handle: Uuid) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(&handle)
            .map(|_| info!("Closed verification session {}", handle))
            .ok_or_else(|| not_found(handle))
    }

    #[cfg(test)]
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn not_found(handle: Uuid) -> AppError {
    AppError::NotFound(format!("Session {} not found", handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        BiometricCapture, HumanConfirmation, ImagePayload, SimulatedBehaviorAssessor,
        SimulatedBiometricAssessor, SimulatedDocumentAnalyzer,
    };
    use crate::audit::AuditLog;
    use crate::store::InMemoryAdjudicationStore;
    use crate::verification::pipeline::Stage;
    use std::time::Duration;

    fn registry_with(config: SessionConfig) -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(VerificationServices {
                document: Arc::new(SimulatedDocumentAnalyzer::new(Duration::ZERO)),
                biometrics: Arc::new(SimulatedBiometricAssessor::new(Duration::ZERO)),
                behavior: Arc::new(SimulatedBehaviorAssessor::new(Duration::ZERO)),
                store: Arc::new(InMemoryAdjudicationStore::new()),
                audit: Arc::new(AuditLog::new()),
                analysis_timeout: Duration::from_secs(1),
                scoring_latency: Duration::ZERO,
                max_document_bytes: 1024,
            }),
            config,
        )
    }

    fn registry() -> SessionRegistry {
        registry_with(SessionConfig::default())
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let registry = registry();
        let (a, first) = registry.create().await;
        let (b, _) = registry.create().await;
        assert_ne!(a, b);
        assert_eq!(registry.count().await, 2);

        first.begin();
        assert_eq!(registry.get(a).await.unwrap().view().stage, Stage::Document);
        assert_eq!(registry.get(b).await.unwrap().view().stage, Stage::Start);
    }

    #[tokio::test]
    async fn test_remove_and_unknown_handles() {
        let registry = registry();
        let (handle, _) = registry.create().await;

        assert!(registry.remove(handle).await.is_ok());
        assert!(matches!(registry.get(handle).await, Err(AppError::NotFound(_))));
        assert!(matches!(registry.remove(handle).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let registry = registry_with(SessionConfig {
            idle_ttl: Duration::ZERO,
            result_ttl: Duration::ZERO,
        });
        let (first, _) = registry.create().await;
        assert!(matches!(registry.get(first).await, Err(AppError::NotFound(_))));

        let (second, _) = registry.create().await;
        let (_third, _) = registry.create().await;
        // Opening the third swept the second
        assert_eq!(registry.count().await, 1);
        assert!(matches!(registry.get(second).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_finished_sessions_expire_before_idle_ones() {
        let registry = registry_with(SessionConfig {
            idle_ttl: Duration::from_secs(3600),
            result_ttl: Duration::ZERO,
        });
        let (finished, pipeline) = registry.create().await;
        let (open, _) = registry.create().await;

        pipeline.begin();
        let image = ImagePayload::new("image/png", b"card".to_vec()).unwrap();
        pipeline.submit_document(image).await.unwrap();
        pipeline
            .submit_biometrics(BiometricCapture::default())
            .await
            .unwrap();
        pipeline
            .submit_behavior(HumanConfirmation { confirmed: true })
            .await
            .unwrap();
        let view = pipeline.run_scoring().await.unwrap().into_result().unwrap();
        assert_eq!(view.stage, Stage::Result);

        assert!(matches!(registry.get(finished).await, Err(AppError::NotFound(_))));
        assert!(registry.get(open).await.is_ok());
    }
}
