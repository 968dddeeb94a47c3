//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::analysis::{
    BiometricAssessor, DocumentAnalyzer, GeminiClient, LivenessBiometricAssessor,
    SimulatedBehaviorAssessor, SimulatedBiometricAssessor, SimulatedDocumentAnalyzer,
};
use crate::audit::AuditLog;
use crate::auth::{Authenticator, SharedSecretAuthenticator, TokenIssuer};
use crate::config::{AnalysisMode, Settings};
use crate::error::AppError;
use crate::session::SessionRegistry;
use crate::store::{AdjudicationStore, InMemoryAdjudicationStore, JsonFileAdjudicationStore};
use crate::verification::VerificationServices;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,

    /// Live citizen sessions
    pub sessions: SessionRegistry,

    /// Adjudication store, shared with every pipeline
    pub outcomes: Arc<dyn AdjudicationStore>,

    pub audit: Arc<AuditLog>,

    /// Officer gate
    pub authenticator: Arc<dyn Authenticator>,
    pub tokens: TokenIssuer,
}

impl AppState {
    /// Build state from settings, choosing analysis and storage backends
    pub async fn new(settings: Settings) -> Result<Self, AppError> {
        let outcomes: Arc<dyn AdjudicationStore> = match &settings.storage.outcome_path {
            Some(path) => {
                info!("Outcomes persisted to {}", path.display());
                Arc::new(JsonFileAdjudicationStore::open(path.clone()).await?)
            }
            None => {
                info!("Outcomes kept in memory only");
                Arc::new(InMemoryAdjudicationStore::new())
            }
        };

        let document: Arc<dyn DocumentAnalyzer>;
        let biometrics: Arc<dyn BiometricAssessor>;
        match settings.analysis.mode {
            AnalysisMode::Gemini => {
                let client = Arc::new(GeminiClient::new(&settings.analysis)?);
                document = client.clone();
                biometrics = Arc::new(LivenessBiometricAssessor::new(client));
            }
            AnalysisMode::Simulated => {
                document = Arc::new(SimulatedDocumentAnalyzer::new(Duration::ZERO));
                biometrics = Arc::new(SimulatedBiometricAssessor::new(
                    settings.pipeline.biometric_latency,
                ));
            }
        }
        info!("Analysis mode: {:?}", settings.analysis.mode);

        let authenticator = Arc::new(SharedSecretAuthenticator::from_config(&settings.admin)?);
        Ok(Self::with_components(settings, document, biometrics, outcomes, authenticator))
    }

    /// Assemble state around already-built collaborators
    pub fn with_components(
        settings: Settings,
        document: Arc<dyn DocumentAnalyzer>,
        biometrics: Arc<dyn BiometricAssessor>,
        outcomes: Arc<dyn AdjudicationStore>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let audit = Arc::new(AuditLog::with_capacity(settings.storage.audit_capacity));
        let services = Arc::new(VerificationServices {
            document,
            biometrics,
            behavior: Arc::new(SimulatedBehaviorAssessor::new(
                settings.pipeline.behavior_latency,
            )),
            store: outcomes.clone(),
            audit: audit.clone(),
            analysis_timeout: settings.analysis.timeout,
            scoring_latency: settings.pipeline.scoring_latency,
            max_document_bytes: settings.pipeline.max_document_bytes,
        });

        Self {
            tokens: TokenIssuer::from_config(&settings.admin),
            sessions: SessionRegistry::new(services, settings.sessions.clone()),
            outcomes,
            audit,
            authenticator,
            settings,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
