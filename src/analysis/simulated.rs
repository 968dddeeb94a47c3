//! Simulated analysis strategies
//!
//! Stand-ins for real biometric and behavioral scoring: a fixed score after a
//! fixed delay. Delays come from configuration and are zero in tests.

use crate::analysis::{
    BehaviorAssessor, BiometricAssessor, BiometricCapture, DocumentAnalysis, DocumentAnalyzer,
    HumanConfirmation, ImagePayload, LivenessAnalyzer,
};
use crate::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Biometric risk reported by the simulated multi-factor check
pub const SIMULATED_BIOMETRIC_RISK: f64 = 0.15;

/// Behavior risk for a confirmed human
pub const CONFIRMED_HUMAN_RISK: f64 = 0.05;

/// Behavior risk for a failed challenge
pub const FAILED_CHALLENGE_RISK: f64 = 1.0;

/// Floor applied to biometric risk when the frame is judged not live
pub const NOT_LIVE_RISK_FLOOR: f64 = 0.5;

async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// Offline document analyzer returning a fixed result
pub struct SimulatedDocumentAnalyzer {
    result: DocumentAnalysis,
    latency: Duration,
}

impl SimulatedDocumentAnalyzer {
    pub fn new(latency: Duration) -> Self {
        Self::with_result(
            DocumentAnalysis {
                is_synthetic_document: false,
                score: 0.1,
                reasoning: "Simulated forensic scan found no synthetic markers.".to_string(),
            },
            latency,
        )
    }

    pub fn with_result(result: DocumentAnalysis, latency: Duration) -> Self {
        Self { result, latency }
    }
}

#[async_trait]
impl DocumentAnalyzer for SimulatedDocumentAnalyzer {
    async fn analyze_document(&self, image: &ImagePayload) -> Result<DocumentAnalysis, AppError> {
        debug!(
            "Simulated document analysis of {} bytes ({})",
            image.bytes.len(),
            image.mime_type
        );
        simulate_latency(self.latency).await;
        Ok(self.result.clone())
    }
}

/// Fixed biometric score after a delay
pub struct SimulatedBiometricAssessor {
    latency: Duration,
}

impl SimulatedBiometricAssessor {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl BiometricAssessor for SimulatedBiometricAssessor {
    async fn assess(&self, capture: &BiometricCapture) -> Result<f64, AppError> {
        debug!(
            "Simulated biometric analysis (frame: {}, signature strokes: {})",
            capture.frame.is_some(),
            capture.signature_strokes
        );
        simulate_latency(self.latency).await;
        Ok(SIMULATED_BIOMETRIC_RISK)
    }
}

/// Biometric scoring backed by a liveness analyzer
pub struct LivenessBiometricAssessor {
    liveness: Arc<dyn LivenessAnalyzer>,
}

impl LivenessBiometricAssessor {
    pub fn new(liveness: Arc<dyn LivenessAnalyzer>) -> Self {
        Self { liveness }
    }
}

#[async_trait]
impl BiometricAssessor for LivenessBiometricAssessor {
    async fn assess(&self, capture: &BiometricCapture) -> Result<f64, AppError> {
        let frame = capture.frame.as_ref().ok_or_else(|| {
            AppError::InvalidInput("A camera frame is required for liveness analysis".to_string())
        })?;

        let analysis = self.liveness.analyze_liveness(frame).await?;
        let risk = (1.0 - analysis.liveness_score).clamp(0.0, 1.0);

        Ok(if analysis.is_live {
            risk
        } else {
            risk.max(NOT_LIVE_RISK_FLOOR)
        })
    }
}

/// Checkbox-style human confirmation
pub struct SimulatedBehaviorAssessor {
    latency: Duration,
}

impl SimulatedBehaviorAssessor {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl BehaviorAssessor for SimulatedBehaviorAssessor {
    async fn assess(&self, signal: HumanConfirmation) -> Result<f64, AppError> {
        simulate_latency(self.latency).await;
        Ok(if signal.confirmed {
            CONFIRMED_HUMAN_RISK
        } else {
            FAILED_CHALLENGE_RISK
        })
    }
}
