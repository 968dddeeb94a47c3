//! Analysis capabilities
//!
//! The pipeline never scores anything itself. Each stage hands its input to
//! one of the strategies below and only checks that the number it gets back
//! is a usable risk score.
//!
//! ```text
//! DocumentAnalyzer   --  GeminiClient | SimulatedDocumentAnalyzer
//! LivenessAnalyzer   --  GeminiClient
//! BiometricAssessor  --  SimulatedBiometricAssessor | LivenessBiometricAssessor
//! BehaviorAssessor   --  SimulatedBehaviorAssessor
//! ```

pub mod gemini;
pub mod simulated;

pub use gemini::GeminiClient;
pub use simulated::{
    LivenessBiometricAssessor, SimulatedBehaviorAssessor, SimulatedBiometricAssessor,
    SimulatedDocumentAnalyzer,
};

use crate::error::AppError;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Image encodings the analyzers accept
pub const SUPPORTED_IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// A decoded image upload
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Result<Self, AppError> {
        let mime_type = mime_type.into().trim().to_ascii_lowercase();
        if !SUPPORTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
            return Err(AppError::InvalidInput(format!(
                "Unsupported image type '{}' (expected one of {})",
                mime_type,
                SUPPORTED_IMAGE_TYPES.join(", ")
            )));
        }
        if bytes.is_empty() {
            return Err(AppError::InvalidInput("Image payload is empty".to_string()));
        }
        Ok(Self { mime_type, bytes })
    }

    /// Decode base64 image data. Accepts either raw base64 or a
    /// `data:<mime>;base64,<data>` URL; an explicit mime type wins over the
    /// URL's, and JPEG is assumed when neither names one.
    pub fn from_base64(encoded: &str, mime_type: Option<&str>) -> Result<Self, AppError> {
        let encoded = encoded.trim();
        let (url_mime, data) = match encoded.strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest.split_once(',').ok_or_else(|| {
                    AppError::InvalidInput("Malformed data URL: missing ','".to_string())
                })?;
                let mime = header.strip_suffix(";base64").ok_or_else(|| {
                    AppError::InvalidInput("Data URL must be base64 encoded".to_string())
                })?;
                (Some(mime), data)
            }
            None => (None, encoded),
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| AppError::InvalidInput(format!("Invalid base64 image data: {}", e)))?;

        let mime = mime_type.or(url_mime).unwrap_or("image/jpeg");
        Self::new(mime, bytes)
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Hex SHA-256 of the raw bytes, recorded in the audit trail
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Result of document forensics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    pub is_synthetic_document: bool,
    /// 0 = clean, 1 = highly suspicious
    pub score: f64,
    pub reasoning: String,
}

/// Result of a liveness check on a camera frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessAnalysis {
    pub is_live: bool,
    /// 1 = definitely live
    pub liveness_score: f64,
}

/// What the citizen handed over at the biometrics stage
#[derive(Debug, Clone, Default)]
pub struct BiometricCapture {
    pub frame: Option<ImagePayload>,
    pub signature_strokes: u32,
}

/// Outcome of the interactive human check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanConfirmation {
    pub confirmed: bool,
}

#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Score an identity document image for synthetic markers.
    ///
    /// # Errors
    ///
    /// Transport and malformed-response problems are `AppError::AnalysisFailed`.
    async fn analyze_document(&self, image: &ImagePayload) -> Result<DocumentAnalysis, AppError>;
}

#[async_trait]
pub trait LivenessAnalyzer: Send + Sync {
    async fn analyze_liveness(&self, frame: &ImagePayload) -> Result<LivenessAnalysis, AppError>;
}

#[async_trait]
pub trait BiometricAssessor: Send + Sync {
    /// Produce `biometricRisk` in [0, 1]
    async fn assess(&self, capture: &BiometricCapture) -> Result<f64, AppError>;
}

#[async_trait]
pub trait BehaviorAssessor: Send + Sync {
    /// Produce `behaviorRisk` in [0, 1]
    async fn assess(&self, signal: HumanConfirmation) -> Result<f64, AppError>;
}
