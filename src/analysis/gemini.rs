//! Gemini analysis client
//!
//! Sends the uploaded image to the `generateContent` endpoint together with a
//! forensic prompt and a response schema, then parses the JSON text of the
//! first candidate. Anything unexpected on the way back is `AnalysisFailed`.

use crate::analysis::{
    DocumentAnalysis, DocumentAnalyzer, ImagePayload, LivenessAnalysis, LivenessAnalyzer,
};
use crate::config::AnalysisConfig;
use crate::error::AppError;
use crate::verification::decision::ensure_analysis_score;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

const DOCUMENT_PROMPT: &str = "Act as a forensic document expert. Analyze this ID for AI-generation markers, \
synthetic textures, pixel-perfect edges, or deepfake artifacts. Return JSON: { isAiGenerated: boolean, \
score: number (0-1, where 1 is highly suspicious), reasoning: string }";

const LIVENESS_PROMPT: &str = "Analyze this camera frame for liveness. Check for display glare, mask edges, \
or static image markers. Return JSON: { isLive: boolean, livenessScore: number (0-1, 1 is definitely live) }";

/// Longest slice of an error body carried into error messages
const MAX_ERROR_BODY_CHARS: usize = 512;

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentVerdictWire {
    is_ai_generated: bool,
    score: f64,
    reasoning: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LivenessVerdictWire {
    is_live: bool,
    liveness_score: f64,
}

// =============================================================================
// CLIENT
// =============================================================================

/// HTTP client for the Gemini `generateContent` API
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AppError> {
        let api_key = config
            .gemini_api_key
            .clone()
            .ok_or_else(|| AppError::Config("Gemini API key is not configured".to_string()))?;

        let endpoint = config
            .gemini_base_url
            .join(&format!("v1beta/models/{}:generateContent", config.gemini_model))
            .map_err(|e| AppError::Config(format!("Invalid Gemini endpoint: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!("Gemini analysis client ready (model: {})", config.gemini_model);

        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    async fn generate<T: DeserializeOwned>(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::AnalysisFailed(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!("Gemini returned {}: {}", status, excerpt);
            return Err(AppError::AnalysisFailed(format!(
                "Gemini returned {}: {}",
                status, excerpt
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::AnalysisFailed(format!("Unreadable Gemini response: {}", e)))?;

        parse_candidate_json(body)
    }
}

#[async_trait]
impl DocumentAnalyzer for GeminiClient {
    async fn analyze_document(&self, image: &ImagePayload) -> Result<DocumentAnalysis, AppError> {
        debug!("Sending {} byte document to Gemini", image.bytes.len());
        let wire: DocumentVerdictWire = self.generate(&document_request(image)).await?;
        document_analysis_from_wire(wire)
    }
}

#[async_trait]
impl LivenessAnalyzer for GeminiClient {
    async fn analyze_liveness(&self, frame: &ImagePayload) -> Result<LivenessAnalysis, AppError> {
        debug!("Sending {} byte frame to Gemini", frame.bytes.len());
        let wire: LivenessVerdictWire = self.generate(&liveness_request(frame)).await?;
        liveness_analysis_from_wire(wire)
    }
}

// =============================================================================
// REQUEST / RESPONSE MAPPING
// =============================================================================

fn image_request(
    image: &ImagePayload,
    prompt: &str,
    schema: serde_json::Value,
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![RequestContent {
            parts: vec![
                RequestPart::Inline {
                    inline_data: InlineData {
                        mime_type: image.mime_type.clone(),
                        data: image.to_base64(),
                    },
                },
                RequestPart::Text {
                    text: prompt.to_string(),
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: schema,
        },
    }
}

fn document_request(image: &ImagePayload) -> GenerateContentRequest {
    image_request(
        image,
        DOCUMENT_PROMPT,
        json!({
            "type": "OBJECT",
            "properties": {
                "isAiGenerated": { "type": "BOOLEAN" },
                "score": { "type": "NUMBER" },
                "reasoning": { "type": "STRING" }
            },
            "required": ["isAiGenerated", "score", "reasoning"]
        }),
    )
}

fn liveness_request(frame: &ImagePayload) -> GenerateContentRequest {
    image_request(
        frame,
        LIVENESS_PROMPT,
        json!({
            "type": "OBJECT",
            "properties": {
                "isLive": { "type": "BOOLEAN" },
                "livenessScore": { "type": "NUMBER" }
            },
            "required": ["isLive", "livenessScore"]
        }),
    )
}

fn parse_candidate_json<T: DeserializeOwned>(body: GenerateContentResponse) -> Result<T, AppError> {
    let text = body
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text)
        .ok_or_else(|| {
            AppError::AnalysisFailed("Gemini response has no text candidate".to_string())
        })?;

    serde_json::from_str(&text)
        .map_err(|e| AppError::AnalysisFailed(format!("Malformed analysis JSON: {}", e)))
}

fn document_analysis_from_wire(wire: DocumentVerdictWire) -> Result<DocumentAnalysis, AppError> {
    Ok(DocumentAnalysis {
        is_synthetic_document: wire.is_ai_generated,
        score: ensure_analysis_score("score", wire.score)?,
        reasoning: wire.reasoning,
    })
}

fn liveness_analysis_from_wire(wire: LivenessVerdictWire) -> Result<LivenessAnalysis, AppError> {
    Ok(LivenessAnalysis {
        is_live: wire.is_live,
        liveness_score: ensure_analysis_score("livenessScore", wire.liveness_score)?,
    })
}
