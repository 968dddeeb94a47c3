//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains all request/response structures used by the API.

use crate::audit::AuditEntry;
use crate::store::OutcomeStats;
use crate::verification::{Decision, Outcome, SessionView};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Message-only response (no data)
#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// ============================================
// Citizen session
// ============================================

/// Document upload: base64 image, optionally as a data URL
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadRequest {
    #[validate(length(min = 1, message = "Document image is required"))]
    pub image: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BiometricsRequest {
    /// Camera frame, base64 or data URL
    pub frame: Option<String>,
    pub frame_mime_type: Option<String>,
    #[serde(default)]
    #[validate(range(max = 10000, message = "Signature stroke count is implausible"))]
    pub signature_strokes: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorRequest {
    pub human_confirmed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// Registry handle; stable across resets
    pub handle: Uuid,
    pub session: SessionView,
}

// ============================================
// Officer console
// ============================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64, message = "Officer id is required"))]
    pub officer_id: String,
    #[validate(length(min = 1, max = 256, message = "Passcode is required"))]
    pub passcode: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AmendRequest {
    /// ACCEPT, REVIEW or REJECT
    pub decision: String,
    #[serde(default)]
    #[validate(length(max = 2000, message = "Comment must be at most 2000 characters"))]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct OutcomeListQuery {
    pub decision: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub limit: Option<usize>,
    pub resource_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OutcomeListResponse {
    pub outcomes: Vec<Outcome>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmendResponse {
    pub outcome: Outcome,
    pub previous_decision: Decision,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: OutcomeStats,
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub entries: Vec<AuditEntry>,
    pub count: usize,
}
