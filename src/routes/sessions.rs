//! Citizen session route handlers
//!
//! Each trigger maps to one pipeline operation. Ignored triggers surface as
//! `409 STAGE_IGNORED`; the session is unchanged in that case.

use crate::analysis::{BiometricCapture, HumanConfirmation, ImagePayload};
use crate::error::{validation_error, ApiResult};
use crate::models::{
    BehaviorRequest, BiometricsRequest, DocumentUploadRequest, MessageResponse, SessionResponse,
    SuccessResponse,
};
use crate::state::SharedState;
use crate::verification::pipeline::Advance;
use crate::verification::{SessionView, VerificationPipeline};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

type SessionReply = Json<SuccessResponse<SessionResponse>>;

fn reply(message: &str, handle: Uuid, session: SessionView) -> SessionReply {
    Json(SuccessResponse::with_data(
        format!("{} (stage {})", message, session.stage),
        SessionResponse { handle, session },
    ))
}

/// Open a new verification session
pub async fn create_session(
    State(state): State<SharedState>,
) -> ApiResult<(StatusCode, SessionReply)> {
    let (handle, pipeline) = state.sessions.create().await;
    Ok((
        StatusCode::CREATED,
        reply("Session created", handle, pipeline.view()),
    ))
}

pub async fn get_session(
    State(state): State<SharedState>,
    Path(handle): Path<Uuid>,
) -> ApiResult<SessionReply> {
    let pipeline = state.sessions.get(handle).await?;
    Ok(reply("Session retrieved", handle, pipeline.view()))
}

pub async fn delete_session(
    State(state): State<SharedState>,
    Path(handle): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    state.sessions.remove(handle).await?;
    Ok(Json(MessageResponse::new(format!("Session {} closed", handle))))
}

/// START -> DOCUMENT
pub async fn begin(
    State(state): State<SharedState>,
    Path(handle): Path<Uuid>,
) -> ApiResult<SessionReply> {
    let pipeline = state.sessions.get(handle).await?;
    let view = pipeline.begin().into_result()?;
    Ok(reply("Verification started", handle, view))
}

/// Upload the identity document for forensic analysis
pub async fn submit_document(
    State(state): State<SharedState>,
    Path(handle): Path<Uuid>,
    Json(payload): Json<DocumentUploadRequest>,
) -> ApiResult<SessionReply> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    let pipeline = state.sessions.get(handle).await?;

    let image = ImagePayload::from_base64(&payload.image, payload.mime_type.as_deref())?;
    let view = pipeline.submit_document(image).await?.into_result()?;
    Ok(reply("Document analyzed", handle, view))
}

pub async fn submit_biometrics(
    State(state): State<SharedState>,
    Path(handle): Path<Uuid>,
    Json(payload): Json<BiometricsRequest>,
) -> ApiResult<SessionReply> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    let pipeline = state.sessions.get(handle).await?;

    let frame = payload
        .frame
        .as_deref()
        .map(|frame| ImagePayload::from_base64(frame, payload.frame_mime_type.as_deref()))
        .transpose()?;
    let capture = BiometricCapture {
        frame,
        signature_strokes: payload.signature_strokes,
    };

    let view = pipeline.submit_biometrics(capture).await?.into_result()?;
    Ok(reply("Biometrics captured", handle, view))
}

/// Human check, followed directly by scoring. If scoring fails the session
/// waits in SCORING and `/scoring` retries it.
pub async fn submit_behavior(
    State(state): State<SharedState>,
    Path(handle): Path<Uuid>,
    Json(payload): Json<BehaviorRequest>,
) -> ApiResult<SessionReply> {
    let pipeline = state.sessions.get(handle).await?;

    pipeline
        .submit_behavior(HumanConfirmation {
            confirmed: payload.human_confirmed,
        })
        .await?
        .into_result()?;
    let view = score_after_behavior(&pipeline).await?;
    let message = if view.outcome.is_some() {
        "Verification complete"
    } else {
        "Scoring in progress"
    };
    Ok(reply(message, handle, view))
}

/// The behavior step already succeeded, so an ignored scoring trigger only
/// means another request got there first. Report the current state.
async fn score_after_behavior(pipeline: &VerificationPipeline) -> ApiResult<SessionView> {
    match pipeline.run_scoring().await? {
        Advance::Moved(view) => Ok(view),
        Advance::Ignored(reason) => {
            debug!("Scoring after behavior skipped: {}", reason);
            Ok(pipeline.view())
        }
    }
}

pub async fn run_scoring(
    State(state): State<SharedState>,
    Path(handle): Path<Uuid>,
) -> ApiResult<SessionReply> {
    let pipeline = state.sessions.get(handle).await?;
    let view = pipeline.run_scoring().await?.into_result()?;
    Ok(reply("Verification complete", handle, view))
}

pub async fn reset(
    State(state): State<SharedState>,
    Path(handle): Path<Uuid>,
) -> ApiResult<SessionReply> {
    let pipeline = state.sessions.get(handle).await?;
    let view = pipeline.reset().into_result()?;
    Ok(reply("Session reset", handle, view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        BiometricCapture, SimulatedBehaviorAssessor, SimulatedBiometricAssessor,
        SimulatedDocumentAnalyzer,
    };
    use crate::audit::AuditLog;
    use crate::store::{AdjudicationStore, InMemoryAdjudicationStore};
    use crate::verification::pipeline::Stage;
    use crate::verification::VerificationServices;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_scoring_already_running_is_not_an_error() {
        let store = Arc::new(InMemoryAdjudicationStore::new());
        let pipeline = Arc::new(VerificationPipeline::new(Arc::new(VerificationServices {
            document: Arc::new(SimulatedDocumentAnalyzer::new(Duration::ZERO)),
            biometrics: Arc::new(SimulatedBiometricAssessor::new(Duration::ZERO)),
            behavior: Arc::new(SimulatedBehaviorAssessor::new(Duration::ZERO)),
            store: store.clone(),
            audit: Arc::new(AuditLog::new()),
            analysis_timeout: Duration::from_secs(5),
            scoring_latency: Duration::from_millis(200),
            max_document_bytes: 1024,
        })));

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

        let racing = pipeline.clone();
        let scoring = tokio::spawn(async move { racing.run_scoring().await });
        while !pipeline.view().busy {
            tokio::task::yield_now().await;
        }

        let view = score_after_behavior(&pipeline).await.unwrap();
        assert_eq!(view.stage, Stage::Scoring);
        assert!(view.busy);

        scoring.await.unwrap().unwrap().into_result().unwrap();
        let view = score_after_behavior(&pipeline).await.unwrap();
        assert_eq!(view.stage, Stage::Result);
        assert_eq!(store.list().await.len(), 1);
    }
}
