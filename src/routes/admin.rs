//! Officer console route handlers
//!
//! Login is open; everything else sits behind `require_officer`, and the
//! token subject is recorded as the reviewer and audit actor.

use crate::audit::{AuditAction, AuditEntry};
use crate::auth::{Claims, IssuedToken, OfficerCredentials};
use crate::error::{validation_error, ApiResult};
use crate::models::{
    AmendRequest, AmendResponse, AuditQuery, AuditResponse, LoginRequest, MessageResponse,
    OutcomeListQuery, OutcomeListResponse, OutcomeResponse, StatsResponse, SuccessResponse,
};
use crate::state::SharedState;
use crate::store::{filter_by_decision, OutcomeStats};
use crate::verification::{Amendment, Decision};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::json;
use tracing::{info, warn};
use validator::Validate;

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

/// Exchange officer credentials for a bearer token
pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<SuccessResponse<IssuedToken>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let credentials = OfficerCredentials {
        officer_id: payload.officer_id,
        passcode: payload.passcode,
    };

    let officer_id = match state.authenticator.authenticate(&credentials).await {
        Ok(officer_id) => officer_id,
        Err(e) => {
            warn!("Failed officer login for {}", credentials.officer_id);
            state
                .audit
                .record(
                    AuditEntry::new(AuditAction::OfficerLoginFailed)
                        .actor(&credentials.officer_id),
                )
                .await;
            return Err(e);
        }
    };

    state
        .audit
        .record(AuditEntry::new(AuditAction::OfficerLoginSucceeded).actor(&officer_id))
        .await;

    let token = state.tokens.issue(&officer_id)?;
    Ok(Json(SuccessResponse::with_data("Login successful", token)))
}

/// List outcomes, newest first, optionally by decision
pub async fn list_outcomes(
    State(state): State<SharedState>,
    Query(query): Query<OutcomeListQuery>,
) -> ApiResult<Json<SuccessResponse<OutcomeListResponse>>> {
    let decision = query
        .decision
        .as_deref()
        .map(str::parse::<Decision>)
        .transpose()?;

    let outcomes = filter_by_decision(state.outcomes.list().await, decision);
    let count = outcomes.len();

    Ok(Json(SuccessResponse::with_data(
        format!("Found {} outcomes", count),
        OutcomeListResponse { outcomes, count },
    )))
}

pub async fn get_outcome(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse<OutcomeResponse>>> {
    let outcome = state.outcomes.get(&id).await?;
    Ok(Json(SuccessResponse::with_data(
        "Outcome retrieved",
        OutcomeResponse { outcome },
    )))
}

/// Officer override of an outcome's decision
pub async fn amend_outcome(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<AmendRequest>,
) -> ApiResult<Json<SuccessResponse<AmendResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    let decision: Decision = payload.decision.parse()?;

    let amended = state
        .outcomes
        .amend(
            &id,
            Amendment {
                decision,
                reviewer_id: claims.sub.clone(),
                comment: payload.comment.clone(),
            },
        )
        .await?;

    state
        .audit
        .record(
            AuditEntry::new(AuditAction::OutcomeAmended)
                .actor(&claims.sub)
                .resource(&id)
                .details(json!({
                    "previousDecision": amended.previous_decision,
                    "previousReviewer": amended.previous_reviewer,
                    "decision": decision,
                    "comment": payload.comment,
                })),
        )
        .await;

    info!("Case {} resolved as {} by {}", id, decision, claims.sub);

    Ok(Json(SuccessResponse::with_data(
        format!("Outcome {} amended", id),
        AmendResponse {
            previous_decision: amended.previous_decision,
            outcome: amended.outcome,
        },
    )))
}

/// Remove every stored outcome
pub async fn clear_outcomes(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageResponse>> {
    let removed = state.outcomes.list().await.len();
    state.outcomes.clear().await?;

    state
        .audit
        .record(
            AuditEntry::new(AuditAction::StoreCleared)
                .actor(&claims.sub)
                .details(json!({ "removed": removed })),
        )
        .await;

    warn!("Outcome store cleared by {} ({} records)", claims.sub, removed);
    Ok(Json(MessageResponse::new(format!("Cleared {} outcomes", removed))))
}

/// Dashboard figures
pub async fn outcome_stats(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<StatsResponse>>> {
    let stats = OutcomeStats::from_outcomes(&state.outcomes.list().await);
    Ok(Json(SuccessResponse::with_data(
        "Statistics computed",
        StatsResponse { stats },
    )))
}

/// Audit log export, most recent first
pub async fn audit_log(
    State(state): State<SharedState>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<SuccessResponse<AuditResponse>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .min(MAX_AUDIT_LIMIT);
    let entries = state
        .audit
        .entries(query.resource_id.as_deref(), limit)
        .await;
    let count = entries.len();

    Ok(Json(SuccessResponse::with_data(
        format!("Found {} audit entries", count),
        AuditResponse { entries, count },
    )))
}
