//! Authentication middleware
//!
//! Extracts and validates officer tokens from requests.

use crate::state::SharedState;
use crate::error::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum::http::header::AUTHORIZATION;

/// Reject requests without a valid officer token; insert the claims otherwise
pub async fn require_officer(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()))?;

    let claims = state.tokens.verify(token)?;

    // Handlers read the officer id from here
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
