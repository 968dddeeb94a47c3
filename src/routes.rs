//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod admin;
mod sessions;

use crate::auth::require_officer;
use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Headroom for JSON framing around a base64 document
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(&state.settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware_stack = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Base64 inflates by 4/3
    let body_limit = state.settings.pipeline.max_document_bytes / 3 * 4 + BODY_LIMIT_SLACK;

    let sessions = Router::new()
        .route("/", post(sessions::create_session))
        .route(
            "/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/{id}/begin", post(sessions::begin))
        .route("/{id}/document", post(sessions::submit_document))
        .route("/{id}/biometrics", post(sessions::submit_biometrics))
        .route("/{id}/behavior", post(sessions::submit_behavior))
        .route("/{id}/scoring", post(sessions::run_scoring))
        .route("/{id}/reset", post(sessions::reset));

    let admin = Router::new()
        .route(
            "/outcomes",
            get(admin::list_outcomes).delete(admin::clear_outcomes),
        )
        .route("/outcomes/{id}", get(admin::get_outcome))
        .route("/outcomes/{id}/amend", post(admin::amend_outcome))
        .route("/stats", get(admin::outcome_stats))
        .route("/audit", get(admin::audit_log))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_officer))
        .route("/login", post(admin::login));

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/api/sessions", sessions)
        .nest("/api/admin", admin)
        // Apply middleware and state
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware_stack)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    cors.allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{SimulatedBiometricAssessor, SimulatedDocumentAnalyzer};
    use crate::auth::SharedSecretAuthenticator;
    use crate::state::AppState;
    use crate::store::InMemoryAdjudicationStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let mut settings = Settings::default();
        settings.pipeline.biometric_latency = Duration::ZERO;
        settings.pipeline.behavior_latency = Duration::ZERO;
        settings.pipeline.scoring_latency = Duration::ZERO;
        settings.admin.jwt_secret = "router-test-secret".to_string();

        let authenticator =
            SharedSecretAuthenticator::new("MEITY-OFF-441", "admin123", 4).unwrap();
        let state = AppState::with_components(
            settings,
            Arc::new(SimulatedDocumentAnalyzer::new(Duration::ZERO)),
            Arc::new(SimulatedBiometricAssessor::new(Duration::ZERO)),
            Arc::new(InMemoryAdjudicationStore::new()),
            Arc::new(authenticator),
        );
        create_router(Arc::new(state))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn login(app: &Router) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/admin/login",
            Some(json!({ "officerId": "MEITY-OFF-441", "passcode": "admin123" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["accessToken"].as_str().unwrap().to_string()
    }

    /// Walk one session to RESULT and return the outcome id
    async fn complete_session(app: &Router) -> String {
        let (status, body) = send(app, "POST", "/api/sessions", None, None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["session"]["stage"], "START");
        let handle = body["handle"].as_str().unwrap().to_string();
        let base = format!("/api/sessions/{}", handle);

        let (status, body) = send(app, "POST", &format!("{}/begin", base), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["stage"], "DOCUMENT");

        let (status, body) = send(
            app,
            "POST",
            &format!("{}/document", base),
            Some(json!({ "image": "data:image/png;base64,iVBORw0KGgo=" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["stage"], "BIOMETRICS");

        let (status, body) = send(
            app,
            "POST",
            &format!("{}/biometrics", base),
            Some(json!({ "signatureStrokes": 4 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["stage"], "BEHAVIOR");

        let (status, body) = send(
            app,
            "POST",
            &format!("{}/behavior", base),
            Some(json!({ "humanConfirmed": true })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["stage"], "RESULT");
        assert_eq!(body["session"]["outcome"]["decision"], "ACCEPT");

        body["session"]["outcome"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_citizen_flow_and_ignored_triggers() {
        let app = test_app();
        let (_, body) = send(&app, "POST", "/api/sessions", None, None).await;
        let base = format!("/api/sessions/{}", body["handle"].as_str().unwrap());

        let (status, body) = send(
            &app,
            "POST",
            &format!("{}/document", base),
            Some(json!({ "image": "AQID" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "STAGE_IGNORED");

        let (status, body) = send(&app, "GET", &base, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["stage"], "START");

        let outcome_id = complete_session(&app).await;
        assert!(outcome_id.starts_with("KYC-"));
    }

    #[tokio::test]
    async fn test_bad_image_is_rejected() {
        let app = test_app();
        let (_, body) = send(&app, "POST", "/api/sessions", None, None).await;
        let base = format!("/api/sessions/{}", body["handle"].as_str().unwrap());
        send(&app, "POST", &format!("{}/begin", base), None, None).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("{}/document", base),
            Some(json!({ "image": "data:image/gif;base64,AQID" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");

        let (_, body) = send(&app, "GET", &base, None, None).await;
        assert_eq!(body["session"]["stage"], "DOCUMENT");
        assert_eq!(body["session"]["busy"], false);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let app = test_app();
        let uri = format!("/api/sessions/{}", uuid::Uuid::new_v4());
        let (status, body) = send(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/api/admin/outcomes", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = send(
            &app,
            "POST",
            "/api/admin/login",
            Some(json!({ "officerId": "MEITY-OFF-441", "passcode": "wrong" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "GET", "/api/admin/stats", None, Some("garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_officer_amends_and_clears() {
        let app = test_app();
        let outcome_id = complete_session(&app).await;
        let token = login(&app).await;

        let (status, body) = send(&app, "GET", "/api/admin/outcomes", None, Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["outcomes"][0]["id"], outcome_id.as_str());

        let (_, body) = send(
            &app,
            "GET",
            "/api/admin/outcomes?decision=REVIEW",
            None,
            Some(&token),
        )
        .await;
        assert_eq!(body["count"], 0);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/admin/outcomes/{}/amend", outcome_id),
            Some(json!({ "decision": "REJECT", "comment": "Photo mismatch" })),
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["previousDecision"], "ACCEPT");
        assert_eq!(body["outcome"]["decision"], "REJECT");
        assert_eq!(body["outcome"]["reviewerId"], "MEITY-OFF-441");
        assert_eq!(body["outcome"]["riskLevel"], "LOW");

        let (status, body) = send(
            &app,
            "POST",
            "/api/admin/outcomes/KYC-MISSING00/amend",
            Some(json!({ "decision": "ACCEPT" })),
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (_, body) = send(
            &app,
            "GET",
            &format!("/api/admin/audit?resourceId={}", outcome_id),
            None,
            Some(&token),
        )
        .await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["entries"][0]["action"], "outcome_amended");
        assert_eq!(body["entries"][1]["action"], "outcome_created");

        let (_, body) = send(&app, "GET", "/api/admin/stats", None, Some(&token)).await;
        assert_eq!(body["stats"]["total"], 1);
        assert_eq!(body["stats"]["reviewed"], 1);

        let (status, _) = send(&app, "DELETE", "/api/admin/outcomes", None, Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, "GET", "/api/admin/outcomes", None, Some(&token)).await;
        assert_eq!(body["count"], 0);
    }
}
