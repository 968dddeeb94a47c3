//! Pramaan KYC API - staged identity verification
//!
//! A citizen session walks document forensics, biometrics and a human check;
//! the decision rule then produces an outcome that officers can review and
//! amend from the admin console.
//!
//! - Pipeline: START → DOCUMENT → BIOMETRICS → BEHAVIOR → SCORING → RESULT
//! - Decision: synthetic document or aggregate > 0.7 rejects, > 0.3 reviews
//! - Adjudication: officer login, outcome listing, amendment, audit export

mod analysis;
mod audit;
mod auth;
mod config;
mod error;
mod models;
mod routes;
mod session;
mod state;
mod store;
mod verification;

use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting Pramaan KYC service...");
    info!("📋 Configuration loaded successfully");

    if settings.uses_default_secrets() {
        warn!(
            "⚠️  ADMIN_PASSCODE or JWT_SECRET not set, using demo defaults (INSECURE - set in production!)"
        );
    }

    let addr = SocketAddr::from((settings.server.host, settings.server.port));
    let state = Arc::new(AppState::new(settings).await?);

    // Build the router
    let app = create_router(state);

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Citizen Verification ───");
    info!("   POST   /api/sessions                 - Open a verification session");
    info!("   GET    /api/sessions/:id             - Current stage and scores");
    info!("   POST   /api/sessions/:id/begin       - Start verification");
    info!("   POST   /api/sessions/:id/document    - Upload identity document");
    info!("   POST   /api/sessions/:id/biometrics  - Submit camera frame / signature");
    info!("   POST   /api/sessions/:id/behavior    - Human check, then scoring");
    info!("   POST   /api/sessions/:id/scoring     - Retry scoring");
    info!("   POST   /api/sessions/:id/reset       - Start over");
    info!("");
    info!("   ─── Officer Console ───");
    info!("   POST   /api/admin/login              - Officer login");
    info!("   GET    /api/admin/outcomes           - Verification queue");
    info!("   POST   /api/admin/outcomes/:id/amend - Override decision");
    info!("   DELETE /api/admin/outcomes           - Reset outcome store");
    info!("   GET    /api/admin/stats              - Dashboard figures");
    info!("   GET    /api/admin/audit              - Export audit log");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pramaan_kyc=debug,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
