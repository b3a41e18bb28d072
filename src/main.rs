//! RealMap Assistant backend
//!
//! Turns a chat completion model into a controller for a map front end:
//! keeps bounded per-session history, folds the current viewport into each
//! user turn, and extracts location and camera commands from the reply.

mod api;
mod commands;
mod llm;
mod orchestrator;
mod prompt;
mod session;

use api::{create_router, AppState};
use llm::{CompletionGateway, LlmConfig};
use orchestrator::TurnOrchestrator;
use session::SessionStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realmap_assistant=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);

    let timeout_secs: u64 = std::env::var("LLM_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);

    let llm_config = LlmConfig::from_env();
    let gateway = match llm_config.build_service() {
        Some(service) => {
            tracing::info!(model = %service.model_id(), "Completion provider initialized");
            CompletionGateway::new(service)
        }
        None => {
            tracing::warn!(
                "No completion provider configured. Set OPENAI_API_KEY; chat requests will fail."
            );
            CompletionGateway::unavailable(llm_config.model_id())
        }
    };

    let sessions = Arc::new(SessionStore::new(prompt::INSTRUCTION_PREAMBLE));
    let orchestrator = TurnOrchestrator::new(sessions, gateway)
        .with_timeout(Duration::from_secs(timeout_secs));

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().gzip(true).br(true).deflate(true);

    let app = create_router(AppState::new(orchestrator))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Chat endpoint: http://localhost:{port}/api/chat");
    tracing::info!("RealMap Assistant listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}
