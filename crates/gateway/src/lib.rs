//! HTTP gateway for agentwire.
//!
//! Exposes the agent runtime over two streaming protocols:
//!
//! - `POST /v1/agent/stream`: native structured messages (SSE or NDJSON)
//! - `POST /v1/chat/completions`: OpenAI-compatible chat completions
//! - `GET  /health`
//!
//! Built on Axum. Every request gets a freshly built agent; sessions carry
//! history and, optionally, tool caches across requests.

pub mod native;
pub mod openai;
pub mod run;
pub mod sessions;

use agentwire_agent::AgentFactory;
use agentwire_config::AppConfig;
use agentwire_tools::ToolkitRegistry;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use sessions::SessionStore;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// Request body limit for all routes.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub factory: AgentFactory,
    pub sessions: Arc<SessionStore>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Arc<AppConfig>, factory: AgentFactory) -> Self {
        let sessions = Arc::new(SessionStore::new(config.gateway.max_sessions, config.tool_cache.ttl()));
        Self {
            config,
            factory,
            sessions,
        }
    }

    /// State with providers and toolkits built from `config`.
    pub fn from_config(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let providers = agentwire_providers::build_from_config(&config);
        let factory = AgentFactory::new(config.clone(), providers, ToolkitRegistry::builtin());
        Self::new(config, factory)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub(crate) fn internal_error(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.gateway.cors_origins);
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/agent/stream", post(native::agent_stream_handler))
        .route("/v1/chat/completions", post(openai::chat_completions_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(AppState::from_config(config));
    info!(
        default_provider = state.factory.providers().default_name(),
        providers = ?state.factory.providers().list(),
        toolkits = ?state.factory.toolkits().names(),
        "Gateway configured"
    );

    let app = build_router(state);
    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
