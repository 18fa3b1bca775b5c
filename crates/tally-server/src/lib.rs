//! Tally Web Server
//!
//! Axum-based HTTP transport for the Tally conversational assistant.
//!
//! Security features:
//! - Optional bearer API key authentication (constant-time comparison)
//! - Restrictive CORS policy
//! - Sanitized error responses (detail goes to the logs, not the client)

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use tally_core::provider::{ChatClient, FallbackCascade, ModelTarget};
use tally_core::reporter::ErrorReporter;
use tally_core::AssistantService;

mod handlers;


/// Maximum request body size (10 MB, enough for a few photos)
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Default primary model when `CHAT_MODEL` is unset
const DEFAULT_CHAT_MODEL: &str = "claude-sonnet-4-20250514";

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Bearer API keys. Empty means authentication is disabled.
    pub api_keys: Vec<String>,
}

impl ServerConfig {
    /// Build configuration from environment variables
    ///
    /// `TALLY_API_KEYS` and `TALLY_ALLOWED_ORIGINS` are comma-separated
    /// lists; both are optional.
    pub fn from_env() -> Self {
        Self {
            allowed_origins: split_env_list("TALLY_ALLOWED_ORIGINS"),
            api_keys: split_env_list("TALLY_API_KEYS"),
        }
    }
}

fn split_env_list(var: &str) -> Vec<String> {
    std::env::var(var)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Shared application state
pub struct AppState {
    pub service: Arc<AssistantService>,
    pub config: ServerConfig,
}

/// Build the provider cascade from environment variables
///
/// The primary backend comes from `ChatClient::from_env` (`CHAT_PROVIDER`
/// plus its credentials) with the model named by `CHAT_MODEL`. When
/// `BACKUP_CHAT_MODEL` is set, that model on the same backend is used as
/// the fallback tier. Returns None when no backend is configured.
pub fn cascade_from_env(reporter: Arc<dyn ErrorReporter>) -> Option<FallbackCascade> {
    let client = ChatClient::from_env()?;
    let model =
        std::env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());

    let mut cascade =
        FallbackCascade::new(ModelTarget::new(client.clone(), model.clone()), reporter);

    if let Ok(backup_model) = std::env::var("BACKUP_CHAT_MODEL") {
        if !backup_model.trim().is_empty() {
            cascade = cascade.with_backup(ModelTarget::new(client, backup_model.clone()));
            info!(primary = %model, backup = %backup_model, "Provider cascade configured");
            return Some(cascade);
        }
    }

    info!(primary = %model, "Provider configured without backup");
    Some(cascade)
}

/// Authentication middleware - validates bearer API keys
///
/// When no keys are configured the server is open; bind it to localhost
/// or put it behind a trusted proxy in that mode. Keys are compared
/// using constant-time comparison to prevent timing attacks.
async fn auth_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if state.config.api_keys.is_empty() {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid API key");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time
/// comparison to prevent timing attacks.
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes)) {
            return true;
        }
    }
    false
}

/// Create the application router
pub fn create_router(service: Arc<AssistantService>, config: ServerConfig) -> Router {
    let state = Arc::new(AppState {
        service,
        config: config.clone(),
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/threads", post(handlers::create_thread))
        .route("/threads/:id/messages", post(handlers::post_message));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server
pub async fn serve(
    service: Arc<AssistantService>,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if config.api_keys.is_empty() {
        warn!("No API keys configured - all requests are accepted");
    }

    let app = create_router(service, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err.into()),
        }
    }
}
