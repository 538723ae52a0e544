//! API Router and Application State
//!
//! Central routing configuration and shared state.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth,
    chat::{self, MediaUploader},
    config::Config,
    db::Store,
    group,
    moderation::ProfanityFilter,
    presence::PresenceRegistry,
    ws::{self, Fanout},
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend
    pub store: Arc<dyn Store>,
    /// Presence registry and event delivery
    pub fanout: Arc<Fanout>,
    /// Profanity filter applied to message text
    pub filter: Arc<ProfanityFilter>,
    /// Image hosting (optional)
    pub uploader: Option<Arc<dyn MediaUploader>>,
    /// Server configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        fanout: Arc<Fanout>,
        filter: ProfanityFilter,
        uploader: Option<Arc<dyn MediaUploader>>,
        config: Config,
    ) -> Self {
        Self {
            store,
            fanout,
            filter: Arc::new(filter),
            uploader,
            config: Arc::new(config),
        }
    }

    /// Check if image uploads are configured.
    #[must_use]
    pub fn has_uploads(&self) -> bool {
        self.uploader.is_some()
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Images arrive base64-encoded inside JSON bodies
    let body_limit = state.config.max_upload_size.saturating_mul(2);

    let protected_routes = Router::new()
        .nest("/api/messages", chat::messages_router())
        .nest("/api/groups", group::router())
        .layer(from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .route("/ws", get(ws::handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Active store backend
    store: &'static str,
    /// Whether image uploads are available
    uploads: bool,
    /// Users with a live connection
    online_users: usize,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: state.store.backend(),
        uploads: state.has_uploads(),
        online_users: state.fanout.presence().list_online().await.len(),
    })
}
