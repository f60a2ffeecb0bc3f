// ===================================================================================================
// Request Dispatcher (C4)
// ===================================================================================================
//
// Stateless boundary layer: every handler resolves the calling user from the
// `X-User-Id` header, looks up (or lazily spawns) that user's actor, and
// delegates. All user-visible state lives in C3; nothing here is mutable
// beyond the actor registry and blob store handles, which are themselves
// shared read-only across requests.
// ===================================================================================================

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::actor::SharedActorRegistry;
use crate::blob::BlobStore;
use crate::config::Config;

pub struct ApiState {
    pub registry: SharedActorRegistry,
    pub blob: Arc<dyn BlobStore>,
    pub config: Arc<Config>,
}

pub(crate) fn user_id_from_headers(headers: &HeaderMap, state: &ApiState) -> String {
    headers
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| state.config.server.default_user.clone())
}

/// Builds the CORS layer from `ALLOWED_ORIGINS` (`config.server.allowed_origins`):
/// `"*"` (alone or among the list) allows any origin, otherwise only the
/// configured origins are reflected.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods([Method::GET, Method::POST, Method::DELETE]).allow_headers(Any);

    if allowed_origins.iter().any(|o| o == "*") {
        base.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
        base.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/verify", post(handlers::verify_auth))
        .route("/stats", get(handlers::get_stats))
        .route("/folders/:id", get(handlers::list_folder))
        .route("/folders", post(handlers::create_folder))
        .route("/files", post(handlers::create_file))
        .route("/files/:id", get(handlers::get_file))
        .route("/files/:id/chunks", post(handlers::upload_chunk))
        .route("/files/:id/download", get(handlers::download_file))
        .route("/nodes/:id/rename", post(handlers::rename_node))
        .route("/nodes/:id/move", post(handlers::move_node))
        .route("/nodes/:id", delete(handlers::delete_node))
        .route("/nodes/:id/lock", post(handlers::lock_node))
        .route("/nodes/:id/unlock", post(handlers::unlock_node))
        .route("/nodes/:id/verify-lock", post(handlers::verify_lock_node))
        .route("/drives", post(handlers::create_drive))
        .route("/drives/:id", delete(handlers::delete_drive))
        .route("/batch", post(handlers::batch))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
