pub mod auth;
pub mod gateway;
pub mod groups;
pub mod middleware;
pub mod users;

use axum::{
    Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tracing::error;

use momo_db::Database;

pub use auth::{AppState, AppStateInner};

/// All HTTP and WebSocket routes. CORS and tracing layers are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/api/v1/user/me", get(users::me))
        .route("/api/v1/group/create", post(groups::create))
        .route("/api/v1/group/join", post(groups::join))
        .route("/api/v1/group/member", post(groups::members))
        .route("/api/v1/group/list", get(groups::list))
        .route("/api/v1/ws/message", get(gateway::message_stream))
        .route("/api/v1/ws/convid", get(gateway::discovery_stream))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    public_routes.merge(protected_routes).with_state(state)
}

/// Run a blocking DB call off the async runtime. Failures are logged and
/// surface as 500.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Database error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
