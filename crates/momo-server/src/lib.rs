pub mod config;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use momo_api::{AppState, AppStateInner};
use momo_db::Database;
use momo_gateway::ConnectionRegistry;

pub use config::Config;

/// Shared state for a database and config. One registry per process.
pub fn state(db: Database, config: &Config) -> AppState {
    Arc::new(AppStateInner {
        db: Arc::new(db),
        jwt_secret: config.jwt_secret.clone(),
        registry: ConnectionRegistry::new(),
        session: config.session,
    })
}

pub fn app(state: AppState) -> Router {
    momo_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
