pub mod api;
pub mod error;
pub mod operation;

use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{Extension, Router};
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use buddies_core::authorization::AuthService;
use buddies_core::data_access::DataAccess;
use buddies_core::matcher::MatchStrategy;
use buddies_core::Buddies;

pub use error::ApiError;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 3000,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `shutdown` ends open event streams, which would otherwise keep the server alive.
pub fn router<D: DataAccess, A: AuthService, S: MatchStrategy>(
    app: Buddies<D, A, S>,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> Router {
    Router::new()
        .route("/api/csrf", get(api::csrf_token::<D, A, S>))
        .route("/api", post(api::dispatch::<D, A, S>))
        .route("/api/chats/{chat_id}/events", get(api::chat_events::<D, A, S>))
        .layer(Extension(shutdown))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// Serves the API until `cancellation_token` fires, then lets open requests finish.
pub async fn run_server<D: DataAccess, A: AuthService, S: MatchStrategy>(
    app: Buddies<D, A, S>,
    config: &ServerConfig,
    cancellation_token: CancellationToken,
) -> Result<()> {
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await
        .with_context(|| format!("Unable to bind {addr}"))?;

    info!("Listening on {addr}");

    let router = router(app, config, cancellation_token.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
