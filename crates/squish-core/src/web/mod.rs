//! Embedded web server for Squish.
//!
//! One binary serves the marketing pages, the upload UI, the JSON API and
//! the admin dashboard.
//!
//! ## API Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | /api/health | Liveness and version |
//! | POST | /api/compress | Upload (`file` field) and compress |
//! | GET | /api/jobs/{id} | Job status |
//! | GET | /api/download/{id} | Download a result |
//! | POST | /api/auth/register | Create an account |
//! | POST | /api/auth/login | Get a token |
//! | GET | /api/auth/me | Current account |
//! | GET | /api/admin/stats | Dashboard statistics |
//! | GET/DELETE | /api/admin/jobs | List or clear jobs |
//! | DELETE | /api/admin/jobs/{id} | Delete a job |
//! | GET | /api/admin/users | List accounts |
//! | PATCH/DELETE | /api/admin/users/{id} | Change role or delete an account |
//! | GET | /* | Embedded pages |

pub mod admin;
pub mod assets;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{Error, Result};

pub use error::{ApiError, ApiResult};
pub use state::{AppState, SharedState};

/// Configuration for the web server.
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind to localhost only
    pub localhost_only: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            localhost_only: false,
        }
    }
}

impl From<&Config> for WebServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            port: config.server.port,
            localhost_only: config.server.localhost_only,
        }
    }
}

impl WebServerConfig {
    /// Get the bind address for the server.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        if self.localhost_only {
            SocketAddr::from(([127, 0, 0, 1], self.port))
        } else {
            SocketAddr::from(([0, 0, 0, 0], self.port))
        }
    }
}

/// Build the application router.
pub fn router(state: SharedState) -> Router {
    let body_limit = usize::try_from(
        state
            .config
            .server
            .max_upload_bytes
            .saturating_add(handlers::MULTIPART_OVERHEAD),
    )
    .unwrap_or(usize::MAX);

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/compress", post(handlers::compress))
        .route("/jobs/{id}", get(handlers::get_job))
        .route("/download/{id}", get(handlers::download))
        .nest("/auth", auth::router())
        .nest("/admin", admin::router());

    let mut app = Router::new()
        .nest("/api", api)
        .fallback(assets::serve_static_fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http());

    if state.config.server.cors {
        app = app.layer(CorsLayer::permissive());
    }

    app.with_state(state)
}

/// The web server instance.
#[derive(Debug)]
pub struct WebServer {
    config: Config,
}

impl WebServer {
    /// Create a new web server with the given configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Get the server configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Run the server until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns an error if the stores cannot be opened or the port cannot
    /// be bound.
    pub async fn start(self) -> Result<()> {
        let server_config = WebServerConfig::from(&self.config);
        let sweep_interval = self.config.jobs.sweep_interval;
        let state = AppState::new(self.config)?.shared();

        let sweeper = tokio::spawn(sweep_expired(state.clone(), sweep_interval));

        let addr = server_config.bind_addr();
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            Error::ConfigError(format!("failed to bind {addr}: {e}"))
        })?;

        tracing::info!(%addr, "Web server listening");

        let result = axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await;

        sweeper.abort();
        tracing::info!("Web server stopped");

        result.map_err(Error::Io)
    }
}

/// Periodically delete outputs past their retention window.
async fn sweep_expired(state: SharedState, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match state.jobs.lock().await.purge_expired() {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "Sweep finished"),
            Err(e) => tracing::warn!(error = %e, "Sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        let mut config = WebServerConfig::default();
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8080");

        config.localhost_only = true;
        config.port = 9000;
        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_config_from_file_config() {
        let mut config = Config::default();
        config.server.port = 3000;
        config.server.localhost_only = true;

        let server = WebServerConfig::from(&config);
        assert_eq!(server.port, 3000);
        assert!(server.localhost_only);
    }
}
