//! API Server
//!
//! REST API for the HedgeAI risk desk.
//!
//! # Features
//!
//! - **Auth**: register, login, refresh rotation, logout, password change
//! - **Role gate**: per-route-group role checks (trader, analyst, risk desk, admin)
//! - **Portfolios**: portfolios, positions, trades and alerts scoped to their owner
//! - **Analytics**: valuation summaries plus ML risk scoring and hedging
//! - **OpenAPI**: Auto-generated Swagger documentation
//!
//! # Example
//!
//! ```ignore
//! use api_server::{ApiServer, ServerConfig};
//!
//! let config = ServerConfig::from_env();
//! let server = ApiServer::new(config, pool)?;
//! server.run().await?;
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::Router;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use auth::{JwtConfig, PasswordConfig};
use portfolio_core::config::MlConfig;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable CORS for all origins (development only).
    pub cors_permissive: bool,
    /// Access and refresh token settings.
    pub jwt: JwtConfig,
    /// Argon2 cost parameters.
    pub password: PasswordConfig,
    /// ML scoring service endpoint.
    pub ml: MlConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_permissive: true,
            jwt: JwtConfig::default(),
            password: PasswordConfig::default(),
            ml: MlConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            // PORT wins over API_PORT for hosted deployments
            port: std::env::var("PORT")
                .or_else(|_| std::env::var("API_PORT"))
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            cors_permissive: std::env::var("CORS_PERMISSIVE")
                .map(|v| v == "true")
                .unwrap_or(true),
            jwt: JwtConfig::from_env(),
            password: PasswordConfig::from_env(),
            ml: MlConfig::from_env(),
        }
    }

    /// Get the socket address.
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }
}

/// Wrap the router with tracing, body limit and CORS layers.
pub fn build_app(state: Arc<AppState>, cors_permissive: bool) -> Router {
    create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .on_request(|request: &Request<_>, _span: &tracing::Span| {
                    tracing::info!(
                        method = %request.method(),
                        uri = %request.uri(),
                        "Incoming request"
                    );
                })
                .on_response(DefaultOnResponse::new().level(Level::DEBUG))
                .on_failure(
                    |error: tower_http::classify::ServerErrorsFailureClass,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::error!(
                            error = %error,
                            latency_ms = latency.as_millis(),
                            "Request failed"
                        );
                    },
                ),
        )
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB
        .layer(if cors_permissive {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        })
}

/// The API server.
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server. Must be called inside a Tokio runtime.
    pub fn new(config: ServerConfig, pool: PgPool) -> anyhow::Result<Self> {
        let state = AppState::new(pool, &config)?;
        Ok(Self { config, state })
    }

    /// Run the server.
    pub async fn run(self) -> anyhow::Result<()> {
        let router = build_app(Arc::new(self.state), self.config.cors_permissive);

        let addr = self.config.socket_addr()?;
        info!(
            address = %addr,
            ml_service = %self.config.ml.base_url,
            "Starting API server"
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.socket_addr().unwrap().port(), 8080);

        let bad = ServerConfig {
            host: "not a host".into(),
            ..Default::default()
        };
        assert!(bad.socket_addr().is_err());
    }
}
