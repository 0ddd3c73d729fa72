//! Application state shared across handlers.

use sqlx::PgPool;
use std::sync::Arc;

use auth::{
    AuditLogger, AuthService, JwtAuth, PasswordHasher, PostgresAuditStorage, PostgresUserStore,
};
use portfolio_core::api::{MlClient, RiskModel};
use portfolio_core::db::{AlertRepository, PortfolioRepository, PositionRepository, TradeRepository};

use crate::ServerConfig;

/// Shared application state.
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,
    /// Auth core: credentials, sessions and user administration.
    pub auth: Arc<AuthService>,
    /// Audit trail for security-relevant events.
    pub audit_logger: Arc<AuditLogger>,
    /// Risk scoring backend.
    pub risk_model: Arc<dyn RiskModel>,
    pub portfolios: PortfolioRepository,
    pub positions: PositionRepository,
    pub trades: TradeRepository,
    pub alerts: AlertRepository,
}

impl AppState {
    /// Wire the production components. Must be called inside a Tokio runtime.
    pub fn new(pool: PgPool, config: &ServerConfig) -> anyhow::Result<Self> {
        let audit_logger = Arc::new(AuditLogger::new(Arc::new(PostgresAuditStorage::new(
            pool.clone(),
        ))));

        let auth = AuthService::new(
            Arc::new(PostgresUserStore::new(pool.clone())),
            JwtAuth::new(config.jwt.clone()),
            PasswordHasher::new(config.password)?,
        )
        .with_audit(audit_logger.clone());

        let risk_model: Arc<dyn RiskModel> = Arc::new(MlClient::new(&config.ml)?);

        Ok(Self::with_components(
            pool,
            Arc::new(auth),
            audit_logger,
            risk_model,
        ))
    }

    /// Assemble state from prebuilt components.
    pub fn with_components(
        pool: PgPool,
        auth: Arc<AuthService>,
        audit_logger: Arc<AuditLogger>,
        risk_model: Arc<dyn RiskModel>,
    ) -> Self {
        Self {
            portfolios: PortfolioRepository::new(pool.clone()),
            positions: PositionRepository::new(pool.clone()),
            trades: TradeRepository::new(pool.clone()),
            alerts: AlertRepository::new(pool.clone()),
            pool,
            auth,
            audit_logger,
            risk_model,
        }
    }
}
