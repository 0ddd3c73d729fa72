//! Database access layer for PostgreSQL.

pub mod alerts;
pub mod portfolios;
pub mod positions;
pub mod trades;

pub use alerts::AlertRepository;
pub use portfolios::PortfolioRepository;
pub use positions::PositionRepository;
pub use trades::{BookedTrade, TradeRepository};

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// Round-trip a trivial query.
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
