//! Database operations for portfolios.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::types::{Portfolio, PortfolioUpdate, RiskMetrics};
use crate::Result;

pub(crate) const PORTFOLIO_COLUMNS: &str = r#"
    id, user_id, name, description, cash_balance, total_value, status,
    risk_score, volatility, var_95, var_99, sharpe_ratio, last_scored_at,
    created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PortfolioRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    description: Option<String>,
    cash_balance: Decimal,
    total_value: Decimal,
    status: String,
    risk_score: Option<Decimal>,
    volatility: Option<Decimal>,
    var_95: Option<Decimal>,
    var_99: Option<Decimal>,
    sharpe_ratio: Option<Decimal>,
    last_scored_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PortfolioRow {
    pub(crate) fn into_portfolio(self) -> Result<Portfolio> {
        let risk = match (self.risk_score, self.last_scored_at) {
            (Some(risk_score), Some(scored_at)) => Some(RiskMetrics {
                risk_score,
                volatility: self.volatility.unwrap_or_default(),
                var_95: self.var_95.unwrap_or_default(),
                var_99: self.var_99.unwrap_or_default(),
                sharpe_ratio: self.sharpe_ratio.unwrap_or_default(),
                scored_at,
            }),
            _ => None,
        };

        Ok(Portfolio {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            cash_balance: self.cash_balance,
            total_value: self.total_value,
            status: self.status.parse()?,
            risk,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Recompute `total_value` as cash plus open market value.
pub(crate) async fn refresh_total_value(conn: &mut PgConnection, portfolio_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE portfolios
        SET total_value = cash_balance + COALESCE((
                SELECT SUM(quantity * current_price)
                FROM positions
                WHERE portfolio_id = $1 AND status = 'OPEN'
            ), 0),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(portfolio_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Repository for portfolio data.
pub struct PortfolioRepository {
    pool: PgPool,
}

impl PortfolioRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new portfolio.
    pub async fn insert(&self, portfolio: &Portfolio) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO portfolios (
                id, user_id, name, description, cash_balance, total_value,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(portfolio.id)
        .bind(portfolio.user_id)
        .bind(&portfolio.name)
        .bind(&portfolio.description)
        .bind(portfolio.cash_balance)
        .bind(portfolio.total_value)
        .bind(portfolio.status.as_str())
        .bind(portfolio.created_at)
        .bind(portfolio.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Portfolios owned by a user, newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Portfolio>> {
        let rows: Vec<PortfolioRow> = sqlx::query_as(&format!(
            "SELECT {} FROM portfolios WHERE user_id = $1 ORDER BY created_at DESC",
            PORTFOLIO_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PortfolioRow::into_portfolio).collect()
    }

    /// Get a portfolio. `owner = None` skips the ownership filter.
    pub async fn get(&self, id: Uuid, owner: Option<Uuid>) -> Result<Option<Portfolio>> {
        let row: Option<PortfolioRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM portfolios
            WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2)
            "#,
            PORTFOLIO_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PortfolioRow::into_portfolio).transpose()
    }

    /// Apply a partial update. A cash change shifts `total_value` by the same amount.
    pub async fn update(
        &self,
        id: Uuid,
        owner: Uuid,
        update: &PortfolioUpdate,
    ) -> Result<Option<Portfolio>> {
        let row: Option<PortfolioRow> = sqlx::query_as(&format!(
            r#"
            UPDATE portfolios
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                cash_balance = COALESCE($5, cash_balance),
                total_value = total_value - cash_balance + COALESCE($5, cash_balance),
                status = COALESCE($6, status),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            PORTFOLIO_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .bind(update.name.as_deref().map(str::trim))
        .bind(&update.description)
        .bind(update.cash_balance)
        .bind(update.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(PortfolioRow::into_portfolio).transpose()
    }

    /// Delete a portfolio and, by cascade, its positions and trades.
    pub async fn delete(&self, id: Uuid, owner: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM portfolios WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Persist the latest risk metrics.
    pub async fn record_risk(&self, id: Uuid, metrics: &RiskMetrics) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE portfolios
            SET risk_score = $2, volatility = $3, var_95 = $4, var_99 = $5,
                sharpe_ratio = $6, last_scored_at = $7, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(metrics.risk_score)
        .bind(metrics.volatility)
        .bind(metrics.var_95)
        .bind(metrics.var_99)
        .bind(metrics.sharpe_ratio)
        .bind(metrics.scored_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
