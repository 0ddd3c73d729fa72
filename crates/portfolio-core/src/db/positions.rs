//! Database operations for positions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::portfolios::refresh_total_value;
use crate::types::{Greeks, Position, PositionStatus, PositionUpdate};
use crate::{Error, Result};

const POSITION_COLUMNS: &str = r#"
    id, portfolio_id, symbol, asset_type, quantity, entry_price, current_price,
    delta, gamma, vega, theta, status, opened_at, closed_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct PositionRow {
    id: Uuid,
    portfolio_id: Uuid,
    symbol: String,
    asset_type: String,
    quantity: Decimal,
    entry_price: Decimal,
    current_price: Decimal,
    delta: Option<Decimal>,
    gamma: Option<Decimal>,
    vega: Option<Decimal>,
    theta: Option<Decimal>,
    status: String,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl PositionRow {
    fn into_position(self) -> Result<Position> {
        Ok(Position {
            id: self.id,
            portfolio_id: self.portfolio_id,
            symbol: self.symbol,
            asset_type: self.asset_type.parse()?,
            quantity: self.quantity,
            entry_price: self.entry_price,
            current_price: self.current_price,
            greeks: Greeks {
                delta: self.delta,
                gamma: self.gamma,
                vega: self.vega,
                theta: self.theta,
            },
            status: self.status.parse()?,
            opened_at: self.opened_at,
            closed_at: self.closed_at,
            updated_at: self.updated_at,
        })
    }
}

/// Open position in `symbol`, locked for the rest of the transaction.
pub(crate) async fn find_open_for_update(
    conn: &mut PgConnection,
    portfolio_id: Uuid,
    symbol: &str,
) -> Result<Option<Position>> {
    let row: Option<PositionRow> = sqlx::query_as(&format!(
        r#"
        SELECT {}
        FROM positions
        WHERE portfolio_id = $1 AND symbol = $2 AND status = 'OPEN'
        FOR UPDATE
        "#,
        POSITION_COLUMNS
    ))
    .bind(portfolio_id)
    .bind(symbol)
    .fetch_optional(conn)
    .await?;

    row.map(PositionRow::into_position).transpose()
}

/// Insert or overwrite a position row.
pub(crate) async fn upsert(conn: &mut PgConnection, position: &Position) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO positions (
            id, portfolio_id, symbol, asset_type, quantity, entry_price, current_price,
            delta, gamma, vega, theta, status, opened_at, closed_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (id) DO UPDATE SET
            quantity = EXCLUDED.quantity,
            entry_price = EXCLUDED.entry_price,
            current_price = EXCLUDED.current_price,
            delta = EXCLUDED.delta,
            gamma = EXCLUDED.gamma,
            vega = EXCLUDED.vega,
            theta = EXCLUDED.theta,
            status = EXCLUDED.status,
            closed_at = EXCLUDED.closed_at,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(position.id)
    .bind(position.portfolio_id)
    .bind(&position.symbol)
    .bind(position.asset_type.as_str())
    .bind(position.quantity)
    .bind(position.entry_price)
    .bind(position.current_price)
    .bind(position.greeks.delta)
    .bind(position.greeks.gamma)
    .bind(position.greeks.vega)
    .bind(position.greeks.theta)
    .bind(position.status.as_str())
    .bind(position.opened_at)
    .bind(position.closed_at)
    .bind(position.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

fn duplicate_position(symbol: &str) -> Error {
    Error::Validation(format!(
        "An open {} position already exists; record a trade to change it",
        symbol
    ))
}

pub(crate) fn ensure_no_open_position(existing: Option<&Position>, symbol: &str) -> Result<()> {
    match existing {
        Some(position) if position.is_open() => Err(duplicate_position(symbol)),
        _ => Ok(()),
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

/// Repository for position data.
pub struct PositionRepository {
    pool: PgPool,
}

impl PositionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Positions of a portfolio, optionally filtered by status.
    pub async fn list(
        &self,
        portfolio_id: Uuid,
        status: Option<PositionStatus>,
    ) -> Result<Vec<Position>> {
        let rows: Vec<PositionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM positions
            WHERE portfolio_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY opened_at DESC
            "#,
            POSITION_COLUMNS
        ))
        .bind(portfolio_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PositionRow::into_position).collect()
    }

    /// Get a position whose portfolio belongs to `owner` (any owner when `None`).
    pub async fn get(&self, id: Uuid, owner: Option<Uuid>) -> Result<Option<Position>> {
        let row: Option<PositionRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.portfolio_id, p.symbol, p.asset_type, p.quantity,
                   p.entry_price, p.current_price, p.delta, p.gamma, p.vega, p.theta,
                   p.status, p.opened_at, p.closed_at, p.updated_at
            FROM positions p
            JOIN portfolios pf ON pf.id = p.portfolio_id
            WHERE p.id = $1 AND ($2::uuid IS NULL OR pf.user_id = $2)
            "#,
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PositionRow::into_position).transpose()
    }

    /// Insert a new position and revalue its portfolio.
    ///
    /// A symbol may have only one open position per portfolio; a second one
    /// is a validation error.
    pub async fn insert(&self, position: &Position) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let existing = find_open_for_update(&mut tx, position.portfolio_id, &position.symbol).await?;
        ensure_no_open_position(existing.as_ref(), &position.symbol)?;

        // A concurrent insert can still win the race on the partial unique index.
        if let Err(e) = upsert(&mut tx, position).await {
            return Err(match e {
                Error::Database(db) if is_unique_violation(&db) => duplicate_position(&position.symbol),
                other => other,
            });
        }
        refresh_total_value(&mut tx, position.portfolio_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Mark to market and/or update greeks, then revalue the portfolio.
    pub async fn update(&self, id: Uuid, update: &PositionUpdate) -> Result<Option<Position>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<PositionRow> = sqlx::query_as(&format!(
            r#"
            UPDATE positions
            SET current_price = COALESCE($2, current_price),
                delta = COALESCE($3, delta),
                gamma = COALESCE($4, gamma),
                vega = COALESCE($5, vega),
                theta = COALESCE($6, theta),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            POSITION_COLUMNS
        ))
        .bind(id)
        .bind(update.current_price)
        .bind(update.greeks.delta)
        .bind(update.greeks.gamma)
        .bind(update.greeks.vega)
        .bind(update.greeks.theta)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let position = row.into_position()?;
        refresh_total_value(&mut tx, position.portfolio_id).await?;
        tx.commit().await?;

        Ok(Some(position))
    }

    /// Close an open position, crediting its market value to cash.
    ///
    /// Returns `None` if the position does not exist or is already closed.
    pub async fn close(&self, id: Uuid, exit_price: Option<Decimal>) -> Result<Option<Position>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<PositionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM positions WHERE id = $1 AND status = 'OPEN' FOR UPDATE",
            POSITION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut position = row.into_position()?;
        let price = exit_price.unwrap_or(position.current_price);
        let proceeds = position.close(price, Utc::now());

        upsert(&mut tx, &position).await?;
        sqlx::query("UPDATE portfolios SET cash_balance = cash_balance + $2 WHERE id = $1")
            .bind(position.portfolio_id)
            .bind(proceeds)
            .execute(&mut *tx)
            .await?;
        refresh_total_value(&mut tx, position.portfolio_id).await?;
        tx.commit().await?;

        tracing::debug!(
            position_id = %position.id,
            symbol = %position.symbol,
            proceeds = %proceeds,
            "Position closed"
        );
        Ok(Some(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewPosition, TradeSide};
    use rust_decimal_macros::dec;

    #[test]
    fn test_second_open_position_is_rejected() {
        let existing = NewPosition::stock("AAPL", dec!(10), dec!(190)).into_position(Uuid::new_v4());

        let err = ensure_no_open_position(Some(&existing), "AAPL").unwrap_err();
        assert!(matches!(err, Error::Validation(ref msg) if msg.contains("AAPL")));
    }

    #[test]
    fn test_symbol_free_once_closed() {
        let mut existing = Position::from_fill(
            Uuid::new_v4(),
            "AAPL",
            Default::default(),
            TradeSide::Buy,
            dec!(10),
            dec!(190),
            Utc::now(),
        );
        existing.close(dec!(200), Utc::now());

        assert!(ensure_no_open_position(Some(&existing), "AAPL").is_ok());
        assert!(ensure_no_open_position(None, "AAPL").is_ok());
    }

    #[test]
    fn test_non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
