//! Database operations for trades.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::portfolios::refresh_total_value;
use super::positions::{find_open_for_update, upsert};
use crate::types::{NewTrade, Position, Trade};
use crate::{Error, Result};

const TRADE_COLUMNS: &str = r#"
    id, portfolio_id, user_id, symbol, side, quantity, price, commission, notes, executed_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct TradeRow {
    id: Uuid,
    portfolio_id: Uuid,
    user_id: Uuid,
    symbol: String,
    side: String,
    quantity: Decimal,
    price: Decimal,
    commission: Decimal,
    notes: Option<String>,
    executed_at: DateTime<Utc>,
}

impl TradeRow {
    fn into_trade(self) -> Result<Trade> {
        Ok(Trade {
            id: self.id,
            portfolio_id: self.portfolio_id,
            user_id: self.user_id,
            symbol: self.symbol,
            side: self.side.parse()?,
            quantity: self.quantity,
            price: self.price,
            commission: self.commission,
            notes: self.notes,
            executed_at: self.executed_at,
        })
    }
}

/// Result of booking a trade.
#[derive(Debug, Clone)]
pub struct BookedTrade {
    pub trade: Trade,
    /// Position after the fill (closed if the trade flattened it).
    pub position: Position,
    pub cash_balance: Decimal,
}

/// Repository for trade data.
pub struct TradeRepository {
    pool: PgPool,
}

impl TradeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Trades of a portfolio, newest first.
    pub async fn list(&self, portfolio_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Trade>> {
        let rows: Vec<TradeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM trades
            WHERE portfolio_id = $1
            ORDER BY executed_at DESC
            LIMIT $2 OFFSET $3
            "#,
            TRADE_COLUMNS
        ))
        .bind(portfolio_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TradeRow::into_trade).collect()
    }

    /// Get a trade whose portfolio belongs to `owner` (any owner when `None`).
    pub async fn get(&self, id: Uuid, owner: Option<Uuid>) -> Result<Option<Trade>> {
        let row: Option<TradeRow> = sqlx::query_as(
            r#"
            SELECT t.id, t.portfolio_id, t.user_id, t.symbol, t.side, t.quantity,
                   t.price, t.commission, t.notes, t.executed_at
            FROM trades t
            JOIN portfolios pf ON pf.id = t.portfolio_id
            WHERE t.id = $1 AND ($2::uuid IS NULL OR pf.user_id = $2)
            "#,
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TradeRow::into_trade).transpose()
    }

    /// Record a trade, adjusting cash and the matching position atomically.
    pub async fn record(&self, portfolio_id: Uuid, user_id: Uuid, input: NewTrade) -> Result<BookedTrade> {
        input.validate()?;
        let asset_type = input.asset_type.unwrap_or_default();
        let trade = input.into_trade(portfolio_id, user_id);

        let mut tx = self.pool.begin().await?;

        // Serialize concurrent bookings against the same portfolio.
        let locked: Option<(Decimal,)> =
            sqlx::query_as("SELECT cash_balance FROM portfolios WHERE id = $1 FOR UPDATE")
                .bind(portfolio_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(Error::NotFound("Portfolio".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO trades (
                id, portfolio_id, user_id, symbol, side, quantity, price, commission,
                notes, executed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(trade.id)
        .bind(trade.portfolio_id)
        .bind(trade.user_id)
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.quantity)
        .bind(trade.price)
        .bind(trade.commission)
        .bind(&trade.notes)
        .bind(trade.executed_at)
        .execute(&mut *tx)
        .await?;

        let position = match find_open_for_update(&mut tx, portfolio_id, &trade.symbol).await? {
            Some(mut position) => {
                position.apply_fill(trade.side, trade.quantity, trade.price, trade.executed_at);
                position
            }
            None => Position::from_fill(
                portfolio_id,
                &trade.symbol,
                asset_type,
                trade.side,
                trade.quantity,
                trade.price,
                trade.executed_at,
            ),
        };
        upsert(&mut tx, &position).await?;

        let (cash_balance,): (Decimal,) = sqlx::query_as(
            r#"
            UPDATE portfolios
            SET cash_balance = cash_balance + $2
            WHERE id = $1
            RETURNING cash_balance
            "#,
        )
        .bind(portfolio_id)
        .bind(trade.cash_impact())
        .fetch_one(&mut *tx)
        .await?;

        refresh_total_value(&mut tx, portfolio_id).await?;
        tx.commit().await?;

        tracing::info!(
            trade_id = %trade.id,
            portfolio_id = %portfolio_id,
            symbol = %trade.symbol,
            side = trade.side.as_str(),
            quantity = %trade.quantity,
            price = %trade.price,
            "Trade recorded"
        );

        Ok(BookedTrade {
            trade,
            position,
            cash_balance,
        })
    }
}
