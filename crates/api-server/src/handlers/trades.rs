//! Trade booking handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use auth::UserView;
use portfolio_core::db::BookedTrade;
use portfolio_core::types::{AssetType, NewTrade, Trade, TradeSide};

use super::portfolios::{owned_portfolio, read_scope, visible_portfolio};
use super::positions::PositionResponse;
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

/// Trade response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TradeResponse {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    /// User who recorded the trade.
    pub user_id: Uuid,
    pub symbol: String,
    /// BUY or SELL.
    pub side: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    /// Signed change to portfolio cash.
    pub cash_impact: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl From<Trade> for TradeResponse {
    fn from(t: Trade) -> Self {
        Self {
            cash_impact: t.cash_impact(),
            id: t.id,
            portfolio_id: t.portfolio_id,
            user_id: t.user_id,
            symbol: t.symbol,
            side: t.side.as_str().to_string(),
            quantity: t.quantity,
            price: t.price,
            commission: t.commission,
            notes: t.notes,
            executed_at: t.executed_at,
        }
    }
}

/// A booked trade with its effects on the book.
#[derive(Debug, Serialize, ToSchema)]
pub struct BookedTradeResponse {
    pub trade: TradeResponse,
    /// Position after the fill.
    pub position: PositionResponse,
    /// Portfolio cash after the trade.
    pub cash_balance: Decimal,
}

impl From<BookedTrade> for BookedTradeResponse {
    fn from(booked: BookedTrade) -> Self {
        Self {
            trade: booked.trade.into(),
            position: booked.position.into(),
            cash_balance: booked.cash_balance,
        }
    }
}

/// Request to record a trade.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTradeRequest {
    pub symbol: String,
    /// BUY or SELL.
    #[schema(value_type = String)]
    pub side: TradeSide,
    /// Positive quantity.
    pub quantity: Decimal,
    pub price: Decimal,
    /// Defaults to 0.
    pub commission: Option<Decimal>,
    pub notes: Option<String>,
    /// Used only when the trade opens a new position. Defaults to STOCK.
    #[schema(value_type = Option<String>)]
    pub asset_type: Option<AssetType>,
    /// Defaults to now.
    pub executed_at: Option<DateTime<Utc>>,
}

/// Query parameters for listing trades.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTradesQuery {
    /// Maximum results.
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Offset for pagination.
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// List trades in a portfolio, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/portfolios/{id}/trades",
    params(("id" = Uuid, Path, description = "Portfolio ID"), ListTradesQuery),
    responses(
        (status = 200, description = "Trades", body = Vec<TradeResponse>),
        (status = 404, description = "Portfolio not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "trades"
)]
pub async fn list_trades(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(portfolio_id): Path<Uuid>,
    Query(query): Query<ListTradesQuery>,
) -> ApiResult<Json<ApiResponse<Vec<TradeResponse>>>> {
    let portfolio = visible_portfolio(&state, &user, portfolio_id).await?;
    let trades = state
        .trades
        .list(portfolio.id, query.limit.clamp(1, 500), query.offset.max(0))
        .await?;

    Ok(ApiResponse::ok(trades.into_iter().map(Into::into).collect()))
}

/// Record a trade, updating cash and the matching position.
#[utoipa::path(
    post,
    path = "/api/v1/portfolios/{id}/trades",
    params(("id" = Uuid, Path, description = "Portfolio ID")),
    request_body = CreateTradeRequest,
    responses(
        (status = 201, description = "Trade recorded", body = BookedTradeResponse),
        (status = 400, description = "Invalid trade", body = crate::error::ErrorResponse),
        (status = 404, description = "Portfolio not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "trades"
)]
pub async fn create_trade(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(portfolio_id): Path<Uuid>,
    payload: Result<Json<CreateTradeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<BookedTradeResponse>>)> {
    let Json(req) = payload?;
    let portfolio = owned_portfolio(&state, &user, portfolio_id).await?;

    let booked = state
        .trades
        .record(
            portfolio.id,
            user.id,
            NewTrade {
                symbol: req.symbol,
                side: req.side,
                quantity: req.quantity,
                price: req.price,
                commission: req.commission,
                notes: req.notes,
                asset_type: req.asset_type,
                executed_at: req.executed_at,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, ApiResponse::ok(booked.into())))
}

/// Get a trade by ID.
#[utoipa::path(
    get,
    path = "/api/v1/trades/{id}",
    params(("id" = Uuid, Path, description = "Trade ID")),
    responses(
        (status = 200, description = "Trade", body = TradeResponse),
        (status = 404, description = "Trade not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "trades"
)]
pub async fn get_trade(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<TradeResponse>>> {
    let trade = state
        .trades
        .get(id, read_scope(&user))
        .await?
        .ok_or_else(|| ApiError::NotFound("Trade".into()))?;

    Ok(ApiResponse::ok(trade.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trade_response_carries_cash_impact() {
        let trade = NewTrade {
            symbol: "aapl".into(),
            side: TradeSide::Buy,
            quantity: dec!(10),
            price: dec!(100.10),
            commission: Some(dec!(1.00)),
            notes: None,
            asset_type: None,
            executed_at: None,
        }
        .into_trade(Uuid::new_v4(), Uuid::new_v4());

        let response = TradeResponse::from(trade);
        assert_eq!(response.side, "BUY");
        assert_eq!(response.symbol, "AAPL");
        assert_eq!(response.cash_impact, dec!(-1002.00));
    }

    #[test]
    fn test_side_must_be_known() {
        let bad = serde_json::from_str::<CreateTradeRequest>(
            r#"{"symbol":"AAPL","side":"HOLD","quantity":"1","price":"1"}"#,
        );
        assert!(bad.is_err());
    }
}
