//! Position management handlers.

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
use portfolio_core::types::{
    check_amount, AssetType, Greeks, NewPosition, Position, PositionStatus, PositionUpdate,
};

use super::portfolios::{owned_portfolio, visible_portfolio, write_scope};
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

/// Position response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PositionResponse {
    /// Position identifier.
    pub id: Uuid,
    pub portfolio_id: Uuid,
    /// Upper-cased ticker.
    pub symbol: String,
    /// STOCK, OPTION, FUTURE, ETF or CRYPTO.
    pub asset_type: String,
    /// Signed quantity; negative is short.
    pub quantity: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Current market price.
    pub current_price: Decimal,
    /// Quantity times current price.
    pub market_value: Decimal,
    /// Unrealized P&L.
    pub unrealized_pnl: Decimal,
    /// Unrealized P&L percentage.
    pub unrealized_pnl_pct: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vega: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theta: Option<Decimal>,
    /// OPEN or CLOSED.
    pub status: String,
    /// Position opened timestamp.
    pub opened_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<Position> for PositionResponse {
    fn from(p: Position) -> Self {
        Self {
            market_value: p.market_value(),
            unrealized_pnl: p.unrealized_pnl(),
            unrealized_pnl_pct: p.unrealized_pnl_pct(),
            id: p.id,
            portfolio_id: p.portfolio_id,
            symbol: p.symbol,
            asset_type: p.asset_type.as_str().to_string(),
            quantity: p.quantity,
            entry_price: p.entry_price,
            current_price: p.current_price,
            delta: p.greeks.delta,
            gamma: p.greeks.gamma,
            vega: p.greeks.vega,
            theta: p.greeks.theta,
            status: p.status.as_str().to_string(),
            opened_at: p.opened_at,
            closed_at: p.closed_at,
            updated_at: p.updated_at,
        }
    }
}

/// Query parameters for listing positions.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListPositionsQuery {
    /// Filter by status (OPEN or CLOSED). All when absent.
    #[param(value_type = Option<String>)]
    pub status: Option<PositionStatus>,
}

/// Request to add a position directly.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePositionRequest {
    pub symbol: String,
    /// Defaults to STOCK.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub asset_type: AssetType,
    /// Signed quantity; negative opens a short.
    pub quantity: Decimal,
    pub entry_price: Decimal,
    /// Defaults to the entry price.
    pub current_price: Option<Decimal>,
    pub delta: Option<Decimal>,
    pub gamma: Option<Decimal>,
    pub vega: Option<Decimal>,
    pub theta: Option<Decimal>,
}

/// Mark-to-market update.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePositionRequest {
    pub current_price: Option<Decimal>,
    pub delta: Option<Decimal>,
    pub gamma: Option<Decimal>,
    pub vega: Option<Decimal>,
    pub theta: Option<Decimal>,
}

/// Request to close a position.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ClosePositionRequest {
    /// Exit price (None = current price).
    #[serde(default)]
    pub exit_price: Option<Decimal>,
}

/// List positions in a portfolio.
#[utoipa::path(
    get,
    path = "/api/v1/portfolios/{id}/positions",
    params(("id" = Uuid, Path, description = "Portfolio ID"), ListPositionsQuery),
    responses(
        (status = 200, description = "Positions", body = Vec<PositionResponse>),
        (status = 404, description = "Portfolio not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "positions"
)]
pub async fn list_positions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(portfolio_id): Path<Uuid>,
    Query(query): Query<ListPositionsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<PositionResponse>>>> {
    let portfolio = visible_portfolio(&state, &user, portfolio_id).await?;
    let positions = state.positions.list(portfolio.id, query.status).await?;
    Ok(ApiResponse::ok(
        positions.into_iter().map(Into::into).collect(),
    ))
}

/// Add a position to a portfolio.
#[utoipa::path(
    post,
    path = "/api/v1/portfolios/{id}/positions",
    params(("id" = Uuid, Path, description = "Portfolio ID")),
    request_body = CreatePositionRequest,
    responses(
        (status = 201, description = "Position added", body = PositionResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Portfolio not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "positions"
)]
pub async fn create_position(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(portfolio_id): Path<Uuid>,
    payload: Result<Json<CreatePositionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<PositionResponse>>)> {
    let Json(req) = payload?;
    let portfolio = owned_portfolio(&state, &user, portfolio_id).await?;

    let input = NewPosition {
        symbol: req.symbol,
        asset_type: req.asset_type,
        quantity: req.quantity,
        entry_price: req.entry_price,
        current_price: req.current_price,
        greeks: Greeks {
            delta: req.delta,
            gamma: req.gamma,
            vega: req.vega,
            theta: req.theta,
        },
    };
    input.validate()?;

    let position = input.into_position(portfolio.id);
    state.positions.insert(&position).await?;

    tracing::info!(
        position_id = %position.id,
        portfolio_id = %portfolio.id,
        symbol = %position.symbol,
        "Position added"
    );

    Ok((StatusCode::CREATED, ApiResponse::ok(position.into())))
}

/// Update a position's price or greeks.
#[utoipa::path(
    put,
    path = "/api/v1/positions/{id}",
    params(("id" = Uuid, Path, description = "Position ID")),
    request_body = UpdatePositionRequest,
    responses(
        (status = 200, description = "Position updated", body = PositionResponse),
        (status = 400, description = "Invalid update", body = crate::error::ErrorResponse),
        (status = 404, description = "Position not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "positions"
)]
pub async fn update_position(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdatePositionRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<PositionResponse>>> {
    let Json(req) = payload?;
    let update = PositionUpdate {
        current_price: req.current_price,
        greeks: Greeks {
            delta: req.delta,
            gamma: req.gamma,
            vega: req.vega,
            theta: req.theta,
        },
    };
    update.validate()?;

    state
        .positions
        .get(id, write_scope(&user))
        .await?
        .ok_or_else(|| ApiError::NotFound("Position".into()))?;

    let position = state
        .positions
        .update(id, &update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Position".into()))?;

    Ok(ApiResponse::ok(position.into()))
}

/// Close a position, crediting its value to the portfolio's cash.
#[utoipa::path(
    post,
    path = "/api/v1/positions/{id}/close",
    params(("id" = Uuid, Path, description = "Position ID")),
    request_body = ClosePositionRequest,
    responses(
        (status = 200, description = "Position closed", body = PositionResponse),
        (status = 400, description = "Position already closed", body = crate::error::ErrorResponse),
        (status = 404, description = "Position not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "positions"
)]
pub async fn close_position(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<Uuid>,
    payload: Option<Json<ClosePositionRequest>>,
) -> ApiResult<Json<ApiResponse<PositionResponse>>> {
    let req = payload.map(|Json(req)| req).unwrap_or_default();
    if let Some(price) = req.exit_price {
        if price <= Decimal::ZERO {
            return Err(ApiError::Validation("Exit price must be positive".into()));
        }
        check_amount("Exit price", price).map_err(ApiError::Validation)?;
    }

    let existing = state
        .positions
        .get(id, write_scope(&user))
        .await?
        .ok_or_else(|| ApiError::NotFound("Position".into()))?;
    if !existing.is_open() {
        return Err(ApiError::BadRequest("Position is already closed".into()));
    }

    let position = state
        .positions
        .close(id, req.exit_price)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Position is already closed".into()))?;

    Ok(ApiResponse::ok(position.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_response_derives_values() {
        let mut position = NewPosition::stock("msft", dec!(10), dec!(300)).into_position(Uuid::new_v4());
        position.current_price = dec!(330);

        let response = PositionResponse::from(position);
        assert_eq!(response.symbol, "MSFT");
        assert_eq!(response.asset_type, "STOCK");
        assert_eq!(response.market_value, dec!(3300));
        assert_eq!(response.unrealized_pnl, dec!(300));
        assert_eq!(response.status, "OPEN");
    }

    #[test]
    fn test_create_request_defaults_to_stock() {
        let req: CreatePositionRequest =
            serde_json::from_str(r#"{"symbol":"AAPL","quantity":"5","entry_price":"190.5"}"#)
                .unwrap();
        assert_eq!(req.asset_type, AssetType::Stock);
        assert!(req.current_price.is_none());

        let bad = serde_json::from_str::<CreatePositionRequest>(
            r#"{"symbol":"AAPL","asset_type":"BOND","quantity":"5","entry_price":"1"}"#,
        );
        assert!(bad.is_err());
    }
}
