//! Portfolio handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use auth::UserView;
use portfolio_core::types::{
    NewPortfolio, Portfolio, PortfolioStatus, PortfolioUpdate, PositionStatus, RiskMetrics,
};

use super::positions::PositionResponse;
use crate::error::{ApiError, ApiResponse, ApiResult, MessageResponse};
use crate::state::AppState;

/// Owner filter for reads: admins see every portfolio.
pub(crate) fn read_scope(user: &UserView) -> Option<Uuid> {
    if user.role.can_read_all() {
        None
    } else {
        Some(user.id)
    }
}

/// Owner filter for writes: always the caller, whatever the role.
pub(crate) fn write_scope(user: &UserView) -> Option<Uuid> {
    Some(user.id)
}

/// Load a portfolio the caller may see. Foreign portfolios look missing.
pub(crate) async fn visible_portfolio(
    state: &AppState,
    user: &UserView,
    id: Uuid,
) -> ApiResult<Portfolio> {
    state
        .portfolios
        .get(id, read_scope(user))
        .await?
        .ok_or_else(|| ApiError::NotFound("Portfolio".into()))
}

/// Load a portfolio the caller owns.
pub(crate) async fn owned_portfolio(
    state: &AppState,
    user: &UserView,
    id: Uuid,
) -> ApiResult<Portfolio> {
    state
        .portfolios
        .get(id, write_scope(user))
        .await?
        .ok_or_else(|| ApiError::NotFound("Portfolio".into()))
}

/// Latest ML risk metrics.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RiskMetricsResponse {
    /// 0 to 100.
    pub risk_score: Decimal,
    pub volatility: Decimal,
    pub var_95: Decimal,
    pub var_99: Decimal,
    pub sharpe_ratio: Decimal,
    pub scored_at: DateTime<Utc>,
}

impl From<RiskMetrics> for RiskMetricsResponse {
    fn from(m: RiskMetrics) -> Self {
        Self {
            risk_score: m.risk_score,
            volatility: m.volatility,
            var_95: m.var_95,
            var_99: m.var_99,
            sharpe_ratio: m.sharpe_ratio,
            scored_at: m.scored_at,
        }
    }
}

/// Portfolio response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PortfolioResponse {
    pub id: Uuid,
    /// Owner.
    pub user_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub cash_balance: Decimal,
    /// Cash plus market value of open positions.
    pub total_value: Decimal,
    /// ACTIVE or ARCHIVED.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskMetricsResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Portfolio> for PortfolioResponse {
    fn from(p: Portfolio) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            name: p.name,
            description: p.description,
            cash_balance: p.cash_balance,
            total_value: p.total_value,
            status: p.status.as_str().to_string(),
            risk: p.risk.map(Into::into),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Portfolio with its open positions.
#[derive(Debug, Serialize, ToSchema)]
pub struct PortfolioDetailResponse {
    #[serde(flatten)]
    pub portfolio: PortfolioResponse,
    pub positions: Vec<PositionResponse>,
}

/// Request to create a portfolio.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePortfolioRequest {
    pub name: String,
    pub description: Option<String>,
    /// Starting cash (defaults to 0).
    pub cash_balance: Option<Decimal>,
}

/// Partial portfolio update.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePortfolioRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cash_balance: Option<Decimal>,
    /// ACTIVE or ARCHIVED.
    #[schema(value_type = Option<String>)]
    pub status: Option<PortfolioStatus>,
}

/// List the caller's portfolios.
#[utoipa::path(
    get,
    path = "/api/v1/portfolios",
    responses(
        (status = 200, description = "Portfolios", body = Vec<PortfolioResponse>),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "portfolios"
)]
pub async fn list_portfolios(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
) -> ApiResult<Json<ApiResponse<Vec<PortfolioResponse>>>> {
    let portfolios = state.portfolios.list_for_user(user.id).await?;
    Ok(ApiResponse::ok(
        portfolios.into_iter().map(Into::into).collect(),
    ))
}

/// Create a portfolio.
#[utoipa::path(
    post,
    path = "/api/v1/portfolios",
    request_body = CreatePortfolioRequest,
    responses(
        (status = 201, description = "Portfolio created", body = PortfolioResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "portfolios"
)]
pub async fn create_portfolio(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    payload: Result<Json<CreatePortfolioRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<PortfolioResponse>>)> {
    let Json(req) = payload?;
    let input = NewPortfolio {
        name: req.name,
        description: req.description,
        cash_balance: req.cash_balance,
    };
    input.validate()?;

    let portfolio = input.into_portfolio(user.id);
    state.portfolios.insert(&portfolio).await?;

    tracing::info!(portfolio_id = %portfolio.id, user_id = %user.id, "Portfolio created");

    Ok((StatusCode::CREATED, ApiResponse::ok(portfolio.into())))
}

/// Get a portfolio with its open positions.
#[utoipa::path(
    get,
    path = "/api/v1/portfolios/{id}",
    params(("id" = Uuid, Path, description = "Portfolio ID")),
    responses(
        (status = 200, description = "Portfolio", body = PortfolioDetailResponse),
        (status = 404, description = "Portfolio not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "portfolios"
)]
pub async fn get_portfolio(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<PortfolioDetailResponse>>> {
    let portfolio = visible_portfolio(&state, &user, id).await?;
    let positions = state
        .positions
        .list(portfolio.id, Some(PositionStatus::Open))
        .await?;

    Ok(ApiResponse::ok(PortfolioDetailResponse {
        portfolio: portfolio.into(),
        positions: positions.into_iter().map(Into::into).collect(),
    }))
}

/// Update a portfolio.
#[utoipa::path(
    put,
    path = "/api/v1/portfolios/{id}",
    params(("id" = Uuid, Path, description = "Portfolio ID")),
    request_body = UpdatePortfolioRequest,
    responses(
        (status = 200, description = "Portfolio updated", body = PortfolioResponse),
        (status = 400, description = "Invalid update", body = crate::error::ErrorResponse),
        (status = 404, description = "Portfolio not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "portfolios"
)]
pub async fn update_portfolio(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdatePortfolioRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<PortfolioResponse>>> {
    let Json(req) = payload?;
    let update = PortfolioUpdate {
        name: req.name,
        description: req.description,
        cash_balance: req.cash_balance,
        status: req.status,
    };
    update.validate()?;

    let portfolio = state
        .portfolios
        .update(id, user.id, &update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Portfolio".into()))?;

    Ok(ApiResponse::ok(portfolio.into()))
}

/// Delete a portfolio with its positions and trades.
#[utoipa::path(
    delete,
    path = "/api/v1/portfolios/{id}",
    params(("id" = Uuid, Path, description = "Portfolio ID")),
    responses(
        (status = 200, description = "Portfolio deleted", body = MessageResponse),
        (status = 404, description = "Portfolio not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "portfolios"
)]
pub async fn delete_portfolio(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    if !state.portfolios.delete(id, user.id).await? {
        return Err(ApiError::NotFound("Portfolio".into()));
    }

    tracing::info!(portfolio_id = %id, user_id = %user.id, "Portfolio deleted");
    Ok(MessageResponse::new("Portfolio deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::{AccountStatus, Role};
    use rust_decimal_macros::dec;

    fn user(role: Role) -> UserView {
        UserView {
            id: Uuid::new_v4(),
            email: "pm@example.com".into(),
            name: "PM".into(),
            role,
            status: AccountStatus::Active,
            last_login: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_read_scope() {
        let trader = user(Role::Trader);
        assert_eq!(read_scope(&trader), Some(trader.id));
        assert!(read_scope(&user(Role::RiskManager)).is_some());
        assert_eq!(read_scope(&user(Role::Admin)), None);
    }

    #[test]
    fn test_admins_write_only_their_own_portfolios() {
        let admin = user(Role::Admin);
        assert_eq!(read_scope(&admin), None);
        assert_eq!(write_scope(&admin), Some(admin.id));

        let risk = user(Role::RiskManager);
        assert_eq!(write_scope(&risk), Some(risk.id));
    }

    #[test]
    fn test_portfolio_response() {
        let portfolio = Portfolio::new(Uuid::new_v4(), "Core".into(), None, dec!(2500));
        let json = serde_json::to_value(PortfolioResponse::from(portfolio)).unwrap();
        assert_eq!(json["status"], "ACTIVE");
        assert_eq!(json["total_value"], "2500");
        assert!(json.get("risk").is_none());
        assert!(json.get("description").is_none());
    }
}
