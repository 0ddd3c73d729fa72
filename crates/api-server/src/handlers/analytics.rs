//! Portfolio analytics and ML risk handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use auth::UserView;
use portfolio_core::analytics::{self, AssetExposure, PortfolioSummary};
use portfolio_core::types::PositionStatus;

use super::alerts::AlertResponse;
use super::portfolios::{owned_portfolio, visible_portfolio, RiskMetricsResponse};
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

/// Largest batch the risk desk may score in one call.
const MAX_BATCH: usize = 50;

/// Exposure to one asset class.
#[derive(Debug, Serialize, ToSchema)]
pub struct ExposureResponse {
    pub asset_type: String,
    /// Gross market value.
    pub market_value: Decimal,
    /// Share of gross exposure, in percent.
    pub weight_pct: Decimal,
}

impl From<AssetExposure> for ExposureResponse {
    fn from(e: AssetExposure) -> Self {
        Self {
            asset_type: e.asset_type.as_str().to_string(),
            market_value: e.market_value,
            weight_pct: e.weight_pct,
        }
    }
}

/// Valuation summary.
#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    pub portfolio_id: Uuid,
    pub total_value: Decimal,
    pub cash_balance: Decimal,
    /// Market value of open positions.
    pub invested_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub open_positions: usize,
    pub exposure: Vec<ExposureResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskMetricsResponse>,
}

impl From<PortfolioSummary> for SummaryResponse {
    fn from(s: PortfolioSummary) -> Self {
        Self {
            portfolio_id: s.portfolio_id,
            total_value: s.total_value,
            cash_balance: s.cash_balance,
            invested_value: s.invested_value,
            unrealized_pnl: s.unrealized_pnl,
            open_positions: s.open_positions,
            exposure: s.exposure.into_iter().map(Into::into).collect(),
            risk: s.risk.map(Into::into),
        }
    }
}

/// Result of scoring a portfolio.
#[derive(Debug, Serialize, ToSchema)]
pub struct RiskScoreResponse {
    pub portfolio_id: Uuid,
    pub metrics: RiskMetricsResponse,
    pub recommendation: String,
    /// Model confidence, 0 to 1.
    pub confidence: f64,
    /// Alert raised by this score, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertResponse>,
}

/// Hedge suggestion for a portfolio.
#[derive(Debug, Serialize, ToSchema)]
pub struct HedgeResponse {
    pub portfolio_id: Uuid,
    /// Share-equivalent delta that was hedged against.
    pub portfolio_delta: Decimal,
    /// BUY, SELL or HOLD.
    pub action: String,
    pub contracts: i64,
    pub strategy: String,
    pub expected_reduction: f64,
}

/// Risk-desk batch scoring request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchRiskRequest {
    pub portfolio_ids: Vec<Uuid>,
}

/// One portfolio's score within a batch.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchRiskItem {
    pub portfolio_id: Uuid,
    pub risk_score: f64,
    pub volatility: f64,
    pub var_95: f64,
    pub var_99: f64,
    pub sharpe_ratio: f64,
    pub recommendation: String,
    pub confidence: f64,
}

/// Scoring service status.
#[derive(Debug, Serialize, ToSchema)]
pub struct MlHealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfoResponse>,
}

/// Deployed model metadata.
#[derive(Debug, Serialize, ToSchema)]
pub struct ModelInfoResponse {
    pub name: String,
    pub version: String,
    pub trained_at: String,
    pub performance_metrics: HashMap<String, f64>,
}

/// Valuation and exposure summary of a portfolio.
#[utoipa::path(
    get,
    path = "/api/v1/portfolios/{id}/summary",
    params(("id" = Uuid, Path, description = "Portfolio ID")),
    responses(
        (status = 200, description = "Summary", body = SummaryResponse),
        (status = 404, description = "Portfolio not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn portfolio_summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<SummaryResponse>>> {
    let portfolio = visible_portfolio(&state, &user, id).await?;
    let positions = state
        .positions
        .list(portfolio.id, Some(PositionStatus::Open))
        .await?;

    let summary = analytics::summarize(&portfolio, &positions);
    Ok(ApiResponse::ok(summary.into()))
}

/// Score a portfolio with the ML service and store the result.
///
/// Scores above the warning threshold also raise an alert for the owner.
/// Scoring writes to the portfolio, so only its owner may run it.
#[utoipa::path(
    post,
    path = "/api/v1/portfolios/{id}/risk",
    params(("id" = Uuid, Path, description = "Portfolio ID")),
    responses(
        (status = 200, description = "Risk scored", body = RiskScoreResponse),
        (status = 400, description = "Portfolio cannot be scored", body = crate::error::ErrorResponse),
        (status = 404, description = "Portfolio not found", body = crate::error::ErrorResponse),
        (status = 502, description = "ML service failure", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn score_risk(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<RiskScoreResponse>>> {
    let portfolio = owned_portfolio(&state, &user, id).await?;
    let positions = state
        .positions
        .list(portfolio.id, Some(PositionStatus::Open))
        .await?;

    let assessment =
        analytics::assess_portfolio(state.risk_model.as_ref(), &portfolio, &positions).await?;

    state
        .portfolios
        .record_risk(portfolio.id, &assessment.metrics)
        .await?;

    let alert = match assessment.alert {
        Some(new_alert) => {
            let alert = new_alert.into_alert();
            state.alerts.insert(&alert).await?;
            Some(alert.into())
        }
        None => None,
    };

    tracing::info!(
        portfolio_id = %portfolio.id,
        risk_score = %assessment.metrics.risk_score,
        scored_by = %user.id,
        "Portfolio risk scored"
    );

    Ok(ApiResponse::ok(RiskScoreResponse {
        portfolio_id: portfolio.id,
        metrics: assessment.metrics.into(),
        recommendation: assessment.prediction.recommendation,
        confidence: assessment.prediction.confidence,
        alert,
    }))
}

/// Ask the ML service how to hedge the portfolio's delta.
#[utoipa::path(
    get,
    path = "/api/v1/portfolios/{id}/hedge",
    params(("id" = Uuid, Path, description = "Portfolio ID")),
    responses(
        (status = 200, description = "Hedge recommendation", body = HedgeResponse),
        (status = 404, description = "Portfolio not found", body = crate::error::ErrorResponse),
        (status = 502, description = "ML service failure", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn hedge_recommendation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<HedgeResponse>>> {
    let portfolio = visible_portfolio(&state, &user, id).await?;
    let positions = state
        .positions
        .list(portfolio.id, Some(PositionStatus::Open))
        .await?;

    let hedge =
        analytics::recommend_hedge(state.risk_model.as_ref(), &portfolio, &positions).await?;

    Ok(ApiResponse::ok(HedgeResponse {
        portfolio_id: portfolio.id,
        portfolio_delta: analytics::aggregate_delta(&positions),
        action: hedge.action,
        contracts: hedge.contracts,
        strategy: hedge.strategy,
        expected_reduction: hedge.expected_reduction,
    }))
}

/// Score many portfolios in one ML call (risk desk only). Nothing is persisted.
#[utoipa::path(
    post,
    path = "/api/v1/analytics/batch-risk",
    request_body = BatchRiskRequest,
    responses(
        (status = 200, description = "Batch scores", body = Vec<BatchRiskItem>),
        (status = 400, description = "Invalid batch", body = crate::error::ErrorResponse),
        (status = 403, description = "Risk desk role required", body = crate::error::ErrorResponse),
        (status = 502, description = "ML service failure", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn batch_risk(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchRiskRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<Vec<BatchRiskItem>>>> {
    let Json(req) = payload?;
    if req.portfolio_ids.is_empty() {
        return Err(ApiError::Validation("At least one portfolio is required".into()));
    }
    if req.portfolio_ids.len() > MAX_BATCH {
        return Err(ApiError::Validation(format!(
            "At most {} portfolios per batch",
            MAX_BATCH
        )));
    }

    let mut requests = Vec::with_capacity(req.portfolio_ids.len());
    for id in &req.portfolio_ids {
        let portfolio = state
            .portfolios
            .get(*id, None)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Portfolio {}", id)))?;
        let positions = state
            .positions
            .list(portfolio.id, Some(PositionStatus::Open))
            .await?;
        requests.push(analytics::risk_request(&portfolio, &positions)?);
    }

    let predictions = state.risk_model.batch_predict(&requests).await?;
    if predictions.len() != requests.len() {
        return Err(ApiError::BadGateway(format!(
            "ML service returned {} predictions for {} portfolios",
            predictions.len(),
            requests.len()
        )));
    }

    let items = req
        .portfolio_ids
        .iter()
        .zip(predictions)
        .map(|(id, p)| BatchRiskItem {
            portfolio_id: *id,
            risk_score: p.risk_score,
            volatility: p.volatility,
            var_95: p.var_95,
            var_99: p.var_99,
            sharpe_ratio: p.sharpe_ratio,
            recommendation: p.recommendation,
            confidence: p.confidence,
        })
        .collect();

    Ok(ApiResponse::ok(items))
}

/// Status of the ML scoring service.
#[utoipa::path(
    get,
    path = "/api/v1/analytics/ml-health",
    responses(
        (status = 200, description = "ML service status", body = MlHealthResponse),
        (status = 502, description = "ML service unreachable", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn ml_health(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ApiResponse<MlHealthResponse>>> {
    let health = state.risk_model.health().await?;

    let model = match state.risk_model.model_info().await {
        Ok(info) => Some(ModelInfoResponse {
            name: info.name,
            version: info.version,
            trained_at: info.trained_at,
            performance_metrics: info.performance_metrics,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "ML model info unavailable");
            None
        }
    };

    Ok(ApiResponse::ok(MlHealthResponse {
        status: health.status,
        model_loaded: health.model_loaded,
        timestamp: health.timestamp,
        model,
    }))
}
