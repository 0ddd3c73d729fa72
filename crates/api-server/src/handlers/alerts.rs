//! Alert inbox handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use auth::UserView;
use portfolio_core::types::{Alert, AlertSeverity, AlertType, NewAlert};

use crate::error::{ApiError, ApiResponse, ApiResult, MessageResponse};
use crate::state::AppState;

/// Alert response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AlertResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio_id: Option<Uuid>,
    /// RISK_THRESHOLD, PRICE_MOVEMENT, HEDGE_RECOMMENDATION or SYSTEM.
    pub alert_type: String,
    /// INFO, WARNING or CRITICAL.
    pub severity: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Alert> for AlertResponse {
    fn from(a: Alert) -> Self {
        Self {
            id: a.id,
            portfolio_id: a.portfolio_id,
            alert_type: a.alert_type.as_str().to_string(),
            severity: a.severity.as_str().to_string(),
            title: a.title,
            message: a.message,
            is_read: a.is_read,
            created_at: a.created_at,
        }
    }
}

/// A page of alerts plus the unread total.
#[derive(Debug, Serialize, ToSchema)]
pub struct AlertListResponse {
    pub alerts: Vec<AlertResponse>,
    pub unread_count: i64,
}

/// Query parameters for listing alerts.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListAlertsQuery {
    /// Only unread alerts.
    #[serde(default)]
    pub unread_only: bool,
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

/// Risk-desk request to notify a user.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAlertRequest {
    /// Recipient.
    pub user_id: Uuid,
    pub portfolio_id: Option<Uuid>,
    /// Defaults to SYSTEM.
    #[schema(value_type = Option<String>)]
    pub alert_type: Option<AlertType>,
    /// Defaults to INFO.
    #[schema(value_type = Option<String>)]
    pub severity: Option<AlertSeverity>,
    pub title: String,
    pub message: String,
}

/// Number of alerts changed by a bulk operation.
#[derive(Debug, Serialize, ToSchema)]
pub struct UpdatedCountResponse {
    pub updated: u64,
}

/// List the caller's alerts, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/alerts",
    params(ListAlertsQuery),
    responses(
        (status = 200, description = "Alerts", body = AlertListResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Query(query): Query<ListAlertsQuery>,
) -> ApiResult<Json<ApiResponse<AlertListResponse>>> {
    let alerts = state
        .alerts
        .list(
            user.id,
            query.unread_only,
            query.limit.clamp(1, 200),
            query.offset.max(0),
        )
        .await?;
    let unread_count = state.alerts.unread_count(user.id).await?;

    Ok(ApiResponse::ok(AlertListResponse {
        alerts: alerts.into_iter().map(Into::into).collect(),
        unread_count,
    }))
}

/// Create an alert for any user (risk desk only).
#[utoipa::path(
    post,
    path = "/api/v1/alerts",
    request_body = CreateAlertRequest,
    responses(
        (status = 201, description = "Alert created", body = AlertResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 403, description = "Risk desk role required", body = crate::error::ErrorResponse),
        (status = 404, description = "Recipient not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn create_alert(
    State(state): State<Arc<AppState>>,
    Extension(sender): Extension<UserView>,
    payload: Result<Json<CreateAlertRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<AlertResponse>>)> {
    let Json(req) = payload?;
    let input = NewAlert {
        user_id: req.user_id,
        portfolio_id: req.portfolio_id,
        alert_type: req.alert_type.unwrap_or(AlertType::System),
        severity: req.severity.unwrap_or(AlertSeverity::Info),
        title: req.title,
        message: req.message,
    };
    input.validate()?;

    // Recipient must exist; the portfolio, if named, must be theirs.
    state.auth.get_user(input.user_id).await?;
    if let Some(portfolio_id) = input.portfolio_id {
        state
            .portfolios
            .get(portfolio_id, Some(input.user_id))
            .await?
            .ok_or_else(|| ApiError::NotFound("Portfolio".into()))?;
    }

    let alert = input.into_alert();
    state.alerts.insert(&alert).await?;

    tracing::info!(
        alert_id = %alert.id,
        recipient = %alert.user_id,
        sender = %sender.id,
        severity = alert.severity.as_str(),
        "Alert created"
    );

    Ok((StatusCode::CREATED, ApiResponse::ok(alert.into())))
}

/// Mark one alert as read.
#[utoipa::path(
    put,
    path = "/api/v1/alerts/{id}/read",
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Alert marked read", body = MessageResponse),
        (status = 404, description = "Alert not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    if !state.alerts.mark_read(id, user.id).await? {
        return Err(ApiError::NotFound("Alert".into()));
    }
    Ok(MessageResponse::new("Alert marked as read"))
}

/// Mark all of the caller's alerts as read.
#[utoipa::path(
    put,
    path = "/api/v1/alerts/read-all",
    responses(
        (status = 200, description = "Alerts marked read", body = UpdatedCountResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
) -> ApiResult<Json<ApiResponse<UpdatedCountResponse>>> {
    let updated = state.alerts.mark_all_read(user.id).await?;
    Ok(ApiResponse::ok(UpdatedCountResponse { updated }))
}

/// Delete an alert.
#[utoipa::path(
    delete,
    path = "/api/v1/alerts/{id}",
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Alert deleted", body = MessageResponse),
        (status = 404, description = "Alert not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn delete_alert(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    if !state.alerts.delete(id, user.id).await? {
        return Err(ApiError::NotFound("Alert".into()));
    }
    Ok(MessageResponse::new("Alert deleted"))
}
