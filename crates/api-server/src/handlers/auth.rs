//! Authentication handlers: registration, login, token rotation and password changes.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use auth::{AuthSession, NewUser, Role, UserView};

use crate::error::{ApiError, ApiResponse, ApiResult, MessageResponse};
use crate::state::AppState;

/// User registration request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Email address.
    pub email: String,
    /// Password (min 8 characters).
    pub password: String,
    /// Display name.
    pub name: String,
    /// Requested role (defaults to TRADER).
    #[serde(default)]
    pub role: Option<Role>,
}

/// User login request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Email address.
    pub email: String,
    /// Password.
    pub password: String,
}

/// Refresh request carrying the current refresh token.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
}

/// Password change request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    #[serde(alias = "currentPassword")]
    pub current_password: String,
    /// New password (min 8 characters).
    #[serde(alias = "newPassword")]
    pub new_password: String,
}

/// Token pair plus the signed-in user.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    /// Short-lived JWT for the Authorization header.
    pub access_token: String,
    /// Single-use token for `/auth/refresh`.
    pub refresh_token: String,
    /// Always "Bearer".
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserView,
}

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            token_type: session.token_type.to_string(),
            expires_in: session.expires_in,
            user: session.user,
        }
    }
}

/// Register a new user account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid request or email already registered", body = crate::error::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
    let Json(req) = payload?;

    let session = state
        .auth
        .register(NewUser {
            email: req.email,
            password: req.password,
            name: req.name,
            role: req.role,
        })
        .await?;

    Ok((StatusCode::CREATED, ApiResponse::ok(session.into())))
}

/// Login with email and password.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or inactive account", body = crate::error::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<AuthResponse>>> {
    let Json(req) = payload?;
    let session = state.auth.login(&req.email, &req.password).await?;
    Ok(ApiResponse::ok(session.into()))
}

/// Exchange a refresh token for a new token pair. The presented token is spent.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = AuthResponse),
        (status = 400, description = "Refresh token missing", body = crate::error::ErrorResponse),
        (status = 401, description = "Refresh token invalid, spent or revoked", body = crate::error::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<AuthResponse>>> {
    let Json(req) = payload?;
    let token = req
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Refresh token is required".into()))?;

    let session = state.auth.refresh(token.trim()).await?;
    Ok(ApiResponse::ok(session.into()))
}

/// Revoke the caller's refresh token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    state.auth.logout(user.id).await?;
    Ok(MessageResponse::new("Logged out"))
}

/// Get the current user's profile.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserView),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
) -> ApiResult<Json<ApiResponse<UserView>>> {
    let profile = state.auth.get_user(user.id).await?;
    Ok(ApiResponse::ok(profile))
}

/// Change the caller's password. Existing refresh tokens stop working.
#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "New password rejected", body = crate::error::ErrorResponse),
        (status = 401, description = "Current password incorrect", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    let Json(req) = payload?;
    state
        .auth
        .change_password(user.id, &req.current_password, &req.new_password)
        .await?;
    Ok(MessageResponse::new("Password changed"))
}
