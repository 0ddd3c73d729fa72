//! User administration handlers (admin only).

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use auth::{AccountStatus, NewUser, Role, UserFilter, UserUpdate, UserView};

use crate::error::{ApiResponse, ApiResult, MessageResponse};
use crate::state::AppState;

/// Query parameters for listing users.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    /// Filter by role.
    pub role: Option<Role>,
    /// Filter by account status.
    pub status: Option<AccountStatus>,
    /// Maximum results.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Offset for pagination.
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// Request to create a user on someone's behalf.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Partial update of a user record.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<Role>,
    /// Anything other than ACTIVE also revokes the user's refresh token.
    pub status: Option<AccountStatus>,
}

/// List users.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Users", body = Vec<UserView>),
        (status = 403, description = "Admin role required", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<ApiResponse<Vec<UserView>>>> {
    let filter = UserFilter {
        role: query.role,
        status: query.status,
        limit: Some(query.limit.min(200)),
        offset: Some(query.offset),
    };
    let users = state.auth.list_users(&filter).await?;
    Ok(ApiResponse::ok(users))
}

/// Create a user.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserView),
        (status = 400, description = "Invalid request or email already registered", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<UserView>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<UserView>>)> {
    let Json(req) = payload?;
    let user = state
        .auth
        .create_user(
            admin.id,
            NewUser {
                email: req.email,
                password: req.password,
                name: req.name,
                role: req.role,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, ApiResponse::ok(user)))
}

/// Get a user by ID.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserView),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<UserView>>> {
    let user = state.auth.get_user(id).await?;
    Ok(ApiResponse::ok(user))
}

/// Update a user's name, role or status.
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserView),
        (status = 400, description = "Invalid update", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<UserView>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<UserView>>> {
    let Json(req) = payload?;
    let user = state
        .auth
        .update_user(
            admin.id,
            id,
            UserUpdate {
                name: req.name,
                role: req.role,
                status: req.status,
            },
        )
        .await?;

    Ok(ApiResponse::ok(user))
}

/// Delete a user and everything they own.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 400, description = "Cannot delete own account", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<UserView>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    state.auth.delete_user(admin.id, id).await?;
    Ok(MessageResponse::new("User deleted"))
}
