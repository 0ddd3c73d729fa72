//! Authentication and role-gate middleware for API routes.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use auth::{AuthError, RouteAccess, UserView};

use crate::error::ApiError;
use crate::state::AppState;

/// Pull the bearer token out of the Authorization header.
fn bearer_token(request: &Request<Body>) -> Result<&str, Response> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized_response("Missing authorization header"))?;

    let value = header
        .to_str()
        .map_err(|_| unauthorized_response("Invalid authorization header encoding"))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            unauthorized_response("Invalid authorization format, expected 'Bearer <token>'")
        })
}

/// Validate the access token and confirm the account is still active.
/// On success, injects the caller's `UserView` into request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match bearer_token(&request) {
        Ok(token) => token,
        Err(response) => return response,
    };

    let user = match state.auth.authenticate(token).await {
        Ok(user) => user,
        // A valid token whose subject no longer exists is just a bad token.
        Err(AuthError::UserNotFound) => {
            return ApiError::from(AuthError::InvalidToken).into_response();
        }
        Err(e) => {
            tracing::debug!(error = %e, "Authentication failed");
            return ApiError::from(e).into_response();
        }
    };

    tracing::debug!(user_id = %user.id, role = user.role.as_str(), "Authenticated request");

    request.extensions_mut().insert(user);

    next.run(request).await
}

fn gate(access: RouteAccess, request: Request<Body>) -> Result<Request<Body>, Response> {
    let user = request
        .extensions()
        .get::<UserView>()
        .ok_or_else(|| unauthorized_response("Not authenticated"))?;

    if let Err(e) = access.authorize(user.role) {
        tracing::info!(
            user_id = %user.id,
            role = user.role.as_str(),
            required = ?access,
            "Access denied"
        );
        return Err(ApiError::from(e).into_response());
    }

    Ok(request)
}

/// Middleware that requires the risk desk (RiskManager or Admin).
/// Must be applied AFTER `require_auth` middleware.
pub async fn require_risk_desk(request: Request<Body>, next: Next) -> Response {
    match gate(RouteAccess::RiskDesk, request) {
        Ok(request) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware that requires admin role.
/// Must be applied AFTER `require_auth` middleware.
pub async fn require_admin(request: Request<Body>, next: Next) -> Response {
    match gate(RouteAccess::Admin, request) {
        Ok(request) => next.run(request).await,
        Err(response) => response,
    }
}

fn unauthorized_response(message: &str) -> Response {
    ApiError::Unauthorized(message.to_string()).into_response()
}
