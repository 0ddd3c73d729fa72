//! API route definitions.

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{alerts, analytics, auth, health, portfolios, positions, trades, users};
use crate::middleware::{require_admin, require_auth, require_risk_desk};
use crate::state::AppState;

/// Registers the bearer JWT scheme referenced by protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "HedgeAI Risk Desk API",
        version = "1.0.0",
        description = "Portfolio tracking, ML risk scoring and role-gated administration"
    ),
    paths(
        health::health_check,
        health::readiness,
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::me,
        auth::change_password,
        users::list_users,
        users::create_user,
        users::get_user,
        users::update_user,
        users::delete_user,
        portfolios::list_portfolios,
        portfolios::create_portfolio,
        portfolios::get_portfolio,
        portfolios::update_portfolio,
        portfolios::delete_portfolio,
        positions::list_positions,
        positions::create_position,
        positions::update_position,
        positions::close_position,
        trades::list_trades,
        trades::create_trade,
        trades::get_trade,
        alerts::list_alerts,
        alerts::create_alert,
        alerts::mark_read,
        alerts::mark_all_read,
        alerts::delete_alert,
        analytics::portfolio_summary,
        analytics::score_risk,
        analytics::hedge_recommendation,
        analytics::batch_risk,
        analytics::ml_health,
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::error::MessageResponse,
            health::HealthResponse,
            ::auth::UserView,
            ::auth::Role,
            ::auth::AccountStatus,
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::RefreshRequest,
            auth::ChangePasswordRequest,
            auth::AuthResponse,
            users::CreateUserRequest,
            users::UpdateUserRequest,
            portfolios::PortfolioResponse,
            portfolios::PortfolioDetailResponse,
            portfolios::RiskMetricsResponse,
            portfolios::CreatePortfolioRequest,
            portfolios::UpdatePortfolioRequest,
            positions::PositionResponse,
            positions::CreatePositionRequest,
            positions::UpdatePositionRequest,
            positions::ClosePositionRequest,
            trades::TradeResponse,
            trades::BookedTradeResponse,
            trades::CreateTradeRequest,
            alerts::AlertResponse,
            alerts::AlertListResponse,
            alerts::CreateAlertRequest,
            alerts::UpdatedCountResponse,
            analytics::SummaryResponse,
            analytics::ExposureResponse,
            analytics::RiskScoreResponse,
            analytics::HedgeResponse,
            analytics::BatchRiskRequest,
            analytics::BatchRiskItem,
            analytics::MlHealthResponse,
            analytics::ModelInfoResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration, login and token rotation"),
        (name = "users", description = "User administration (admin only)"),
        (name = "portfolios", description = "Portfolio management"),
        (name = "positions", description = "Position management"),
        (name = "trades", description = "Trade booking"),
        (name = "alerts", description = "Alert inbox"),
        (name = "analytics", description = "Valuation and ML risk analytics"),
    )
)]
pub struct ApiDoc;

/// Create the main router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let authenticated = from_fn_with_state(state.clone(), require_auth);

    // Open to anyone
    let public = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh));

    // Any authenticated role; handlers enforce ownership
    let protected = Router::new()
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/me", get(auth::me))
        .route("/api/v1/auth/change-password", post(auth::change_password))
        .route(
            "/api/v1/portfolios",
            get(portfolios::list_portfolios).post(portfolios::create_portfolio),
        )
        .route(
            "/api/v1/portfolios/{id}",
            get(portfolios::get_portfolio)
                .put(portfolios::update_portfolio)
                .delete(portfolios::delete_portfolio),
        )
        .route(
            "/api/v1/portfolios/{id}/positions",
            get(positions::list_positions).post(positions::create_position),
        )
        .route(
            "/api/v1/portfolios/{id}/trades",
            get(trades::list_trades).post(trades::create_trade),
        )
        .route("/api/v1/portfolios/{id}/summary", get(analytics::portfolio_summary))
        .route("/api/v1/portfolios/{id}/risk", post(analytics::score_risk))
        .route("/api/v1/portfolios/{id}/hedge", get(analytics::hedge_recommendation))
        .route("/api/v1/positions/{id}", put(positions::update_position))
        .route("/api/v1/positions/{id}/close", post(positions::close_position))
        .route("/api/v1/trades/{id}", get(trades::get_trade))
        .route("/api/v1/alerts", get(alerts::list_alerts))
        .route("/api/v1/alerts/read-all", put(alerts::mark_all_read))
        .route("/api/v1/alerts/{id}/read", put(alerts::mark_read))
        .route("/api/v1/alerts/{id}", axum::routing::delete(alerts::delete_alert))
        .route("/api/v1/analytics/ml-health", get(analytics::ml_health))
        .route_layer(authenticated.clone());

    // Risk manager or admin
    let risk_desk = Router::new()
        .route("/api/v1/alerts", post(alerts::create_alert))
        .route("/api/v1/analytics/batch-risk", post(analytics::batch_risk))
        .route_layer(from_fn(require_risk_desk))
        .route_layer(authenticated.clone());

    // Admin only
    let admin = Router::new()
        .route("/api/v1/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/v1/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route_layer(from_fn(require_admin))
        .route_layer(authenticated);

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(risk_desk)
        .merge(admin)
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use chrono::Duration;
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use std::collections::HashMap;
    use tower::ServiceExt;

    use ::auth::{
        AuditLogger, AuthService, Claims, JwtAuth, JwtConfig, MemoryAuditStorage, MemoryUserStore,
        PasswordConfig, PasswordHasher, Role, TokenConfig, TokenKind,
    };
    use portfolio_core::api::ml::{
        HedgeRecommendation, HedgeRequest, MlHealth, ModelInfo, RiskPrediction, RiskRequest,
    };
    use portfolio_core::api::RiskModel;

    struct StubModel;

    #[async_trait]
    impl RiskModel for StubModel {
        async fn predict_risk(&self, _: &RiskRequest) -> portfolio_core::Result<RiskPrediction> {
            Ok(RiskPrediction {
                risk_score: 42.0,
                volatility: 0.2,
                var_95: 100.0,
                var_99: 150.0,
                sharpe_ratio: 1.0,
                recommendation: "Hold".into(),
                confidence: 0.9,
                timestamp: "2024-01-01T00:00:00".into(),
            })
        }

        async fn recommend_hedge(&self, _: &HedgeRequest) -> portfolio_core::Result<HedgeRecommendation> {
            Ok(HedgeRecommendation {
                action: "HOLD".into(),
                contracts: 0,
                strategy: "No Action Required".into(),
                expected_reduction: 0.0,
            })
        }

        async fn batch_predict(&self, requests: &[RiskRequest]) -> portfolio_core::Result<Vec<RiskPrediction>> {
            let mut out = Vec::new();
            for request in requests {
                out.push(self.predict_risk(request).await?);
            }
            Ok(out)
        }

        async fn health(&self) -> portfolio_core::Result<MlHealth> {
            Ok(MlHealth {
                status: "healthy".into(),
                timestamp: "2024-01-01T00:00:00".into(),
                model_loaded: true,
            })
        }

        async fn model_info(&self) -> portfolio_core::Result<ModelInfo> {
            Ok(ModelInfo {
                name: "risk-lstm".into(),
                version: "1.0".into(),
                trained_at: "2024-01-01".into(),
                performance_metrics: HashMap::from([("mae".to_string(), 0.1)]),
            })
        }
    }

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            access: TokenConfig {
                secret: "router-access-secret".into(),
                ttl: Duration::minutes(15),
            },
            refresh: TokenConfig {
                secret: "router-refresh-secret".into(),
                ttl: Duration::days(7),
            },
            issuer: Some("hedgeai-test".into()),
        }
    }

    fn test_app() -> (Router, Arc<AuthService>) {
        // Never connected: these tests only reach in-memory components.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/hedgeai_test")
            .unwrap();
        let audit = Arc::new(AuditLogger::new(Arc::new(MemoryAuditStorage::new())));
        let auth = Arc::new(
            AuthService::new(
                Arc::new(MemoryUserStore::new()),
                JwtAuth::new(jwt_config()),
                PasswordHasher::new(PasswordConfig::minimal()).unwrap(),
            )
            .with_audit(audit.clone()),
        );
        let state = Arc::new(AppState::with_components(
            pool,
            auth.clone(),
            audit,
            Arc::new(StubModel),
        ));
        (create_router(state), auth)
    }

    async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn register(app: &Router, email: &str, role: Option<&str>) -> Value {
        let mut body = json!({ "email": email, "password": "Secret123!", "name": "Test User" });
        if let Some(role) = role {
            body["role"] = json!(role);
        }
        let (status, json) = send(app, Method::POST, "/api/v1/auth/register", None, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["data"].clone()
    }

    #[test]
    fn test_openapi_spec() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().unwrap();
        assert!(json.contains("HedgeAI Risk Desk API"));
        assert!(json.contains("/api/v1/auth/refresh"));
        assert!(json.contains("/api/v1/portfolios/{id}/risk"));
        assert!(json.contains("bearer_auth"));
    }

    #[tokio::test]
    async fn test_register_login_refresh_flow() {
        let (app, _) = test_app();

        let registered = register(&app, "alice@x.com", None).await;
        assert_eq!(registered["token_type"], "Bearer");
        assert_eq!(registered["user"]["role"], "TRADER");
        assert!(registered["user"].get("password_hash").is_none());

        let (status, login) = send(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "alice@x.com", "password": "Secret123!" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login["success"], true);
        let first_refresh = login["data"]["refresh_token"].as_str().unwrap().to_string();

        let (status, rotated) = send(
            &app,
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": first_refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(rotated["data"]["refresh_token"], first_refresh.as_str());

        let (status, replay) = send(
            &app,
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": first_refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(replay["success"], false);
        assert_eq!(replay["code"], "INVALID_REFRESH_TOKEN");
    }

    #[tokio::test]
    async fn test_duplicate_register_and_bad_login() {
        let (app, _) = test_app();
        register(&app, "bob@x.com", None).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "email": "BOB@x.com", "password": "Secret123!", "name": "Bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ALREADY_EXISTS");

        let (status, wrong_password) = send(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "bob@x.com", "password": "nope-nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, unknown_user) = send(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "nobody@x.com", "password": "nope-nope" })),
        )
        .await;
        assert_eq!(wrong_password, unknown_user);
    }

    #[tokio::test]
    async fn test_refresh_requires_token_and_rejects_bad_json() {
        let (app, _) = test_app();

        let (status, body) = send(&app, Method::POST, "/api/v1/auth/refresh", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_protected_routes_need_a_token() {
        let (app, _) = test_app();

        let (status, body) = send(&app, Method::GET, "/api/v1/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, body) = send(&app, Method::GET, "/api/v1/portfolios", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_TOKEN");

        // Role gates never run before authentication
        let (status, _) = send(&app, Method::GET, "/api/v1/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_expired_token_reports_expiry() {
        let (app, auth) = test_app();
        let session = register(&app, "carol@x.com", None).await;
        let user_id = session["user"]["id"].as_str().unwrap().parse().unwrap();

        let claims = Claims::new(user_id, "carol@x.com", Role::Trader, TokenKind::Access, Duration::minutes(-30))
            .with_issuer(Some("hedgeai-test".into()));
        let expired = auth.tokens().encode_claims(&claims).unwrap();

        let (status, body) = send(&app, Method::GET, "/api/v1/auth/me", Some(&expired), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "TOKEN_EXPIRED");
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let (app, _) = test_app();
        let session = register(&app, "dan@x.com", None).await;
        let refresh = session["refresh_token"].as_str().unwrap();

        let (status, body) = send(&app, Method::GET, "/api/v1/auth/me", Some(refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_me_logout_and_change_password() {
        let (app, _) = test_app();
        let session = register(&app, "erin@x.com", None).await;
        let access = session["access_token"].as_str().unwrap();
        let refresh = session["refresh_token"].as_str().unwrap();

        let (status, me) = send(&app, Method::GET, "/api/v1/auth/me", Some(access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["data"]["email"], "erin@x.com");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/auth/change-password",
            Some(access),
            Some(json!({ "current_password": "Secret123!", "new_password": "short" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/auth/change-password",
            Some(access),
            Some(json!({ "current_password": "Secret123!", "new_password": "Better456!" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // The password change revoked the refresh lineage
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Method::POST, "/api/v1/auth/logout", Some(access), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_role_gates() {
        let (app, _) = test_app();
        let trader = register(&app, "trader@x.com", None).await;
        let trader_token = trader["access_token"].as_str().unwrap();
        let admin = register(&app, "admin@x.com", Some("ADMIN")).await;
        let admin_token = admin["access_token"].as_str().unwrap();

        let (status, body) = send(&app, Method::GET, "/api/v1/users", Some(trader_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "INSUFFICIENT_PERMISSIONS");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/analytics/batch-risk",
            Some(trader_token),
            Some(json!({ "portfolio_ids": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Admins pass the risk-desk gate and reach validation
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/analytics/batch-risk",
            Some(admin_token),
            Some(json!({ "portfolio_ids": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, users) = send(&app, Method::GET, "/api/v1/users", Some(admin_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_admin_user_management() {
        let (app, _) = test_app();
        let admin = register(&app, "root@x.com", Some("ADMIN")).await;
        let admin_token = admin["access_token"].as_str().unwrap();
        let admin_id = admin["user"]["id"].as_str().unwrap();

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/v1/users",
            Some(admin_token),
            Some(json!({ "email": "rm@x.com", "password": "Secret123!", "name": "Risk", "role": "RISK_MANAGER" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["data"]["id"].as_str().unwrap();

        let (status, updated) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/users/{}", id),
            Some(admin_token),
            Some(json!({ "status": "SUSPENDED" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["data"]["status"], "SUSPENDED");

        // Suspended accounts cannot log in
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "rm@x.com", "password": "Secret123!" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "ACCOUNT_NOT_ACTIVE");

        let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/users/{}", admin_id), Some(admin_token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/users/{}", id), Some(admin_token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::GET, &format!("/api/v1/users/{}", id), Some(admin_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "USER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_suspension_blocks_existing_tokens() {
        let (app, _) = test_app();
        let admin = register(&app, "boss@x.com", Some("ADMIN")).await;
        let admin_token = admin["access_token"].as_str().unwrap();
        let victim = register(&app, "temp@x.com", None).await;
        let victim_token = victim["access_token"].as_str().unwrap();
        let victim_id = victim["user"]["id"].as_str().unwrap();

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/users/{}", victim_id),
            Some(admin_token),
            Some(json!({ "status": "INACTIVE" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::GET, "/api/v1/auth/me", Some(victim_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "ACCOUNT_NOT_ACTIVE");
    }

    #[tokio::test]
    async fn test_ml_health_through_stub() {
        let (app, _) = test_app();
        let analyst = register(&app, "quant@x.com", Some("ANALYST")).await;
        let token = analyst["access_token"].as_str().unwrap();

        let (status, body) = send(&app, Method::GET, "/api/v1/analytics/ml-health", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["model_loaded"], true);
        assert_eq!(body["data"]["model"]["name"], "risk-lstm");
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app();
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }
}
