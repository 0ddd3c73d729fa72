//! Integration tests for component interactions.
//!
//! These tests verify that the auth core, the role gate and the portfolio
//! domain work together correctly without a database.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use auth::{
    AccountStatus, AuthError, AuthService, JwtAuth, JwtConfig, MemoryUserStore, NewUser,
    PasswordConfig, PasswordHasher, Role, RouteAccess, TokenConfig, UserUpdate,
};
use portfolio_core::analytics;
use portfolio_core::api::ml::{
    HedgeRecommendation, HedgeRequest, MlHealth, ModelInfo, RiskPrediction, RiskRequest,
};
use portfolio_core::api::RiskModel;
use portfolio_core::types::{
    AlertSeverity, AssetType, Greeks, NewPosition, Portfolio, Position, PositionStatus, TradeSide,
};

fn auth_service() -> AuthService {
    let jwt = JwtConfig {
        access: TokenConfig {
            secret: "integration-access".into(),
            ttl: Duration::minutes(15),
        },
        refresh: TokenConfig {
            secret: "integration-refresh".into(),
            ttl: Duration::days(7),
        },
        issuer: Some("hedgeai-test".into()),
    };
    AuthService::new(
        Arc::new(MemoryUserStore::new()),
        JwtAuth::new(jwt),
        PasswordHasher::new(PasswordConfig::minimal()).unwrap(),
    )
}

fn new_user(email: &str, role: Option<Role>) -> NewUser {
    NewUser {
        email: email.to_string(),
        password: "Secret123!".to_string(),
        name: "Desk User".to_string(),
        role,
    }
}

/// Fixed-answer scoring model.
struct FixedModel {
    risk_score: f64,
}

#[async_trait]
impl RiskModel for FixedModel {
    async fn predict_risk(&self, _: &RiskRequest) -> portfolio_core::Result<RiskPrediction> {
        Ok(RiskPrediction {
            risk_score: self.risk_score,
            volatility: 0.35,
            var_95: 1200.0,
            var_99: 1800.0,
            sharpe_ratio: 0.4,
            recommendation: "Reduce exposure".to_string(),
            confidence: 0.8,
            timestamp: Utc::now().to_rfc3339(),
        })
    }

    async fn recommend_hedge(&self, request: &HedgeRequest) -> portfolio_core::Result<HedgeRecommendation> {
        let contracts = (request.delta / 100.0).round() as i64;
        Ok(HedgeRecommendation {
            action: if contracts > 0 { "SELL" } else { "HOLD" }.to_string(),
            contracts,
            strategy: "Delta Hedge".to_string(),
            expected_reduction: 0.9,
        })
    }

    async fn batch_predict(&self, requests: &[RiskRequest]) -> portfolio_core::Result<Vec<RiskPrediction>> {
        let mut out = Vec::with_capacity(requests.len());
        for request in requests {
            out.push(self.predict_risk(request).await?);
        }
        Ok(out)
    }

    async fn health(&self) -> portfolio_core::Result<MlHealth> {
        Ok(MlHealth {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            model_loaded: true,
        })
    }

    async fn model_info(&self) -> portfolio_core::Result<ModelInfo> {
        Ok(ModelInfo {
            name: "fixed".to_string(),
            version: "0".to_string(),
            trained_at: "never".to_string(),
            performance_metrics: Default::default(),
        })
    }
}

/// Session lifecycle: register, authenticate, rotate, logout.
#[tokio::test]
async fn test_session_lifecycle() {
    let service = auth_service();

    let session = service.register(new_user("Desk@Example.com ", None)).await.unwrap();
    assert_eq!(session.user.email, "desk@example.com");
    assert_eq!(session.user.role, Role::Trader);

    let user = service.authenticate(&session.access_token).await.unwrap();
    assert_eq!(user.id, session.user.id);

    let rotated = service.refresh(&session.refresh_token).await.unwrap();
    assert!(matches!(
        service.refresh(&session.refresh_token).await,
        Err(AuthError::InvalidRefreshToken)
    ));

    service.logout(user.id).await.unwrap();
    assert!(matches!(
        service.refresh(&rotated.refresh_token).await,
        Err(AuthError::InvalidRefreshToken)
    ));

    // Access tokens stay valid until expiry
    assert!(service.authenticate(&rotated.access_token).await.is_ok());
}

/// Every role against every route class.
#[test]
fn test_role_gate_matrix() {
    let cases = [
        (Role::Trader, [true, false, false]),
        (Role::Analyst, [true, false, false]),
        (Role::RiskManager, [true, true, false]),
        (Role::Admin, [true, true, true]),
    ];
    let classes = [RouteAccess::Authenticated, RouteAccess::RiskDesk, RouteAccess::Admin];

    for (role, expected) in cases {
        for (access, allowed) in classes.iter().zip(expected) {
            assert_eq!(
                access.authorize(role).is_ok(),
                allowed,
                "{:?} on {:?}",
                role,
                access
            );
        }
    }
    assert!(Role::Admin.can_read_all());
    assert!(!Role::RiskManager.can_read_all());
}

/// Suspending an account cuts off its live tokens and its refresh lineage.
#[tokio::test]
async fn test_suspension_revokes_access() {
    let service = auth_service();
    let admin = service.register(new_user("admin@example.com", Some(Role::Admin))).await.unwrap();
    let trader = service.register(new_user("trader@example.com", None)).await.unwrap();

    let update = UserUpdate {
        status: Some(AccountStatus::Suspended),
        ..Default::default()
    };
    let view = service
        .update_user(admin.user.id, trader.user.id, update)
        .await
        .unwrap();
    assert_eq!(view.status, AccountStatus::Suspended);

    assert!(matches!(
        service.authenticate(&trader.access_token).await,
        Err(AuthError::AccountNotActive)
    ));
    assert!(service.refresh(&trader.refresh_token).await.is_err());
    assert!(matches!(
        service.login("trader@example.com", "Secret123!").await,
        Err(AuthError::AccountNotActive)
    ));
}

/// Trades flow into positions and the valuation summary.
#[test]
fn test_fills_drive_valuation() {
    let owner = Uuid::new_v4();
    let mut portfolio = Portfolio::new(owner, "Core".to_string(), None, dec!(10000));
    let now = Utc::now();

    let mut aapl = Position::from_fill(
        portfolio.id,
        " aapl ",
        AssetType::Stock,
        TradeSide::Buy,
        dec!(10),
        dec!(100),
        now,
    );
    aapl.apply_fill(TradeSide::Buy, dec!(10), dec!(110), now);
    assert_eq!(aapl.symbol, "AAPL");
    assert_eq!(aapl.quantity, dec!(20));
    assert_eq!(aapl.entry_price, dec!(105));

    aapl.apply_fill(TradeSide::Sell, dec!(5), dec!(120), now);
    assert_eq!(aapl.quantity, dec!(15));
    assert_eq!(aapl.entry_price, dec!(105));
    assert_eq!(aapl.unrealized_pnl(), dec!(225));

    let mut option = NewPosition::stock("SPY240621C500", dec!(2), dec!(5)).into_position(portfolio.id);
    option.asset_type = AssetType::Option;

    // Cash after two buys and one sell
    portfolio.cash_balance = dec!(10000) - dec!(1000) - dec!(1100) + dec!(600) - dec!(10);
    let positions = vec![aapl, option];
    portfolio.revalue(&positions);

    let summary = analytics::summarize(&portfolio, &positions);
    assert_eq!(summary.open_positions, 2);
    assert_eq!(summary.invested_value, dec!(1810));
    assert_eq!(summary.total_value, portfolio.total_value);
    assert_eq!(summary.total_value, dec!(10300));
    assert_eq!(summary.exposure.len(), 2);

    // Option without a delta adds nothing to the hedge book
    assert_eq!(analytics::aggregate_delta(&positions), dec!(15));
}

/// Flattening a position closes it.
#[test]
fn test_round_trip_closes_position() {
    let now = Utc::now();
    let mut position = Position::from_fill(
        Uuid::new_v4(),
        "MSFT",
        AssetType::Stock,
        TradeSide::Sell,
        dec!(4),
        dec!(400),
        now,
    );
    assert_eq!(position.quantity, dec!(-4));

    position.apply_fill(TradeSide::Buy, dec!(4), dec!(390), now);
    assert_eq!(position.status, PositionStatus::Closed);
    assert!(position.closed_at.is_some());
}

/// High scores raise a critical alert for the owner.
#[tokio::test]
async fn test_risk_assessment_raises_alert() {
    let owner = Uuid::new_v4();
    let portfolio = Portfolio::new(owner, "Levered".to_string(), None, dec!(5000));
    let mut position = NewPosition::stock("TSLA", dec!(50), dec!(200)).into_position(portfolio.id);
    position.greeks = Greeks {
        delta: Some(dec!(1)),
        ..Default::default()
    };
    let positions = vec![position];

    let model = FixedModel { risk_score: 87.5 };
    let assessment = analytics::assess_portfolio(&model, &portfolio, &positions)
        .await
        .unwrap();

    assert_eq!(assessment.metrics.risk_score, dec!(87.5));
    let alert = assessment.alert.expect("critical alert");
    assert_eq!(alert.severity, AlertSeverity::Critical);
    assert_eq!(alert.user_id, owner);
    assert_eq!(alert.portfolio_id, Some(portfolio.id));

    let calm = FixedModel { risk_score: 20.0 };
    let assessment = analytics::assess_portfolio(&calm, &portfolio, &positions)
        .await
        .unwrap();
    assert!(assessment.alert.is_none());
}

/// Empty portfolios never reach the model.
#[tokio::test]
async fn test_empty_portfolio_is_not_scored() {
    let portfolio = Portfolio::new(Uuid::new_v4(), "Cash".to_string(), None, dec!(1000));
    let model = FixedModel { risk_score: 50.0 };

    let result = analytics::assess_portfolio(&model, &portfolio, &[]).await;
    assert!(matches!(result, Err(portfolio_core::Error::Validation(_))));
}

#[tokio::test]
async fn test_hedge_uses_aggregate_delta() {
    let portfolio = Portfolio::new(Uuid::new_v4(), "Hedge".to_string(), None, dec!(0));
    let mut calls = NewPosition::stock("SPY C", dec!(10), dec!(4)).into_position(portfolio.id);
    calls.asset_type = AssetType::Option;
    calls.greeks.delta = Some(dec!(55));
    let positions = vec![calls];

    let model = FixedModel { risk_score: 0.0 };
    let hedge = analytics::recommend_hedge(&model, &portfolio, &positions)
        .await
        .unwrap();

    assert_eq!(hedge.action, "SELL");
    assert_eq!(hedge.contracts, 6);
    assert_eq!(analytics::aggregate_delta(&positions), Decimal::from(550));
}
