//! Portfolio analytics and the glue between stored portfolios and the ML service.

use chrono::Utc;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use serde::Serialize;
use uuid::Uuid;

use crate::api::ml::{
    HedgeRecommendation, HedgeRequest, MlPortfolioData, MlPosition, RiskModel, RiskPrediction,
    RiskRequest,
};
use crate::types::{
    open_market_value, AlertSeverity, AlertType, AssetType, NewAlert, Portfolio, Position,
    RiskMetrics,
};
use crate::{Error, Result};

/// Risk score above which a CRITICAL alert is raised.
pub const CRITICAL_RISK_SCORE: u32 = 80;
/// Risk score above which a WARNING alert is raised.
pub const WARNING_RISK_SCORE: u32 = 65;

const METRIC_SCALE: u32 = 6;

/// Market value held in one asset class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetExposure {
    pub asset_type: AssetType,
    /// Gross (absolute) market value.
    pub market_value: Decimal,
    /// Share of gross exposure, in percent.
    pub weight_pct: Decimal,
}

/// Valuation summary of a portfolio.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub portfolio_id: Uuid,
    pub total_value: Decimal,
    pub cash_balance: Decimal,
    pub invested_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub open_positions: usize,
    pub exposure: Vec<AssetExposure>,
    pub risk: Option<RiskMetrics>,
}

pub fn summarize(portfolio: &Portfolio, positions: &[Position]) -> PortfolioSummary {
    let open: Vec<&Position> = positions.iter().filter(|p| p.is_open()).collect();
    let invested_value = open_market_value(positions);
    let unrealized_pnl = open.iter().map(|p| p.unrealized_pnl()).sum();

    let gross: Decimal = open.iter().map(|p| p.market_value().abs()).sum();
    let exposure = AssetType::ALL
        .iter()
        .filter_map(|asset_type| {
            let market_value: Decimal = open
                .iter()
                .filter(|p| p.asset_type == *asset_type)
                .map(|p| p.market_value().abs())
                .sum();
            if market_value.is_zero() {
                return None;
            }
            Some(AssetExposure {
                asset_type: *asset_type,
                market_value,
                weight_pct: (market_value / gross * Decimal::ONE_HUNDRED).round_dp(2),
            })
        })
        .collect();

    PortfolioSummary {
        portfolio_id: portfolio.id,
        total_value: portfolio.cash_balance + invested_value,
        cash_balance: portfolio.cash_balance,
        invested_value,
        unrealized_pnl,
        open_positions: open.len(),
        exposure,
        risk: portfolio.risk.clone(),
    }
}

fn to_wire(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

fn from_wire(field: &str, value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(METRIC_SCALE, RoundingStrategy::MidpointNearestEven))
        .ok_or_else(|| Error::MlService {
            message: format!("ML service returned a non-finite {}", field),
            status: None,
        })
}

/// Build the scoring request for a portfolio.
///
/// The service refuses empty portfolios and non-positive totals, so those are
/// rejected here before any network call.
pub fn risk_request(portfolio: &Portfolio, positions: &[Position]) -> Result<RiskRequest> {
    let positions: Vec<MlPosition> = positions
        .iter()
        .filter(|p| p.is_open())
        .map(|p| MlPosition {
            symbol: p.symbol.clone(),
            quantity: to_wire(p.quantity),
            price: to_wire(p.current_price),
            delta: p.greeks.delta.map(to_wire),
            gamma: p.greeks.gamma.map(to_wire),
            vega: p.greeks.vega.map(to_wire),
            theta: p.greeks.theta.map(to_wire),
        })
        .collect();

    if positions.is_empty() {
        return Err(Error::Validation(
            "Portfolio needs at least one open position to be scored".into(),
        ));
    }
    if portfolio.total_value <= Decimal::ZERO {
        return Err(Error::Validation(
            "Portfolio total value must be positive to be scored".into(),
        ));
    }

    Ok(RiskRequest {
        portfolio_id: portfolio.id.to_string(),
        portfolio_data: MlPortfolioData {
            total_value: to_wire(portfolio.total_value),
            positions,
            historical_returns: None,
        },
    })
}

pub fn metrics_from_prediction(prediction: &RiskPrediction) -> Result<RiskMetrics> {
    Ok(RiskMetrics {
        risk_score: from_wire("riskScore", prediction.risk_score)?,
        volatility: from_wire("volatility", prediction.volatility)?,
        var_95: from_wire("var95", prediction.var_95)?,
        var_99: from_wire("var99", prediction.var_99)?,
        sharpe_ratio: from_wire("sharpeRatio", prediction.sharpe_ratio)?,
        scored_at: Utc::now(),
    })
}

/// Severity warranted by a risk score, if any.
pub fn severity_for(risk_score: Decimal) -> Option<AlertSeverity> {
    if risk_score > Decimal::from(CRITICAL_RISK_SCORE) {
        Some(AlertSeverity::Critical)
    } else if risk_score > Decimal::from(WARNING_RISK_SCORE) {
        Some(AlertSeverity::Warning)
    } else {
        None
    }
}

/// Alert to raise for a freshly scored portfolio.
pub fn alert_for(portfolio: &Portfolio, metrics: &RiskMetrics, recommendation: &str) -> Option<NewAlert> {
    let severity = severity_for(metrics.risk_score)?;
    Some(NewAlert {
        user_id: portfolio.user_id,
        portfolio_id: Some(portfolio.id),
        alert_type: AlertType::RiskThreshold,
        severity,
        title: format!("Risk score {} on {}", metrics.risk_score.normalize(), portfolio.name),
        message: recommendation.to_string(),
    })
}

/// Outcome of scoring one portfolio.
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub prediction: RiskPrediction,
    pub metrics: RiskMetrics,
    pub alert: Option<NewAlert>,
}

/// Score a portfolio. Persisting the result is left to the caller.
pub async fn assess_portfolio(
    model: &dyn RiskModel,
    portfolio: &Portfolio,
    positions: &[Position],
) -> Result<RiskAssessment> {
    let request = risk_request(portfolio, positions)?;
    let prediction = model.predict_risk(&request).await?;
    let metrics = metrics_from_prediction(&prediction)?;
    let alert = alert_for(portfolio, &metrics, &prediction.recommendation);

    if let Some(alert) = &alert {
        tracing::info!(
            portfolio_id = %portfolio.id,
            risk_score = %metrics.risk_score,
            severity = alert.severity.as_str(),
            "Risk threshold breached"
        );
    }

    Ok(RiskAssessment {
        prediction,
        metrics,
        alert,
    })
}

/// Share-equivalent delta of the open book.
///
/// Positions without a recorded delta count one-for-one, except options,
/// which contribute nothing until a delta is supplied.
pub fn aggregate_delta(positions: &[Position]) -> Decimal {
    positions
        .iter()
        .filter(|p| p.is_open())
        .map(|p| {
            let delta = p.greeks.delta.unwrap_or(match p.asset_type {
                AssetType::Option => Decimal::ZERO,
                AssetType::Stock | AssetType::Future | AssetType::Etf | AssetType::Crypto => {
                    Decimal::ONE
                }
            });
            p.quantity * delta
        })
        .sum()
}

pub async fn recommend_hedge(
    model: &dyn RiskModel,
    portfolio: &Portfolio,
    positions: &[Position],
) -> Result<HedgeRecommendation> {
    let request = HedgeRequest {
        delta: to_wire(aggregate_delta(positions)),
        total_value: to_wire(portfolio.total_value),
    };
    model.recommend_hedge(&request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ml::MockRiskModel;
    use crate::types::{NewPosition, TradeSide};
    use rust_decimal_macros::dec;

    fn book() -> (Portfolio, Vec<Position>) {
        let mut portfolio = Portfolio::new(Uuid::new_v4(), "Growth".into(), None, dec!(5000));
        let mut option = NewPosition::stock("SPY240621C500", dec!(2), dec!(10)).into_position(portfolio.id);
        option.asset_type = AssetType::Option;
        let positions = vec![
            NewPosition::stock("AAPL", dec!(10), dec!(150)).into_position(portfolio.id),
            Position::from_fill(
                portfolio.id,
                "BTC",
                AssetType::Crypto,
                TradeSide::Sell,
                dec!(0.1),
                dec!(30000),
                Utc::now(),
            ),
            option,
        ];
        portfolio.revalue(&positions);
        (portfolio, positions)
    }

    fn prediction(risk_score: f64) -> RiskPrediction {
        RiskPrediction {
            risk_score,
            volatility: 0.25,
            var_95: 1200.0,
            var_99: 1800.0,
            sharpe_ratio: 1.3,
            recommendation: "Reduce crypto exposure".into(),
            confidence: 0.9,
            timestamp: "2024-01-01T00:00:00".into(),
        }
    }

    #[test]
    fn test_summary_exposure() {
        let (portfolio, positions) = book();
        let summary = summarize(&portfolio, &positions);

        assert_eq!(summary.invested_value, dec!(-1480));
        assert_eq!(summary.total_value, dec!(3520));
        assert_eq!(summary.open_positions, 3);
        assert_eq!(summary.exposure.len(), 3);
        let crypto = summary
            .exposure
            .iter()
            .find(|e| e.asset_type == AssetType::Crypto)
            .unwrap();
        assert_eq!(crypto.market_value, dec!(3000));
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(severity_for(dec!(81)), Some(AlertSeverity::Critical));
        assert_eq!(severity_for(dec!(80)), Some(AlertSeverity::Warning));
        assert_eq!(severity_for(dec!(66)), Some(AlertSeverity::Warning));
        assert_eq!(severity_for(dec!(65)), None);
    }

    #[test]
    fn test_empty_portfolio_is_not_scored() {
        let portfolio = Portfolio::new(Uuid::new_v4(), "Cash".into(), None, dec!(100));
        assert!(matches!(risk_request(&portfolio, &[]), Err(Error::Validation(_))));
    }

    #[test]
    fn test_aggregate_delta_defaults() {
        let (_, mut positions) = book();
        assert_eq!(aggregate_delta(&positions), dec!(9.9));

        positions[2].greeks.delta = Some(dec!(0.5));
        assert_eq!(aggregate_delta(&positions), dec!(10.9));
    }

    #[tokio::test]
    async fn test_assessment_raises_critical_alert() {
        let (portfolio, positions) = book();
        let mut model = MockRiskModel::new();
        model
            .expect_predict_risk()
            .withf(|req: &RiskRequest| req.portfolio_data.positions.len() == 3)
            .times(1)
            .returning(|_| Ok(prediction(85.0)));

        let assessment = assess_portfolio(&model, &portfolio, &positions).await.unwrap();
        assert_eq!(assessment.metrics.risk_score, dec!(85));
        let alert = assessment.alert.unwrap();
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.user_id, portfolio.user_id);
        assert_eq!(alert.message, "Reduce crypto exposure");
    }

    #[tokio::test]
    async fn test_low_risk_raises_nothing() {
        let (portfolio, positions) = book();
        let mut model = MockRiskModel::new();
        model
            .expect_predict_risk()
            .returning(|_| Ok(prediction(40.0)));

        let assessment = assess_portfolio(&model, &portfolio, &positions).await.unwrap();
        assert!(assessment.alert.is_none());
    }

    #[tokio::test]
    async fn test_service_failure_propagates() {
        let (portfolio, positions) = book();
        let mut model = MockRiskModel::new();
        model.expect_predict_risk().returning(|_| {
            Err(Error::MlService {
                message: "boom".into(),
                status: Some(500),
            })
        });

        let err = assess_portfolio(&model, &portfolio, &positions).await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_hedge_request_uses_book_delta() {
        let (portfolio, positions) = book();
        let mut model = MockRiskModel::new();
        model
            .expect_recommend_hedge()
            .withf(|req: &HedgeRequest| (req.delta - 9.9).abs() < 1e-9)
            .returning(|_| {
                Ok(HedgeRecommendation {
                    action: "HOLD".into(),
                    contracts: 0,
                    strategy: "No Action Required".into(),
                    expected_reduction: 0.0,
                })
            });

        let hedge = recommend_hedge(&model, &portfolio, &positions).await.unwrap();
        assert_eq!(hedge.action, "HOLD");
    }
}
