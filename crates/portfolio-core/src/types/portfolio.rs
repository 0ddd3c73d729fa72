//! Portfolio types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::check_amount;
use super::position::Position;
use crate::Error;

/// Portfolio lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortfolioStatus {
    #[default]
    Active,
    Archived,
}

impl PortfolioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortfolioStatus::Active => "ACTIVE",
            PortfolioStatus::Archived => "ARCHIVED",
        }
    }
}

impl FromStr for PortfolioStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(PortfolioStatus::Active),
            "ARCHIVED" => Ok(PortfolioStatus::Archived),
            other => Err(Error::Decode(format!("unknown portfolio status '{}'", other))),
        }
    }
}

/// Latest risk metrics produced by the scoring service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// 0..=100, higher is riskier.
    pub risk_score: Decimal,
    pub volatility: Decimal,
    pub var_95: Decimal,
    pub var_99: Decimal,
    pub sharpe_ratio: Decimal,
    pub scored_at: DateTime<Utc>,
}

/// A user-owned collection of positions and cash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub cash_balance: Decimal,
    /// Cash plus the market value of open positions.
    pub total_value: Decimal,
    pub status: PortfolioStatus,
    pub risk: Option<RiskMetrics>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    /// Create an empty portfolio holding only cash.
    pub fn new(user_id: Uuid, name: String, description: Option<String>, cash_balance: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            description,
            cash_balance,
            total_value: cash_balance,
            status: PortfolioStatus::Active,
            risk: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    /// Recompute `total_value` from cash and the given positions.
    pub fn revalue(&mut self, positions: &[Position]) {
        self.total_value = self.cash_balance + open_market_value(positions);
    }
}

/// Sum of market values over open positions.
pub fn open_market_value(positions: &[Position]) -> Decimal {
    positions
        .iter()
        .filter(|p| p.is_open())
        .map(Position::market_value)
        .sum()
}

/// Input for creating a portfolio.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPortfolio {
    pub name: String,
    pub description: Option<String>,
    pub cash_balance: Option<Decimal>,
}

impl NewPortfolio {
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Portfolio name is required".into()));
        }
        if let Some(cash) = self.cash_balance {
            if cash.is_sign_negative() {
                return Err(Error::Validation("Cash balance cannot be negative".into()));
            }
            check_amount("Cash balance", cash).map_err(Error::Validation)?;
        }
        Ok(())
    }

    pub fn into_portfolio(self, user_id: Uuid) -> Portfolio {
        Portfolio::new(
            user_id,
            self.name.trim().to_string(),
            self.description,
            self.cash_balance.unwrap_or(Decimal::ZERO),
        )
    }
}

/// Partial update of a portfolio.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortfolioUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cash_balance: Option<Decimal>,
    pub status: Option<PortfolioStatus>,
}

impl PortfolioUpdate {
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::Validation("Portfolio name cannot be empty".into()));
        }
        if let Some(cash) = self.cash_balance {
            if cash.is_sign_negative() {
                return Err(Error::Validation("Cash balance cannot be negative".into()));
            }
            check_amount("Cash balance", cash).map_err(Error::Validation)?;
        }
        Ok(())
    }
}
