//! Trade execution records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::position::{normalize_symbol, AssetType};
use super::{check_amount, check_notional};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// Quantity with the sign this side applies to a position.
    pub fn signed(&self, quantity: Decimal) -> Decimal {
        match self {
            TradeSide::Buy => quantity,
            TradeSide::Sell => -quantity,
        }
    }
}

impl FromStr for TradeSide {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(Error::Decode(format!("unknown trade side '{}'", other))),
        }
    }
}

/// An executed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    /// User who recorded the trade.
    pub user_id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub notes: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    pub fn gross(&self) -> Decimal {
        self.quantity * self.price
    }

    /// Signed change to the portfolio's cash balance.
    pub fn cash_impact(&self) -> Decimal {
        match self.side {
            TradeSide::Buy => -(self.gross() + self.commission),
            TradeSide::Sell => self.gross() - self.commission,
        }
    }
}

/// Input for recording a trade.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTrade {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Option<Decimal>,
    pub notes: Option<String>,
    /// Used only when the trade opens a new position.
    pub asset_type: Option<AssetType>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl NewTrade {
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(Error::InvalidTrade("symbol is required".into()));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(Error::InvalidTrade("quantity must be positive".into()));
        }
        if self.price <= Decimal::ZERO {
            return Err(Error::InvalidTrade("price must be positive".into()));
        }
        if self.commission.is_some_and(|c| c.is_sign_negative()) {
            return Err(Error::InvalidTrade("commission cannot be negative".into()));
        }
        check_amount("quantity", self.quantity).map_err(Error::InvalidTrade)?;
        check_amount("price", self.price).map_err(Error::InvalidTrade)?;
        if let Some(commission) = self.commission {
            check_amount("commission", commission).map_err(Error::InvalidTrade)?;
        }
        check_notional(self.quantity, self.price).map_err(Error::InvalidTrade)?;
        Ok(())
    }

    pub fn into_trade(self, portfolio_id: Uuid, user_id: Uuid) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            portfolio_id,
            user_id,
            symbol: normalize_symbol(&self.symbol),
            side: self.side,
            quantity: self.quantity,
            price: self.price,
            commission: self.commission.unwrap_or(Decimal::ZERO),
            notes: self.notes,
            executed_at: self.executed_at.unwrap_or_else(Utc::now),
        }
    }
}
