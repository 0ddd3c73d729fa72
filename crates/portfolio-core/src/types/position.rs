//! Position tracking types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::trade::TradeSide;
use super::{check_amount, check_notional, check_numeric, GREEK_INTEGER_DIGITS, GREEK_SCALE};
use crate::Error;

/// Decimal places kept on average entry prices.
pub const PRICE_SCALE: u32 = 8;

/// Instrument class of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    #[default]
    Stock,
    Option,
    Future,
    Etf,
    Crypto,
}

impl AssetType {
    pub const ALL: [AssetType; 5] = [
        AssetType::Stock,
        AssetType::Option,
        AssetType::Future,
        AssetType::Etf,
        AssetType::Crypto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Stock => "STOCK",
            AssetType::Option => "OPTION",
            AssetType::Future => "FUTURE",
            AssetType::Etf => "ETF",
            AssetType::Crypto => "CRYPTO",
        }
    }
}

impl FromStr for AssetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOCK" => Ok(AssetType::Stock),
            "OPTION" => Ok(AssetType::Option),
            "FUTURE" => Ok(AssetType::Future),
            "ETF" => Ok(AssetType::Etf),
            "CRYPTO" => Ok(AssetType::Crypto),
            other => Err(Error::Decode(format!("unknown asset type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
        }
    }
}

impl FromStr for PositionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(PositionStatus::Open),
            "CLOSED" => Ok(PositionStatus::Closed),
            other => Err(Error::Decode(format!("unknown position status '{}'", other))),
        }
    }
}

/// Option sensitivities. All optional; plain equity carries none.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Option<Decimal>,
    pub gamma: Option<Decimal>,
    pub vega: Option<Decimal>,
    pub theta: Option<Decimal>,
}

impl Greeks {
    pub fn validate(&self) -> crate::Result<()> {
        let named = [
            ("Delta", self.delta),
            ("Gamma", self.gamma),
            ("Vega", self.vega),
            ("Theta", self.theta),
        ];
        for (field, value) in named {
            if let Some(value) = value {
                check_numeric(field, value, GREEK_INTEGER_DIGITS, GREEK_SCALE)
                    .map_err(Error::Validation)?;
            }
        }
        Ok(())
    }

    /// Overlay the values present in `other`.
    pub fn merge(&mut self, other: &Greeks) {
        if other.delta.is_some() {
            self.delta = other.delta;
        }
        if other.gamma.is_some() {
            self.gamma = other.gamma;
        }
        if other.vega.is_some() {
            self.vega = other.vega;
        }
        if other.theta.is_some() {
            self.theta = other.theta;
        }
    }
}

/// A holding in one symbol within a portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    /// Upper-cased ticker.
    pub symbol: String,
    pub asset_type: AssetType,
    /// Signed; negative means short.
    pub quantity: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    pub current_price: Decimal,
    #[serde(flatten)]
    pub greeks: Greeks,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Open a position from a single fill.
    pub fn from_fill(
        portfolio_id: Uuid,
        symbol: &str,
        asset_type: AssetType,
        side: TradeSide,
        quantity: Decimal,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            portfolio_id,
            symbol: normalize_symbol(symbol),
            asset_type,
            quantity: side.signed(quantity),
            entry_price: price,
            current_price: price,
            greeks: Greeks::default(),
            status: PositionStatus::Open,
            opened_at: at,
            closed_at: None,
            updated_at: at,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn market_value(&self) -> Decimal {
        self.quantity * self.current_price
    }

    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.entry_price
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        (self.current_price - self.entry_price) * self.quantity
    }

    /// Unrealized P&L relative to the absolute cost basis, in percent.
    pub fn unrealized_pnl_pct(&self) -> Decimal {
        let basis = self.cost_basis().abs();
        if basis.is_zero() {
            Decimal::ZERO
        } else {
            (self.unrealized_pnl() / basis * Decimal::ONE_HUNDRED).round_dp(4)
        }
    }

    /// Apply a trade fill.
    ///
    /// Adding to the position re-averages the entry price; reducing keeps it;
    /// crossing through zero restarts the entry at the fill price. The
    /// position closes when quantity reaches zero.
    pub fn apply_fill(&mut self, side: TradeSide, quantity: Decimal, price: Decimal, at: DateTime<Utc>) {
        let signed = side.signed(quantity);
        let new_quantity = self.quantity + signed;

        let extending = self.quantity.is_zero()
            || self.quantity.is_sign_positive() == signed.is_sign_positive();

        if extending {
            let total_cost = self.quantity.abs() * self.entry_price + quantity * price;
            self.entry_price = (total_cost / new_quantity.abs()).round_dp(PRICE_SCALE);
        } else if !new_quantity.is_zero()
            && new_quantity.is_sign_positive() != self.quantity.is_sign_positive()
        {
            self.entry_price = price;
        }

        self.quantity = new_quantity;
        self.current_price = price;
        self.updated_at = at;

        if self.quantity.is_zero() {
            self.status = PositionStatus::Closed;
            self.closed_at = Some(at);
        }
    }

    /// Mark the position closed at `exit_price`. Returns the cash released.
    pub fn close(&mut self, exit_price: Decimal, at: DateTime<Utc>) -> Decimal {
        self.current_price = exit_price;
        let proceeds = self.market_value();
        self.status = PositionStatus::Closed;
        self.closed_at = Some(at);
        self.updated_at = at;
        proceeds
    }
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Input for adding a position directly.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPosition {
    pub symbol: String,
    #[serde(default)]
    pub asset_type: AssetType,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    /// Defaults to the entry price.
    pub current_price: Option<Decimal>,
    #[serde(flatten)]
    pub greeks: Greeks,
}

impl NewPosition {
    pub fn stock(symbol: &str, quantity: Decimal, entry_price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            asset_type: AssetType::Stock,
            quantity,
            entry_price,
            current_price: None,
            greeks: Greeks::default(),
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(Error::Validation("Symbol is required".into()));
        }
        if self.quantity.is_zero() {
            return Err(Error::Validation("Quantity cannot be zero".into()));
        }
        if self.entry_price <= Decimal::ZERO {
            return Err(Error::Validation("Entry price must be positive".into()));
        }
        if self.current_price.is_some_and(|p| p <= Decimal::ZERO) {
            return Err(Error::Validation("Current price must be positive".into()));
        }
        check_amount("Quantity", self.quantity).map_err(Error::Validation)?;
        check_amount("Entry price", self.entry_price).map_err(Error::Validation)?;
        let price = self.current_price.unwrap_or(self.entry_price);
        check_amount("Current price", price).map_err(Error::Validation)?;
        check_notional(self.quantity, price).map_err(Error::Validation)?;
        self.greeks.validate()
    }

    pub fn into_position(self, portfolio_id: Uuid) -> Position {
        let now = Utc::now();
        Position {
            id: Uuid::new_v4(),
            portfolio_id,
            symbol: normalize_symbol(&self.symbol),
            asset_type: self.asset_type,
            quantity: self.quantity,
            entry_price: self.entry_price,
            current_price: self.current_price.unwrap_or(self.entry_price),
            greeks: self.greeks,
            status: PositionStatus::Open,
            opened_at: now,
            closed_at: None,
            updated_at: now,
        }
    }
}

/// Mark-to-market update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionUpdate {
    pub current_price: Option<Decimal>,
    #[serde(flatten)]
    pub greeks: Greeks,
}

impl PositionUpdate {
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(price) = self.current_price {
            if price <= Decimal::ZERO {
                return Err(Error::Validation("Current price must be positive".into()));
            }
            check_amount("Current price", price).map_err(Error::Validation)?;
        }
        self.greeks.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long(quantity: Decimal, price: Decimal) -> Position {
        Position::from_fill(
            Uuid::new_v4(),
            " aapl ",
            AssetType::Stock,
            TradeSide::Buy,
            quantity,
            price,
            Utc::now(),
        )
    }

    #[test]
    fn test_valuation() {
        let mut p = long(dec!(10), dec!(100));
        p.current_price = dec!(110);

        assert_eq!(p.symbol, "AAPL");
        assert_eq!(p.market_value(), dec!(1100));
        assert_eq!(p.unrealized_pnl(), dec!(100));
        assert_eq!(p.unrealized_pnl_pct(), dec!(10));
    }

    #[test]
    fn test_short_pnl() {
        let mut p = Position::from_fill(
            Uuid::new_v4(),
            "TSLA",
            AssetType::Stock,
            TradeSide::Sell,
            dec!(5),
            dec!(200),
            Utc::now(),
        );
        assert_eq!(p.quantity, dec!(-5));

        p.current_price = dec!(180);
        assert_eq!(p.unrealized_pnl(), dec!(100));
        assert_eq!(p.market_value(), dec!(-900));
    }

    #[test]
    fn test_adding_averages_entry() {
        let mut p = long(dec!(10), dec!(100));
        p.apply_fill(TradeSide::Buy, dec!(10), dec!(110), Utc::now());

        assert_eq!(p.quantity, dec!(20));
        assert_eq!(p.entry_price, dec!(105));
        assert_eq!(p.current_price, dec!(110));
        assert!(p.is_open());
    }

    #[test]
    fn test_reducing_keeps_entry_and_closes_at_zero() {
        let mut p = long(dec!(10), dec!(100));
        p.apply_fill(TradeSide::Sell, dec!(4), dec!(120), Utc::now());
        assert_eq!(p.quantity, dec!(6));
        assert_eq!(p.entry_price, dec!(100));

        p.apply_fill(TradeSide::Sell, dec!(6), dec!(125), Utc::now());
        assert!(p.quantity.is_zero());
        assert_eq!(p.status, PositionStatus::Closed);
        assert!(p.closed_at.is_some());
    }

    #[test]
    fn test_flip_restarts_entry() {
        let mut p = long(dec!(10), dec!(100));
        p.apply_fill(TradeSide::Sell, dec!(15), dec!(90), Utc::now());
        assert_eq!(p.quantity, dec!(-5));
        assert_eq!(p.entry_price, dec!(90));
        assert!(p.is_open());
    }

    #[test]
    fn test_close_releases_market_value() {
        let mut p = long(dec!(10), dec!(100));
        let proceeds = p.close(dec!(101.5), Utc::now());
        assert_eq!(proceeds, dec!(1015));
        assert!(!p.is_open());
    }

    #[test]
    fn test_greeks_merge() {
        let mut greeks = Greeks {
            delta: Some(dec!(0.5)),
            ..Default::default()
        };
        greeks.merge(&Greeks {
            gamma: Some(dec!(0.02)),
            ..Default::default()
        });
        assert_eq!(greeks.delta, Some(dec!(0.5)));
        assert_eq!(greeks.gamma, Some(dec!(0.02)));
    }

    #[test]
    fn test_new_position_validation() {
        assert!(NewPosition::stock("AAPL", dec!(0), dec!(1)).validate().is_err());
        assert!(NewPosition::stock("AAPL", dec!(1), dec!(0)).validate().is_err());
        assert!(NewPosition::stock("", dec!(1), dec!(1)).validate().is_err());
        assert!(NewPosition::stock("AAPL", dec!(-3), dec!(10)).validate().is_ok());
    }

    #[test]
    fn test_amount_limits() {
        let fractional = NewPosition::stock("AAPL", dec!(0.123456789012), dec!(100));
        assert!(matches!(fractional.validate(), Err(Error::Validation(_))));

        let huge = NewPosition::stock("AAPL", dec!(1), dec!(1000000000000000));
        assert!(matches!(huge.validate(), Err(Error::Validation(_))));

        let mut marked = NewPosition::stock("AAPL", dec!(10), dec!(100));
        marked.current_price = Some(dec!(10000000000000));
        assert!(marked.validate().is_err());

        let mut greeks = NewPosition::stock("SPY C", dec!(1), dec!(4));
        greeks.greeks.delta = Some(dec!(0.1234567));
        assert!(greeks.validate().is_err());

        let update = PositionUpdate {
            current_price: Some(dec!(12.123456789)),
            ..Default::default()
        };
        assert!(update.validate().is_err());
        let update = PositionUpdate {
            current_price: Some(dec!(12.12345678)),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
    }
}
