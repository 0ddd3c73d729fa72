//! Core domain types for the risk desk.

pub mod alert;
pub mod portfolio;
pub mod position;
pub mod trade;

pub use alert::*;
pub use portfolio::*;
pub use position::*;
pub use trade::*;

use rust_decimal::Decimal;

/// Column shape of stored amounts: `NUMERIC(20, 8)`.
pub const AMOUNT_INTEGER_DIGITS: u32 = 12;
pub const AMOUNT_SCALE: u32 = 8;

/// Column shape of stored greeks: `NUMERIC(12, 6)`.
pub const GREEK_INTEGER_DIGITS: u32 = 6;
pub const GREEK_SCALE: u32 = 6;

/// Check that `value` fits a `NUMERIC` column with the given shape.
///
/// Trailing zeros do not count against the scale.
pub fn check_numeric(
    field: &str,
    value: Decimal,
    integer_digits: u32,
    scale: u32,
) -> Result<(), String> {
    if value.normalize().scale() > scale {
        return Err(format!("{} allows at most {} decimal places", field, scale));
    }
    if value.abs() >= Decimal::from(10u64.pow(integer_digits)) {
        return Err(format!("{} is out of range", field));
    }
    Ok(())
}

pub fn check_amount(field: &str, value: Decimal) -> Result<(), String> {
    check_numeric(field, value, AMOUNT_INTEGER_DIGITS, AMOUNT_SCALE)
}

/// Check that `quantity * price` still fits an amount column.
pub fn check_notional(quantity: Decimal, price: Decimal) -> Result<(), String> {
    let limit = Decimal::from(10u64.pow(AMOUNT_INTEGER_DIGITS));
    match quantity.checked_mul(price) {
        Some(notional) if notional.abs() < limit => Ok(()),
        _ => Err("Notional value is out of range".to_string()),
    }
}
