//! Conversions between the plain numbers crossing the service boundary and
//! the `Decimal` representation every monetary field is stored as, plus the
//! weighted-average costing math shared by the ledger.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::errors::ServiceError;

/// Converts a boundary `f64` into a non-negative monetary `Decimal`.
/// Non-finite and negative values are rejected with the offending field name.
pub fn ensure_money(value: f64, field: &str) -> Result<Decimal, ServiceError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ServiceError::InvalidInput(format!(
            "{} must be zero or higher",
            field
        )));
    }
    Decimal::from_f64(value)
        .ok_or_else(|| ServiceError::InvalidInput(format!("{} is not representable", field)))
}

/// Boundary conversion back to a plain number for response payloads.
pub fn to_f64(value: &Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Rejects quantities that are not strictly positive.
pub fn ensure_positive_qty(qty: i32, field: &str) -> Result<(), ServiceError> {
    if qty <= 0 {
        return Err(ServiceError::InvalidInput(format!(
            "{} must be a positive integer",
            field
        )));
    }
    Ok(())
}

/// Recomputes the weighted-average unit cost after receiving `qty` units at
/// `unit_cost` on top of `current_qty` units carried at `current_avg`.
/// A resulting total of zero units resets the average to zero.
pub fn weighted_average_cost(
    current_avg: Decimal,
    current_qty: i32,
    unit_cost: Decimal,
    qty: i32,
) -> Decimal {
    let new_qty = current_qty + qty;
    if new_qty == 0 {
        return Decimal::ZERO;
    }
    (current_avg * Decimal::from(current_qty) + unit_cost * Decimal::from(qty))
        / Decimal::from(new_qty)
}
