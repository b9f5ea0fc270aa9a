//! Fixed-point token amounts.
//!
//! Amounts are `BigDecimal`s limited to [`AMOUNT_PRECISION`] total digits of
//! which at most [`AMOUNT_SCALE`] are fractional. They are persisted as
//! decimal text at exactly that scale and summed in decimal arithmetic.

use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};

use crate::error::LedgerError;

/// Total significant digits an amount may carry.
pub const AMOUNT_PRECISION: i64 = 64;
/// Fractional digits an amount may carry.
pub const AMOUNT_SCALE: i64 = 18;

/// Reject amounts that do not fit the fixed-point column.
pub fn check_fits(field: &str, amount: &BigDecimal) -> Result<(), LedgerError> {
    let normalized = amount.normalized();
    let (_, scale) = normalized.as_bigint_and_exponent();
    if scale > AMOUNT_SCALE {
        return Err(LedgerError::validation(
            field,
            format!("more than {AMOUNT_SCALE} fractional digits"),
        ));
    }
    let integer_digits = normalized.digits() as i64 - scale;
    if integer_digits > AMOUNT_PRECISION - AMOUNT_SCALE {
        return Err(LedgerError::validation(
            field,
            format!("more than {} integer digits", AMOUNT_PRECISION - AMOUNT_SCALE),
        ));
    }
    Ok(())
}

/// Non-negative and representable.
pub fn check_non_negative(field: &str, amount: &BigDecimal) -> Result<(), LedgerError> {
    if *amount < BigDecimal::zero() {
        return Err(LedgerError::validation(field, "must not be negative"));
    }
    check_fits(field, amount)
}

/// Strictly positive and representable.
pub fn check_nonzero(field: &str, amount: &BigDecimal) -> Result<(), LedgerError> {
    if amount.is_zero() {
        return Err(LedgerError::validation(field, "must be nonzero"));
    }
    check_non_negative(field, amount)
}

/// Column text for an amount, always at [`AMOUNT_SCALE`].
pub fn to_fixed(amount: &BigDecimal) -> String {
    amount.with_scale(AMOUNT_SCALE).to_plain_string()
}

/// Parse column text written by [`to_fixed`].
pub fn parse_fixed(column: &str, text: &str) -> Result<BigDecimal, LedgerError> {
    BigDecimal::from_str(text).map_err(|e| LedgerError::Schema {
        relation: column.to_string(),
        reason: format!("stored amount '{text}' is not a decimal: {e}"),
    })
}
