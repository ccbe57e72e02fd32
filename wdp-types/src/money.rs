//! Decimal amount parsing and base-unit conversion (spec §4.1 `parseUnits`).

use alloy_primitives::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::Zero;
use std::str::FromStr;

/// Errors raised while validating a withdrawal amount (spec §4.1).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid amount")]
    InvalidFormat,
    #[error("Amount must be positive")]
    NotPositive,
    #[error("Amount has more fractional digits than token decimals ({decimals})")]
    TooPrecise { decimals: u8 },
    #[error("Amount overflows base units")]
    Overflow,
}

/// An amount expressed in a token's smallest unit (e.g. wei).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseUnits(pub U256);

/// Parses a positive decimal string into base units for a token with the
/// given number of decimals, mirroring ethers.js `parseUnits`.
///
/// Fails if the amount is not positive, is malformed, has more fractional
/// digits than the token supports, or overflows `U256` (spec §4.1: "amount
/// is a positive decimal with <= token.decimals fractional digits").
pub fn parse_units(amount: &str, decimals: u8) -> Result<BaseUnits, AmountError> {
    let decimal = Decimal::from_str(amount.trim()).map_err(|_| AmountError::InvalidFormat)?;
    if decimal.is_sign_negative() || decimal.is_zero() {
        return Err(AmountError::NotPositive);
    }
    if decimal.scale() > u32::from(decimals) {
        return Err(AmountError::TooPrecise { decimals });
    }
    let scaled = decimal
        .checked_mul(Decimal::from(10u64.pow(u32::from(decimals))))
        .ok_or(AmountError::Overflow)?
        .trunc();
    let as_str = scaled.to_string();
    let value = U256::from_str(&as_str).map_err(|_| AmountError::Overflow)?;
    Ok(BaseUnits(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_native_amount() {
        let units = parse_units("0.5", 18).unwrap();
        assert_eq!(units.0, U256::from(500_000_000_000_000_000u128));
    }

    #[test]
    fn rejects_non_decimal() {
        assert_eq!(parse_units("invalid", 18), Err(AmountError::InvalidFormat));
    }

    #[test]
    fn rejects_negative_and_zero() {
        assert_eq!(parse_units("-1", 6), Err(AmountError::NotPositive));
        assert_eq!(parse_units("0", 6), Err(AmountError::NotPositive));
    }

    #[test]
    fn rejects_excess_precision() {
        assert_eq!(
            parse_units("1.1234567", 6),
            Err(AmountError::TooPrecise { decimals: 6 })
        );
    }
}
