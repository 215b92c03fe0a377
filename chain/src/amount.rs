//! Raw token units ↔ fixed-point decimal amounts.
//!
//! On-chain values stay `U256` until the very end; only the final sum is
//! turned into a [`Decimal`] for comparison against the claimed amount.

use alloy_primitives::U256;
use rust_decimal::Decimal;

/// Largest mantissa a `Decimal` can hold (96 bits).
const MAX_MANTISSA: u128 = (1u128 << 96) - 1;

/// Largest scale a `Decimal` can hold.
const MAX_SCALE: u32 = 28;

/// Convert `raw` token units to a decimal amount with `decimals` fractional digits.
///
/// When the raw value does not fit the decimal mantissa the lowest digits are
/// truncated (the scale shrinks), so the result can only be slightly *below*
/// the exact amount. Values beyond the decimal range saturate at
/// [`Decimal::MAX`].
pub fn raw_to_decimal(raw: U256, decimals: u32) -> Decimal {
    let max_mantissa = U256::from(MAX_MANTISSA);
    let ten = U256::from(10u8);

    let mut value = raw;
    let mut scale = decimals;
    while scale > 0 && (scale > MAX_SCALE || value > max_mantissa) {
        value /= ten;
        scale -= 1;
    }
    if value > max_mantissa {
        return Decimal::MAX;
    }

    let mantissa = value.to::<u128>() as i128;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map(|d| d.normalize())
        .unwrap_or(Decimal::MAX)
}

/// Convert a non-negative decimal amount to raw token units.
///
/// Digits finer than `decimals` are truncated. Returns `None` for negative
/// amounts.
pub fn decimal_to_raw(amount: Decimal, decimals: u32) -> Option<U256> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return None;
    }
    let mantissa = U256::from(amount.mantissa().unsigned_abs());
    let scale = amount.scale();
    let ten = U256::from(10u8);
    if decimals >= scale {
        Some(mantissa * ten.pow(U256::from(decimals - scale)))
    } else {
        Some(mantissa / ten.pow(U256::from(scale - decimals)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn eighteen_decimals_whole_amount() {
        let raw = U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64));
        assert_eq!(raw_to_decimal(raw, 18), dec("100"));
    }

    #[test]
    fn six_decimals_fractional_amount() {
        assert_eq!(raw_to_decimal(U256::from(1_500_000u64), 6), dec("1.5"));
    }

    #[test]
    fn smallest_unit_is_exact() {
        assert_eq!(raw_to_decimal(U256::from(1u64), 18), dec("0.000000000000000001"));
    }

    #[test]
    fn oversized_mantissa_truncates_downwards() {
        // 10^30 + 7 raw units at 18 decimals = 1_000_000_000_000.000000000000000007
        let raw = U256::from(10u64).pow(U256::from(30u64)) + U256::from(7u64);
        let converted = raw_to_decimal(raw, 18);
        assert!(converted <= dec("1000000000000.000000000000000007"));
        assert!(converted >= dec("1000000000000"));
    }

    #[test]
    fn astronomically_large_value_saturates() {
        assert_eq!(raw_to_decimal(U256::MAX, 0), Decimal::MAX);
    }

    #[test]
    fn decimal_to_raw_scales_up() {
        let raw = decimal_to_raw(dec("100"), 18).unwrap();
        assert_eq!(raw, U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(decimal_to_raw(dec("1.5"), 6), Some(U256::from(1_500_000u64)));
        assert_eq!(decimal_to_raw(dec("-1"), 6), None);
    }
}
