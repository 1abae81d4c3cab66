//! Base-unit conversions between `Decimal` amounts and on-chain `u64` amounts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Largest decimals value that still fits in a `Decimal` scale
pub const MAX_DECIMALS: u8 = 28;

/// Convert a UI amount to base units, truncating any sub-unit remainder.
/// Returns `None` for negative amounts or when the result overflows `u64`.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Option<u64> {
    if amount.is_sign_negative() || decimals > MAX_DECIMALS {
        return None;
    }
    let scale = Decimal::from_i128_with_scale(10i128.pow(decimals as u32), 0);
    amount.checked_mul(scale)?.trunc().to_u64()
}

/// Convert base units to a UI amount
pub fn from_base_units(units: u64, decimals: u8) -> Decimal {
    Decimal::from_i128_with_scale(units as i128, decimals.min(MAX_DECIMALS) as u32).normalize()
}
