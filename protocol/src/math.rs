//! # Share Math
//!
//! Integer helpers for proportional accounting. Every ratio in the system is
//! computed as `a * b / c` with the product widened to `u128`, rounded down.

use crate::config::BPS_DENOMINATOR;

/// Computes `a * b / c`, rounding down.
///
/// Returns `None` when `c == 0` or when the quotient does not fit in a `u64`.
/// The intermediate product never overflows: `u64::MAX * u64::MAX < u128::MAX`.
pub fn mul_div(a: u64, b: u64, c: u64) -> Option<u64> {
    if c == 0 {
        return None;
    }
    let wide = (a as u128) * (b as u128) / (c as u128);
    u64::try_from(wide).ok()
}

/// Returns `bps` basis points of `amount`, rounded down.
pub fn bps_of(amount: u64, bps: u64) -> Option<u64> {
    mul_div(amount, bps, BPS_DENOMINATOR)
}

/// `10^decimals`, the price-per-full-share scale for an asset.
pub fn scale_for(decimals: u8) -> Option<u64> {
    10u64.checked_pow(decimals as u32)
}
