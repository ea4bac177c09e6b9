//! # Protocol Configuration & Constants
//!
//! Every magic number in Granary lives here. If a ratio or a default shows up
//! as a literal somewhere else, it belongs in this file instead.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Ratios
// ---------------------------------------------------------------------------

/// Denominator for every basis-point quantity (1 bp = 0.01%).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Default fraction of a vault's holdings pushed into its strategy on each
/// hard work. The remaining 5% stays idle to serve withdrawals cheaply.
pub const DEFAULT_INVEST_NUMERATOR: u64 = 95;

/// Denominator paired with [`DEFAULT_INVEST_NUMERATOR`].
pub const DEFAULT_INVEST_DENOMINATOR: u64 = 100;

/// Share of harvested profit a strategy forwards to the controller as fees.
pub const DEFAULT_PROFIT_SHARING_NUMERATOR: u64 = 30;

/// Denominator paired with [`DEFAULT_PROFIT_SHARING_NUMERATOR`].
pub const DEFAULT_PROFIT_SHARING_DENOMINATOR: u64 = 100;

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Default decimal precision for newly created assets.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Largest decimal precision an asset may declare. `10^19` no longer fits in
/// a `u64`, and the price-per-full-share scale must.
pub const MAX_TOKEN_DECIMALS: u8 = 18;

// ---------------------------------------------------------------------------
// Address Prefixes
// ---------------------------------------------------------------------------

/// Prefix for permission registry addresses.
pub const REGISTRY_PREFIX: &str = "registry";

/// Prefix for vault addresses.
pub const VAULT_PREFIX: &str = "vault";

/// Prefix for controller addresses.
pub const CONTROLLER_PREFIX: &str = "controller";

/// Prefix for strategy addresses.
pub const STRATEGY_PREFIX: &str = "strategy";

/// Prefix for token addresses.
pub const TOKEN_PREFIX: &str = "token";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ratios_are_well_formed() {
        assert!(DEFAULT_INVEST_NUMERATOR <= DEFAULT_INVEST_DENOMINATOR);
        assert!(DEFAULT_PROFIT_SHARING_NUMERATOR <= DEFAULT_PROFIT_SHARING_DENOMINATOR);
        assert!(DEFAULT_INVEST_DENOMINATOR > 0);
    }

    #[test]
    fn max_decimals_scale_fits_u64() {
        assert!(10u64.checked_pow(MAX_TOKEN_DECIMALS as u32).is_some());
        assert!(DEFAULT_TOKEN_DECIMALS <= MAX_TOKEN_DECIMALS);
    }

    #[test]
    fn prefixes_are_distinct() {
        let prefixes = [
            REGISTRY_PREFIX,
            VAULT_PREFIX,
            CONTROLLER_PREFIX,
            STRATEGY_PREFIX,
            TOKEN_PREFIX,
        ];
        for (i, a) in prefixes.iter().enumerate() {
            for b in &prefixes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
