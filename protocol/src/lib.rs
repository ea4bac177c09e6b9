// Copyright (c) 2026 Granary Contributors. MIT License.
// See LICENSE for details.

//! # Granary Protocol — Platform Primitives
//!
//! Everything the vault contracts assume the host platform gives them for
//! free lives here: identities, a standard fungible-asset ledger, and the
//! integer share math every ledger in the system relies on.
//!
//! ## Architecture
//!
//! - **address** — `Address`, the identity type. The empty address is the
//!   zero identity and is rejected wherever an identity is required.
//! - **token** — `TokenLedger`, a multi-asset ledger with exact allowances
//!   and admin-gated minting.
//! - **math** — checked `mul_div` and basis-point helpers. No floats, ever.
//! - **config** — protocol constants and defaults.
//!
//! ## Design Philosophy
//!
//! 1. All amounts are `u64` in smallest-unit denomination. Products are
//!    widened to `u128` before division so that `amount * supply` cannot
//!    silently wrap.
//! 2. Rounding always goes down, in favor of the pool.
//! 3. Every monetary operation is checked; overflow is an error, not a panic.

pub mod address;
pub mod config;
pub mod math;
pub mod token;

pub use address::Address;
pub use token::{TokenError, TokenInfo, TokenLedger};
