//! # Granary Vault Contracts
//!
//! Pooled-asset vaults with pluggable yield strategies, run inside an
//! in-process execution environment ([`Env`]):
//!
//! - **Permission Registry** — the one shared record of the governance and
//!   controller identities.
//! - **Access capabilities** — [`Governed`] and [`Controlled`], embedded by
//!   every stateful component, resolve roles through the registry on each
//!   call.
//! - **Vault** — share ledger for one underlying asset; invests a
//!   configurable fraction into a single active strategy.
//! - **Controller** — approves vault/strategy pairs, allow-lists hard
//!   workers, routes harvest fees.
//! - **Strategies** — the [`Strategy`] contract plus reference variants.
//!
//! ## Design Principles
//!
//! 1. Every top-level call is all-or-nothing. A failure anywhere rolls back
//!    balances, shares and events together.
//! 2. Checks first, then own state, then calls out. Mutating entry points
//!    hold a per-contract reentrancy guard.
//! 3. Share arithmetic is widened to `u128` and checked; nothing wraps.
//! 4. Every state record is serializable (serde) for snapshots and tooling.

pub mod access;
pub mod controller;
pub mod env;
pub mod error;
pub mod events;
pub mod registry;
pub mod snapshot;
pub mod strategy;
pub mod vault;

pub use access::{AccessControl, Controlled, Governed};
pub use controller::{Controller, ControllerClient};
pub use env::Env;
pub use error::{ContractError, ContractResult, Role};
pub use events::{ContractEvent, EventRecord};
pub use registry::{PermissionRegistry, RegistryClient};
pub use snapshot::LedgerSnapshot;
pub use strategy::{LossyStrategy, NoopStrategy, ProfitStrategy, Strategy, StrategyCore};
pub use vault::{Vault, VaultClient, VaultState};
