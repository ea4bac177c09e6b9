//! Error types shared by every Granary contract.
//!
//! Any entry point that can fail returns a [`ContractError`]. An error aborts
//! the whole top-level call: [`crate::env::Env::atomically`] restores the
//! state captured before the call, so callers never observe a half-applied
//! transition.

use std::fmt;

use granary_protocol::{Address, TokenError};
use thiserror::Error;

/// The role an entry point demanded from its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The registry's governance identity.
    Governance,
    /// The registry's controller identity.
    Controller,
    /// Either the controller or governance.
    ControllerOrGovernance,
    /// Governance or an allow-listed hard worker.
    HardWorkerOrGovernance,
    /// The strategy's vault, the controller, or governance.
    VaultControllerOrGovernance,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Governance => write!(f, "governance"),
            Role::Controller => write!(f, "controller"),
            Role::ControllerOrGovernance => write!(f, "controller or governance"),
            Role::HardWorkerOrGovernance => write!(f, "hard worker or governance"),
            Role::VaultControllerOrGovernance => write!(f, "vault, controller or governance"),
        }
    }
}

/// Errors raised by registries, vaults, controllers and strategies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// The caller lacks the role the entry point requires.
    #[error("unauthorized: {caller} is not {role}")]
    Unauthorized {
        /// The role that was required.
        role: Role,
        /// The rejected caller.
        caller: Address,
    },

    /// An argument was empty, zero, or otherwise malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A holder tried to redeem or move more shares than it owns.
    #[error("insufficient balance: {holder} holds {balance}, requested {requested}")]
    InsufficientBalance {
        /// The share holder.
        holder: Address,
        /// Shares currently held.
        balance: u64,
        /// Shares requested.
        requested: u64,
    },

    /// The vault is already approved by the controller.
    #[error("vault already registered: {0}")]
    AlreadyRegistered(Address),

    /// The vault is not approved by the controller.
    #[error("unknown vault: {0}")]
    UnknownVault(Address),

    /// A strategy still reported funds after being told to return everything.
    #[error("strategy migration failed: {strategy} still reports {residual}")]
    StrategyMigrationFailed {
        /// The strategy being retired.
        strategy: Address,
        /// Underlying it still reports as invested.
        residual: u64,
    },

    /// A strategy returned less than the vault asked it for.
    #[error("strategy shortfall: {strategy} returned {received} of {requested}")]
    StrategyShortfall {
        /// The strategy that under-delivered.
        strategy: Address,
        /// Amount the vault requested.
        requested: u64,
        /// Amount that actually arrived.
        received: u64,
    },

    /// Salvage attempted on an asset the contract actively manages.
    #[error("protected asset: {0} cannot be salvaged")]
    ProtectedAsset(Address),

    /// A guarded contract was re-entered while a call into it was in flight.
    #[error("reentrant call into {0}")]
    Reentrant(Address),

    /// No contract of the expected kind exists at the address.
    #[error("no {kind} deployed at {address}")]
    UnknownContract {
        /// The kind of contract that was expected.
        kind: &'static str,
        /// The address that was looked up.
        address: Address,
    },

    /// Share or balance arithmetic exceeded `u64`.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// The asset ledger rejected a movement.
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl ContractError {
    /// Shorthand for [`ContractError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        ContractError::InvalidArgument(message.into())
    }
}

/// Result alias used across the contracts crate.
pub type ContractResult<T> = Result<T, ContractError>;
