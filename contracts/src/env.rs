//! # Execution Environment
//!
//! [`Env`] stands in for the host platform. It owns every piece of persistent
//! contract state (assets, registries, vaults, controllers, strategies and
//! the event log) and provides the call semantics the contracts rely on:
//!
//! - **All-or-nothing calls.** [`Env::atomically`] checkpoints storage at the
//!   outermost call and restores it if that call fails. Nested calls join the
//!   enclosing transaction.
//! - **Reentrancy guards.** [`Env::non_reentrant`] rejects a second entry
//!   into the same address while the first is still running.
//! - **Strategy checkout.** [`Env::with_strategy`] takes a strategy out of
//!   storage for the duration of a call, so the strategy can mutate itself
//!   and the rest of the environment at the same time. A call that reaches a
//!   checked-out strategy fails with [`ContractError::Reentrant`].
//!
//! Components never hold references to each other, only addresses. Every
//! lookup goes through the environment.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use granary_protocol::{Address, TokenLedger};
use tracing::{debug, warn};

use crate::access::{AccessControl, Governed};
use crate::controller::Controller;
use crate::error::{ContractError, ContractResult};
use crate::events::{ContractEvent, EventRecord};
use crate::registry::PermissionRegistry;
use crate::strategy::Strategy;
use crate::vault::Vault;

/// Persistent state. Cloned wholesale to checkpoint a transaction.
#[derive(Debug, Clone, Default)]
pub(crate) struct Storage {
    pub(crate) tokens: TokenLedger,
    pub(crate) registries: BTreeMap<Address, PermissionRegistry>,
    pub(crate) vaults: BTreeMap<Address, Vault>,
    pub(crate) controllers: BTreeMap<Address, Controller>,
    pub(crate) strategies: BTreeMap<Address, Box<dyn Strategy>>,
    pub(crate) events: Vec<EventRecord>,
}

/// The in-process execution environment.
#[derive(Debug, Default)]
pub struct Env {
    storage: Storage,
    /// Nesting depth of [`Env::atomically`]; 0 outside any transaction.
    depth: usize,
    /// Addresses currently executing (guarded contracts and checked-out strategies).
    entered: BTreeSet<Address>,
}

impl Env {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Call semantics
    // -----------------------------------------------------------------------

    /// Runs `f` as one all-or-nothing transaction.
    ///
    /// The outermost call checkpoints storage; if `f` fails, every mutation
    /// made since the checkpoint (balances, shares, events) is discarded.
    /// Nested calls run inside the enclosing transaction and let their error
    /// propagate to it.
    pub fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut Env) -> ContractResult<T>,
    ) -> ContractResult<T> {
        if self.depth > 0 {
            self.depth += 1;
            let result = f(self);
            self.depth -= 1;
            return result;
        }

        let checkpoint = self.storage.clone();
        self.depth = 1;
        let result = f(self);
        self.depth = 0;

        if let Err(err) = &result {
            warn!(error = %err, "transaction reverted");
            self.storage = checkpoint;
        }
        result
    }

    /// Runs `f` while holding the non-reentrant guard for `address`.
    pub fn non_reentrant<T>(
        &mut self,
        address: &Address,
        f: impl FnOnce(&mut Env) -> ContractResult<T>,
    ) -> ContractResult<T> {
        if !self.entered.insert(address.clone()) {
            return Err(ContractError::Reentrant(address.clone()));
        }
        let result = f(self);
        self.entered.remove(address);
        result
    }

    /// [`Env::atomically`] and [`Env::non_reentrant`] combined: the shape of
    /// every guarded entry point.
    pub fn guarded<T>(
        &mut self,
        address: &Address,
        f: impl FnOnce(&mut Env) -> ContractResult<T>,
    ) -> ContractResult<T> {
        self.atomically(|env| env.non_reentrant(address, f))
    }

    /// Checks the strategy at `address` out of storage and hands it to `f`
    /// together with the environment.
    pub fn with_strategy<T>(
        &mut self,
        address: &Address,
        f: impl FnOnce(&mut dyn Strategy, &mut Env) -> ContractResult<T>,
    ) -> ContractResult<T> {
        let mut strategy = match self.storage.strategies.remove(address) {
            Some(strategy) => strategy,
            None => return Err(self.missing(address, "strategy")),
        };
        self.entered.insert(address.clone());
        let result = f(strategy.as_mut(), self);
        self.entered.remove(address);
        self.storage.strategies.insert(address.clone(), strategy);
        result
    }

    /// Returns `true` while a guarded call into `address` is in flight.
    pub fn is_entered(&self, address: &Address) -> bool {
        self.entered.contains(address)
    }

    // -----------------------------------------------------------------------
    // Assets
    // -----------------------------------------------------------------------

    /// The asset ledger.
    pub fn tokens(&self) -> &TokenLedger {
        &self.storage.tokens
    }

    /// Mutable access to the asset ledger. Callers pass their own identity
    /// as `from` / `owner` / `spender`.
    pub fn tokens_mut(&mut self) -> &mut TokenLedger {
        &mut self.storage.tokens
    }

    // -----------------------------------------------------------------------
    // Component lookup
    // -----------------------------------------------------------------------

    /// Looks up a permission registry.
    pub fn registry(&self, address: &Address) -> ContractResult<&PermissionRegistry> {
        self.storage
            .registries
            .get(address)
            .ok_or_else(|| unknown("registry", address))
    }

    /// Looks up a vault.
    pub fn vault(&self, address: &Address) -> ContractResult<&Vault> {
        self.storage
            .vaults
            .get(address)
            .ok_or_else(|| unknown("vault", address))
    }

    /// Looks up a controller.
    pub fn controller(&self, address: &Address) -> ContractResult<&Controller> {
        self.storage
            .controllers
            .get(address)
            .ok_or_else(|| unknown("controller", address))
    }

    /// Looks up a strategy. Fails with [`ContractError::Reentrant`] while the
    /// strategy is checked out by [`Env::with_strategy`].
    pub fn strategy(&self, address: &Address) -> ContractResult<&dyn Strategy> {
        match self.storage.strategies.get(address) {
            Some(strategy) => Ok(strategy.as_ref()),
            None => Err(self.missing(address, "strategy")),
        }
    }

    /// Iterates over all registries.
    pub fn registries(&self) -> impl Iterator<Item = &PermissionRegistry> {
        self.storage.registries.values()
    }

    /// Iterates over all vaults.
    pub fn vaults(&self) -> impl Iterator<Item = &Vault> {
        self.storage.vaults.values()
    }

    /// Iterates over all controllers.
    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.storage.controllers.values()
    }

    /// Iterates over all strategies that are not currently checked out.
    pub fn strategies(&self) -> impl Iterator<Item = &dyn Strategy> {
        self.storage.strategies.values().map(|s| s.as_ref())
    }

    pub(crate) fn registry_mut(&mut self, address: &Address) -> ContractResult<&mut PermissionRegistry> {
        self.storage
            .registries
            .get_mut(address)
            .ok_or_else(|| unknown("registry", address))
    }

    pub(crate) fn vault_mut(&mut self, address: &Address) -> ContractResult<&mut Vault> {
        self.storage
            .vaults
            .get_mut(address)
            .ok_or_else(|| unknown("vault", address))
    }

    pub(crate) fn controller_mut(&mut self, address: &Address) -> ContractResult<&mut Controller> {
        self.storage
            .controllers
            .get_mut(address)
            .ok_or_else(|| unknown("controller", address))
    }

    /// The access capability embedded in whatever component lives at `address`.
    pub(crate) fn access_control(&self, address: &Address) -> ContractResult<&AccessControl> {
        if let Some(vault) = self.storage.vaults.get(address) {
            return Ok(vault.access());
        }
        if let Some(controller) = self.storage.controllers.get(address) {
            return Ok(controller.access());
        }
        match self.storage.strategies.get(address) {
            Some(strategy) => Ok(strategy.core().access()),
            None => Err(self.missing(address, "component")),
        }
    }

    pub(crate) fn access_control_mut(&mut self, address: &Address) -> ContractResult<&mut AccessControl> {
        // `contains_key` first: returning a `get_mut` borrow early keeps
        // `self` borrowed on the error path.
        if self.storage.vaults.contains_key(address) {
            return self.storage
                .vaults
                .get_mut(address)
                .map(Vault::access_mut)
                .ok_or_else(|| unknown("vault", address));
        }
        if self.storage.controllers.contains_key(address) {
            return self.storage
                .controllers
                .get_mut(address)
                .map(Controller::access_mut)
                .ok_or_else(|| unknown("controller", address));
        }
        if self.storage.strategies.contains_key(address) {
            return self.storage
                .strategies
                .get_mut(address)
                .map(|strategy| strategy.core_mut().access_mut())
                .ok_or_else(|| unknown("strategy", address));
        }
        Err(self.missing(address, "component"))
    }

    // -----------------------------------------------------------------------
    // Deployment
    // -----------------------------------------------------------------------

    pub(crate) fn insert_registry(&mut self, registry: PermissionRegistry) {
        self.storage
            .registries
            .insert(registry.address().clone(), registry);
    }

    pub(crate) fn insert_vault(&mut self, vault: Vault) {
        self.storage.vaults.insert(vault.address().clone(), vault);
    }

    pub(crate) fn insert_controller(&mut self, controller: Controller) {
        self.storage
            .controllers
            .insert(controller.address().clone(), controller);
    }

    /// Installs a strategy built around a [`crate::strategy::StrategyCore`].
    ///
    /// Third-party strategy types deploy through this entry point; the
    /// reference variants wrap it in their own `deploy` constructors.
    ///
    /// # Errors
    ///
    /// [`ContractError::InvalidArgument`] if the address is empty or already taken.
    pub fn install_strategy(&mut self, strategy: Box<dyn Strategy>) -> ContractResult<Address> {
        let address = strategy.core().address().clone();
        if address.is_empty() || self.address_in_use(&address) {
            return Err(ContractError::invalid(format!("address {address} already in use")));
        }
        let vault = strategy.core().vault().clone();
        let kind = strategy.kind().to_string();
        self.storage.strategies.insert(address.clone(), strategy);
        self.emit(ContractEvent::StrategyDeployed {
            strategy: address.clone(),
            vault,
            kind,
        });
        Ok(address)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Appends an event to the log.
    pub fn emit(&mut self, event: ContractEvent) {
        let sequence = self.storage.events.len() as u64;
        debug!(sequence, ?event, "event");
        self.storage.events.push(EventRecord {
            sequence,
            timestamp: Utc::now(),
            event,
        });
    }

    /// The event log, oldest first.
    pub fn events(&self) -> &[EventRecord] {
        &self.storage.events
    }

    fn address_in_use(&self, address: &Address) -> bool {
        self.entered.contains(address)
            || self.storage.strategies.contains_key(address)
            || self.storage.vaults.contains_key(address)
            || self.storage.controllers.contains_key(address)
            || self.storage.registries.contains_key(address)
    }

    fn missing(&self, address: &Address, kind: &'static str) -> ContractError {
        if self.entered.contains(address) {
            ContractError::Reentrant(address.clone())
        } else {
            unknown(kind, address)
        }
    }
}

fn unknown(kind: &'static str, address: &Address) -> ContractError {
    ContractError::UnknownContract {
        kind,
        address: address.clone(),
    }
}
