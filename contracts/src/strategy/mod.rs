//! # Strategies
//!
//! A strategy holds the funds a vault invests and reports what they are
//! worth. The vault and controller only ever see a `Box<dyn Strategy>`; the
//! variants in this module differ in where yield comes from, not in how they
//! are driven.
//!
//! Every strategy embeds a [`StrategyCore`]: its own address, the vault it
//! was built for, that vault's underlying asset, and an access capability.
//! The default trait methods model the common case of funds sitting at the
//! strategy's own address. Variants override what they need.
//!
//! ## Variants
//!
//! | Variant            | Hard work                                  |
//! |--------------------|--------------------------------------------|
//! | [`NoopStrategy`]   | nothing; funds stay idle                   |
//! | [`ProfitStrategy`] | mints yield, forwards the fee share        |
//! | [`LossyStrategy`]  | loses funds; charges a withdrawal fee      |

use std::fmt;

use granary_protocol::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::access::{denied, AccessControl, Controlled, Governed};
use crate::env::Env;
use crate::error::{ContractError, ContractResult, Role};
use crate::events::ContractEvent;

mod lossy;
mod noop;
mod profit;

pub use lossy::LossyStrategy;
pub use noop::NoopStrategy;
pub use profit::ProfitStrategy;

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// State shared by every strategy variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCore {
    address: Address,
    underlying: Address,
    vault: Address,
    access: AccessControl,
}

impl StrategyCore {
    /// Builds the core for a new strategy serving `vault`.
    ///
    /// The underlying asset is taken from the vault, so a strategy can never
    /// be bound to an asset its vault does not manage.
    pub fn new(env: &Env, registry: &Address, vault: &Address) -> ContractResult<Self> {
        let access = AccessControl::new(env, registry)?;
        let underlying = env.vault(vault)?.underlying().clone();
        Ok(Self {
            address: Address::generate(granary_protocol::config::STRATEGY_PREFIX),
            underlying,
            vault: vault.clone(),
            access,
        })
    }

    /// The strategy's own address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The asset this strategy manages.
    pub fn underlying(&self) -> &Address {
        &self.underlying
    }

    /// The vault this strategy was built for.
    pub fn vault(&self) -> &Address {
        &self.vault
    }

    pub(crate) fn access_mut(&mut self) -> &mut AccessControl {
        &mut self.access
    }

    /// Underlying held at the strategy's address.
    pub fn idle_balance(&self, env: &Env) -> u64 {
        env.tokens().balance_of(&self.underlying, &self.address)
    }

    /// Fund-moving entry points accept the owning vault, the controller, or
    /// governance.
    pub fn require_restricted(&self, env: &Env, caller: &Address) -> ContractResult<()> {
        if caller == &self.vault && !caller.is_empty() {
            return Ok(());
        }
        let registry = env.registry(self.access.registry())?;
        if registry.is_controller(caller) || registry.is_governance(caller) {
            Ok(())
        } else {
            Err(denied(Role::VaultControllerOrGovernance, caller))
        }
    }

    /// Sends `amount` of underlying back to the vault.
    pub fn send_to_vault(&self, env: &mut Env, amount: u64) -> ContractResult<()> {
        if amount == 0 {
            return Ok(());
        }
        env.tokens_mut()
            .transfer(&self.underlying, &self.address, &self.vault, amount)?;
        debug!(strategy = %self.address, vault = %self.vault, amount, "returned funds to vault");
        Ok(())
    }
}

impl Governed for StrategyCore {
    fn access(&self) -> &AccessControl {
        &self.access
    }
}

impl Controlled for StrategyCore {}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// The contract a vault consumes.
///
/// Methods that move funds receive the calling identity and must reject
/// anyone but the vault, the controller and governance
/// ([`StrategyCore::require_restricted`]).
pub trait Strategy: fmt::Debug {
    /// Shared strategy state.
    fn core(&self) -> &StrategyCore;

    /// Mutable shared strategy state.
    fn core_mut(&mut self) -> &mut StrategyCore;

    /// Short variant name, recorded in events and snapshots.
    fn kind(&self) -> &'static str;

    /// Clones the strategy behind a fresh box.
    fn clone_box(&self) -> Box<dyn Strategy>;

    /// Underlying currently under management, as the vault should count it.
    fn invested_underlying_balance(&self, env: &Env) -> u64 {
        self.core().idle_balance(env)
    }

    /// Puts idle funds to work. Funds held at the strategy address already
    /// count as invested, so the default only checks the caller.
    fn invest_all_underlying(&mut self, env: &mut Env, caller: &Address) -> ContractResult<()> {
        self.core().require_restricted(env, caller)
    }

    /// Returns everything to the vault. Afterwards
    /// [`Strategy::invested_underlying_balance`] must report zero.
    fn withdraw_all_to_vault(&mut self, env: &mut Env, caller: &Address) -> ContractResult<()> {
        let core = self.core();
        core.require_restricted(env, caller)?;
        let amount = core.idle_balance(env);
        core.send_to_vault(env, amount)
    }

    /// Returns up to `amount` to the vault. The vault checks what actually
    /// arrived.
    fn withdraw_to_vault(
        &mut self,
        env: &mut Env,
        caller: &Address,
        amount: u64,
    ) -> ContractResult<()> {
        let core = self.core();
        core.require_restricted(env, caller)?;
        let amount = amount.min(core.idle_balance(env));
        core.send_to_vault(env, amount)
    }

    /// Harvests and reinvests.
    fn do_hard_work(&mut self, env: &mut Env, caller: &Address) -> ContractResult<()>;

    /// `true` for assets the strategy refuses to give up through salvage.
    fn is_unsalvageable(&self, token: &Address) -> bool {
        token == self.core().underlying()
    }

    /// `false` if depositing right now would let the depositor arbitrage the
    /// vault. The vault refuses deposits while this fails.
    fn deposit_arb_check(&self, _env: &Env) -> bool {
        true
    }

    /// Recovers tokens sent to the strategy by mistake. Controller or
    /// governance only; the managed asset is refused.
    fn salvage(
        &mut self,
        env: &mut Env,
        caller: &Address,
        recipient: &Address,
        token: &Address,
        amount: u64,
    ) -> ContractResult<()> {
        let core = self.core();
        core.require_controller_or_governance(env, caller)?;
        if self.is_unsalvageable(token) {
            return Err(ContractError::ProtectedAsset(token.clone()));
        }
        env.tokens_mut()
            .transfer(token, core.address(), recipient, amount)?;
        info!(strategy = %core.address(), token = %token, recipient = %recipient, amount, "strategy salvaged");
        env.emit(ContractEvent::Salvaged {
            contract: core.address().clone(),
            token: token.clone(),
            recipient: recipient.clone(),
            amount,
        });
        Ok(())
    }
}

impl Clone for Box<dyn Strategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PermissionRegistry;
    use crate::vault::Vault;

    #[test]
    fn core_binds_to_vault_underlying() {
        let mut env = Env::new();
        let gov = Address::new("gov");
        let registry = PermissionRegistry::deploy(&mut env, &gov, &gov).unwrap();
        let token = env.tokens_mut().create_token(&gov, "USD", "usd", 6).unwrap();
        let vault = Vault::deploy(&mut env, &registry, &token, 100, 100).unwrap();

        let core = StrategyCore::new(&env, &registry, &vault).unwrap();
        assert_eq!(core.underlying(), &token);
        assert_eq!(core.vault(), &vault);

        core.require_restricted(&env, &vault).unwrap();
        core.require_restricted(&env, &gov).unwrap();
        assert!(matches!(
            core.require_restricted(&env, &Address::new("eve")),
            Err(ContractError::Unauthorized {
                role: Role::VaultControllerOrGovernance,
                ..
            })
        ));
    }

    #[test]
    fn core_requires_known_vault() {
        let mut env = Env::new();
        let gov = Address::new("gov");
        let registry = PermissionRegistry::deploy(&mut env, &gov, &gov).unwrap();
        let result = StrategyCore::new(&env, &registry, &Address::new("vault:none"));
        assert!(matches!(result, Err(ContractError::UnknownContract { kind: "vault", .. })));
    }
}
