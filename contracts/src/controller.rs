//! # Controller
//!
//! The orchestration root. The controller approves vault/strategy pairs,
//! keeps the allow-list of hard workers, and routes harvest fees. It is the
//! identity vaults expect to see (through the registry's controller field)
//! when hard work or a strategy migration is triggered at scale.
//!
//! ## Roles
//!
//! | Operation                        | Allowed caller            |
//! |----------------------------------|---------------------------|
//! | `do_hard_work`                   | governance or hard worker |
//! | `notify_fee`                     | anyone paying the fee     |
//! | everything else that mutates     | governance                |

use std::collections::BTreeSet;

use granary_protocol::config::CONTROLLER_PREFIX;
use granary_protocol::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::access::{self, denied, AccessControl, Governed};
use crate::env::Env;
use crate::error::{ContractError, ContractResult, Role};
use crate::events::ContractEvent;
use crate::vault::VaultClient;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    address: Address,
    access: AccessControl,
    /// Approved vaults. A vault is approved iff it was paired through
    /// `add_vault_and_strategy`. Their strategies are read from the vaults
    /// themselves, so a migration made directly on a vault shows up here too.
    vaults: BTreeSet<Address>,
    hard_workers: BTreeSet<Address>,
    fee_reward_forwarder: Address,
    hard_rewards: Option<Address>,
}

impl Controller {
    /// Deploys a controller and returns its address.
    ///
    /// The registry's controller field must later be pointed at the returned
    /// address for vaults to accept the controller's commands.
    pub fn deploy(
        env: &mut Env,
        registry: &Address,
        fee_reward_forwarder: &Address,
    ) -> ContractResult<Address> {
        let controller = Controller {
            address: Address::generate(CONTROLLER_PREFIX),
            access: AccessControl::new(env, registry)?,
            vaults: BTreeSet::new(),
            hard_workers: BTreeSet::new(),
            fee_reward_forwarder: fee_reward_forwarder.clone(),
            hard_rewards: None,
        };
        let address = controller.address.clone();
        env.atomically(|env| {
            env.insert_controller(controller);
            env.emit(ContractEvent::ControllerDeployed {
                controller: address.clone(),
                fee_reward_forwarder: fee_reward_forwarder.clone(),
            });
            Ok(())
        })?;
        info!(controller = %address, forwarder = %fee_reward_forwarder, "controller deployed");
        Ok(address)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// `true` if `vault` was approved through `add_vault_and_strategy`.
    pub fn has_vault(&self, vault: &Address) -> bool {
        self.vaults.contains(vault)
    }

    pub fn is_hard_worker(&self, who: &Address) -> bool {
        self.hard_workers.contains(who)
    }

    /// The active strategy of an approved vault, read live from the vault.
    pub fn strategy_of(&self, env: &Env, vault: &Address) -> ContractResult<Option<Address>> {
        if !self.has_vault(vault) {
            return Ok(None);
        }
        Ok(env.vault(vault)?.strategy().cloned())
    }

    pub fn vaults(&self) -> impl Iterator<Item = &Address> {
        self.vaults.iter()
    }

    pub fn hard_workers(&self) -> impl Iterator<Item = &Address> {
        self.hard_workers.iter()
    }

    pub fn fee_reward_forwarder(&self) -> &Address {
        &self.fee_reward_forwarder
    }

    pub fn hard_rewards(&self) -> Option<&Address> {
        self.hard_rewards.as_ref()
    }

    pub(crate) fn access_mut(&mut self) -> &mut AccessControl {
        &mut self.access
    }

    fn require_approved(&self, vault: &Address) -> ContractResult<()> {
        if self.has_vault(vault) {
            Ok(())
        } else {
            Err(ContractError::UnknownVault(vault.clone()))
        }
    }
}

impl Governed for Controller {
    fn access(&self) -> &AccessControl {
        &self.access
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Calls into a deployed [`Controller`] on behalf of `caller`.
pub struct ControllerClient<'a> {
    env: &'a mut Env,
    address: Address,
}

impl<'a> ControllerClient<'a> {
    pub fn new(env: &'a mut Env, address: &Address) -> Self {
        Self {
            env,
            address: address.clone(),
        }
    }

    /// Approves `vault` and installs `strategy` as its strategy. Governance only.
    ///
    /// # Errors
    ///
    /// - [`ContractError::InvalidArgument`] if either identity is empty.
    /// - [`ContractError::AlreadyRegistered`] if the vault is already approved.
    /// - Anything the vault's `set_strategy` raises.
    pub fn add_vault_and_strategy(
        &mut self,
        caller: &Address,
        vault: &Address,
        strategy: &Address,
    ) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            let controller = env.controller(&address)?;
            controller.require_governance(env, caller)?;
            if vault.is_empty() || strategy.is_empty() {
                return Err(ContractError::invalid("vault and strategy must not be empty"));
            }
            if controller.has_vault(vault) {
                return Err(ContractError::AlreadyRegistered(vault.clone()));
            }
            env.vault(vault)?;

            env.controller_mut(&address)?.vaults.insert(vault.clone());

            VaultClient::new(env, vault).set_strategy(&address, strategy)?;

            info!(controller = %address, vault = %vault, strategy = %strategy, "vault added");
            env.emit(ContractEvent::VaultAdded {
                controller: address.clone(),
                vault: vault.clone(),
                strategy: strategy.clone(),
            });
            Ok(())
        })
    }

    /// Migrates an approved vault to `strategy`. Governance only.
    pub fn set_vault_strategy(
        &mut self,
        caller: &Address,
        vault: &Address,
        strategy: &Address,
    ) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            let controller = env.controller(&address)?;
            controller.require_governance(env, caller)?;
            controller.require_approved(vault)?;

            VaultClient::new(env, vault).set_strategy(&address, strategy)?;
            info!(controller = %address, vault = %vault, strategy = %strategy, "vault strategy migrated");
            Ok(())
        })
    }

    /// Runs hard work on an approved vault and records the share price
    /// before and after. Governance or a hard worker.
    ///
    /// Returns `(old_price, new_price)`.
    pub fn do_hard_work(&mut self, caller: &Address, vault: &Address) -> ContractResult<(u128, u128)> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            let controller = env.controller(&address)?;
            if !controller.is_hard_worker(caller) && !controller.is_governance(env, caller)? {
                return Err(denied(Role::HardWorkerOrGovernance, caller));
            }
            controller.require_approved(vault)?;
            let hard_rewards = controller.hard_rewards().cloned();

            let old_price = env.vault(vault)?.price_per_full_share(env)?;
            VaultClient::new(env, vault).do_hard_work(&address)?;
            let state = env.vault(vault)?;
            let new_price = state.price_per_full_share(env)?;
            let strategy = state.strategy().cloned();

            info!(vault = %vault, worker = %caller, old_price, new_price, "hard work");
            env.emit(ContractEvent::SharePriceChanged {
                vault: vault.clone(),
                strategy,
                old_price,
                new_price,
            });
            if let Some(pool) = hard_rewards {
                env.emit(ContractEvent::HardRewardsNotified {
                    pool,
                    worker: caller.clone(),
                    vault: vault.clone(),
                });
            }
            Ok((old_price, new_price))
        })
    }

    /// Allow-lists `worker` for `do_hard_work`. Governance only; idempotent.
    pub fn add_hard_worker(&mut self, caller: &Address, worker: &Address) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.atomically(|env| {
            env.controller(&address)?.require_governance(env, caller)?;
            if worker.is_empty() {
                return Err(ContractError::invalid("hard worker must not be empty"));
            }
            if env.controller_mut(&address)?.hard_workers.insert(worker.clone()) {
                info!(controller = %address, worker = %worker, "hard worker added");
                env.emit(ContractEvent::HardWorkerAdded {
                    controller: address.clone(),
                    worker: worker.clone(),
                });
            }
            Ok(())
        })
    }

    /// Removes `worker` from the allow-list. Governance only; idempotent.
    pub fn remove_hard_worker(&mut self, caller: &Address, worker: &Address) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.atomically(|env| {
            env.controller(&address)?.require_governance(env, caller)?;
            if worker.is_empty() {
                return Err(ContractError::invalid("hard worker must not be empty"));
            }
            if env.controller_mut(&address)?.hard_workers.remove(worker) {
                info!(controller = %address, worker = %worker, "hard worker removed");
                env.emit(ContractEvent::HardWorkerRemoved {
                    controller: address.clone(),
                    worker: worker.clone(),
                });
            }
            Ok(())
        })
    }

    /// Sets where harvest fees go. Governance only.
    pub fn set_fee_reward_forwarder(&mut self, caller: &Address, forwarder: &Address) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.atomically(|env| {
            env.controller(&address)?.require_governance(env, caller)?;
            env.controller_mut(&address)?.fee_reward_forwarder = forwarder.clone();
            info!(controller = %address, forwarder = %forwarder, "fee reward forwarder changed");
            env.emit(ContractEvent::FeeRewardForwarderChanged {
                controller: address.clone(),
                forwarder: forwarder.clone(),
            });
            Ok(())
        })
    }

    /// Sets or clears the hard-rewards pool. Governance only.
    pub fn set_hard_rewards(&mut self, caller: &Address, pool: Option<&Address>) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.atomically(|env| {
            env.controller(&address)?.require_governance(env, caller)?;
            let pool = pool.filter(|p| !p.is_empty()).cloned();
            env.controller_mut(&address)?.hard_rewards = pool.clone();
            info!(controller = %address, pool = ?pool, "hard rewards changed");
            env.emit(ContractEvent::HardRewardsChanged {
                controller: address.clone(),
                pool,
            });
            Ok(())
        })
    }

    /// Pulls exactly `fee` of `token` from the caller and forwards it to the
    /// fee reward forwarder. The caller must have approved the controller.
    ///
    /// Strategies call this from inside a controller-driven hard work, so it
    /// does not take the controller's reentrancy guard. It only moves tokens.
    pub fn notify_fee(&mut self, caller: &Address, token: &Address, fee: u64) -> ContractResult<()> {
        if fee == 0 {
            return Ok(());
        }
        let address = self.address.clone();
        self.env.atomically(|env| {
            let forwarder = env.controller(&address)?.fee_reward_forwarder().clone();
            if forwarder.is_empty() {
                return Err(ContractError::invalid("no fee reward forwarder configured"));
            }
            let tokens = env.tokens_mut();
            tokens.transfer_from(token, &address, caller, &address, fee)?;
            tokens.transfer(token, &address, &forwarder, fee)?;

            debug!(controller = %address, from = %caller, forwarder = %forwarder, fee, "fee forwarded");
            env.emit(ContractEvent::FeeForwarded {
                controller: address.clone(),
                from: caller.clone(),
                token: token.clone(),
                forwarder,
                amount: fee,
            });
            Ok(())
        })
    }

    /// Sweeps tokens held by the controller to governance. Governance only.
    pub fn salvage(&mut self, caller: &Address, token: &Address, amount: u64) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            let controller = env.controller(&address)?;
            controller.require_governance(env, caller)?;
            let recipient = controller.governance(env)?;

            env.tokens_mut().transfer(token, &address, &recipient, amount)?;
            info!(controller = %address, token = %token, amount, "salvaged");
            env.emit(ContractEvent::Salvaged {
                contract: address.clone(),
                token: token.clone(),
                recipient,
                amount,
            });
            Ok(())
        })
    }

    /// Has `strategy` sweep mistakenly sent tokens to governance.
    /// Governance only; the strategy refuses its managed asset.
    pub fn salvage_strategy(
        &mut self,
        caller: &Address,
        strategy: &Address,
        token: &Address,
        amount: u64,
    ) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            let controller = env.controller(&address)?;
            controller.require_governance(env, caller)?;
            let recipient = controller.governance(env)?;
            env.with_strategy(strategy, |s, env| {
                s.salvage(env, &address, &recipient, token, amount)
            })
        })
    }

    /// Points the controller at another registry. Governance of the current
    /// registry only.
    pub fn set_registry(&mut self, caller: &Address, registry: &Address) -> ContractResult<()> {
        access::set_registry(self.env, caller, &self.address, registry)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn has_vault(&self, vault: &Address) -> ContractResult<bool> {
        Ok(self.env.controller(&self.address)?.has_vault(vault))
    }

    pub fn is_hard_worker(&self, who: &Address) -> ContractResult<bool> {
        Ok(self.env.controller(&self.address)?.is_hard_worker(who))
    }

    pub fn strategy_of(&self, vault: &Address) -> ContractResult<Option<Address>> {
        self.env
            .controller(&self.address)?
            .strategy_of(self.env, vault)
    }

    pub fn fee_reward_forwarder(&self) -> ContractResult<Address> {
        Ok(self
            .env
            .controller(&self.address)?
            .fee_reward_forwarder()
            .clone())
    }
}
