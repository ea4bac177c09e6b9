//! # Vault
//!
//! A vault pools one underlying asset and issues shares against it. A
//! holder's fraction of the total share supply is their claim on everything
//! the vault controls: the idle balance at the vault's address plus whatever
//! its active strategy reports as invested.
//!
//! ## Lifecycle
//!
//! ```text
//! deploy ──► Active ──setStrategy──► Invested ──setStrategy──► Invested
//!            (no strategy)                      (recall, then swap)
//! ```
//!
//! ## Share Math
//!
//! - First deposit: shares = amount (1:1 bootstrap).
//! - Later deposits: shares = amount × totalShares / ubwi.
//! - Withdrawals: owed = shares × ubwi / totalShares.
//!
//! All products are widened to `u128` and rounded down, so each operation
//! loses at most one unit to rounding and the loss always favors the vault.
//!
//! ## Call Discipline
//!
//! Every mutating entry point runs under [`Env::guarded`]: all-or-nothing,
//! and a second entry into the same vault while one is in flight fails with
//! [`ContractError::Reentrant`]. Within a call, checks come first, then the
//! vault's own ledger, then calls out to the asset and the strategy.

use std::collections::BTreeMap;

use granary_protocol::config::VAULT_PREFIX;
use granary_protocol::math::{mul_div, scale_for};
use granary_protocol::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::access::{self, AccessControl, Controlled, Governed};
use crate::env::Env;
use crate::error::{ContractError, ContractResult};
use crate::events::ContractEvent;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where a deployed vault sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultState {
    /// Accepting deposits, no strategy configured.
    Active,
    /// A strategy is configured and receives funds on hard work.
    Invested,
}

/// Share ledger and configuration for one underlying asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    address: Address,
    access: AccessControl,
    underlying: Address,
    /// Always equal to the sum of `shares`.
    total_shares: u64,
    /// Zero balances are pruned.
    shares: BTreeMap<Address, u64>,
    strategy: Option<Address>,
    invest_numerator: u64,
    invest_denominator: u64,
}

impl Vault {
    /// Deploys a vault for `underlying` and returns its address.
    ///
    /// # Errors
    ///
    /// - [`ContractError::InvalidArgument`] for an empty registry or
    ///   underlying, or an invest ratio with `denominator == 0` or
    ///   `numerator > denominator`.
    /// - [`ContractError::UnknownContract`] if the registry does not exist.
    /// - [`ContractError::Token`] if the underlying asset does not exist.
    pub fn deploy(
        env: &mut Env,
        registry: &Address,
        underlying: &Address,
        invest_numerator: u64,
        invest_denominator: u64,
    ) -> ContractResult<Address> {
        let access = AccessControl::new(env, registry)?;
        if underlying.is_empty() {
            return Err(ContractError::invalid("underlying must not be empty"));
        }
        env.tokens().info(underlying)?;
        validate_ratio(invest_numerator, invest_denominator)?;

        let vault = Vault {
            address: Address::generate(VAULT_PREFIX),
            access,
            underlying: underlying.clone(),
            total_shares: 0,
            shares: BTreeMap::new(),
            strategy: None,
            invest_numerator,
            invest_denominator,
        };
        let address = vault.address.clone();
        env.atomically(|env| {
            env.insert_vault(vault);
            env.emit(ContractEvent::VaultDeployed {
                vault: address.clone(),
                underlying: underlying.clone(),
                numerator: invest_numerator,
                denominator: invest_denominator,
            });
            Ok(())
        })?;
        info!(vault = %address, underlying = %underlying, invest_numerator, invest_denominator, "vault deployed");
        Ok(address)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn underlying(&self) -> &Address {
        &self.underlying
    }

    pub fn strategy(&self) -> Option<&Address> {
        self.strategy.as_ref()
    }

    pub fn total_shares(&self) -> u64 {
        self.total_shares
    }

    /// Shares held by `holder`, or 0.
    pub fn balance_of(&self, holder: &Address) -> u64 {
        self.shares.get(holder).copied().unwrap_or(0)
    }

    /// Every non-zero share balance.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, u64)> {
        self.shares.iter().map(|(holder, shares)| (holder, *shares))
    }

    /// `(numerator, denominator)` of the fraction pushed into the strategy.
    pub fn invest_ratio(&self) -> (u64, u64) {
        (self.invest_numerator, self.invest_denominator)
    }

    pub fn state(&self) -> VaultState {
        match self.strategy {
            Some(_) => VaultState::Invested,
            None => VaultState::Active,
        }
    }

    pub(crate) fn access_mut(&mut self) -> &mut AccessControl {
        &mut self.access
    }

    // -----------------------------------------------------------------------
    // Accounting queries
    // -----------------------------------------------------------------------

    /// Underlying held at the vault's own address.
    pub fn underlying_balance_in_vault(&self, env: &Env) -> u64 {
        env.tokens().balance_of(&self.underlying, &self.address)
    }

    /// Underlying the active strategy reports as invested, or 0.
    pub fn invested_balance(&self, env: &Env) -> ContractResult<u64> {
        match &self.strategy {
            Some(strategy) => Ok(env.strategy(strategy)?.invested_underlying_balance(env)),
            None => Ok(0),
        }
    }

    /// Idle plus invested underlying: the value behind the share supply.
    pub fn underlying_balance_with_investment(&self, env: &Env) -> ContractResult<u64> {
        self.underlying_balance_in_vault(env)
            .checked_add(self.invested_balance(env)?)
            .ok_or(ContractError::Overflow("underlying balance with investment"))
    }

    /// `holder`'s proportional claim on [`Vault::underlying_balance_with_investment`].
    pub fn underlying_balance_with_investment_for_holder(
        &self,
        env: &Env,
        holder: &Address,
    ) -> ContractResult<u64> {
        if self.total_shares == 0 {
            return Ok(0);
        }
        let ubwi = self.underlying_balance_with_investment(env)?;
        mul_div(self.balance_of(holder), ubwi, self.total_shares)
            .ok_or(ContractError::Overflow("holder balance"))
    }

    /// How much more the strategy should receive to reach the invest ratio.
    pub fn available_to_invest_out(&self, env: &Env) -> ContractResult<u64> {
        let ubwi = self.underlying_balance_with_investment(env)?;
        let numerator = self.invest_numerator.min(self.invest_denominator);
        let wants = mul_div(ubwi, numerator, self.invest_denominator)
            .ok_or(ContractError::Overflow("available to invest out"))?;
        Ok(wants.saturating_sub(self.invested_balance(env)?))
    }

    /// Underlying per full share, scaled by `10^decimals`.
    ///
    /// Returned as `u128`: with 18 decimals a share worth more than ~18.4
    /// units no longer fits a `u64` once scaled. Both factors of `ubwi * scale`
    /// fit a `u64`, so the product cannot overflow.
    pub fn price_per_full_share(&self, env: &Env) -> ContractResult<u128> {
        let decimals = env.tokens().decimals(&self.underlying)?;
        let scale = u128::from(scale_for(decimals).ok_or(ContractError::Overflow("price scale"))?);
        if self.total_shares == 0 {
            return Ok(scale);
        }
        let ubwi = u128::from(self.underlying_balance_with_investment(env)?);
        Ok(ubwi * scale / u128::from(self.total_shares))
    }

    // -----------------------------------------------------------------------
    // Share ledger
    // -----------------------------------------------------------------------

    fn mint_shares(&mut self, holder: &Address, shares: u64) -> ContractResult<()> {
        let total = self
            .total_shares
            .checked_add(shares)
            .ok_or(ContractError::Overflow("total shares"))?;
        let balance = self
            .balance_of(holder)
            .checked_add(shares)
            .ok_or(ContractError::Overflow("share balance"))?;
        self.total_shares = total;
        self.shares.insert(holder.clone(), balance);
        Ok(())
    }

    fn burn_shares(&mut self, holder: &Address, shares: u64) -> ContractResult<()> {
        let balance = self.balance_of(holder);
        if balance < shares {
            return Err(ContractError::InsufficientBalance {
                holder: holder.clone(),
                balance,
                requested: shares,
            });
        }
        if balance == shares {
            self.shares.remove(holder);
        } else {
            self.shares.insert(holder.clone(), balance - shares);
        }
        self.total_shares -= shares;
        Ok(())
    }
}

impl Governed for Vault {
    fn access(&self) -> &AccessControl {
        &self.access
    }
}

impl Controlled for Vault {}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Calls into a deployed [`Vault`] on behalf of `caller`.
pub struct VaultClient<'a> {
    env: &'a mut Env,
    address: Address,
}

impl<'a> VaultClient<'a> {
    pub fn new(env: &'a mut Env, address: &Address) -> Self {
        Self {
            env,
            address: address.clone(),
        }
    }

    /// Deposits `amount` for the caller. See [`VaultClient::deposit_for`].
    pub fn deposit(&mut self, caller: &Address, amount: u64) -> ContractResult<u64> {
        self.deposit_for(caller, amount, caller)
    }

    /// Pulls `amount` from `caller` (who must have approved the vault) and
    /// mints shares to `beneficiary`. Returns the shares minted.
    ///
    /// # Errors
    ///
    /// [`ContractError::InvalidArgument`] for a zero amount, an empty
    /// beneficiary, a failed strategy arbitrage check, or a deposit too
    /// small to earn one share.
    pub fn deposit_for(
        &mut self,
        caller: &Address,
        amount: u64,
        beneficiary: &Address,
    ) -> ContractResult<u64> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            if amount == 0 {
                return Err(ContractError::invalid("deposit amount must be positive"));
            }
            if beneficiary.is_empty() {
                return Err(ContractError::invalid("beneficiary must not be empty"));
            }
            let vault = env.vault(&address)?;
            if let Some(strategy) = vault.strategy() {
                if !env.strategy(strategy)?.deposit_arb_check(env) {
                    return Err(ContractError::invalid("strategy arbitrage check failed"));
                }
            }

            let total = vault.total_shares();
            let shares = if total == 0 {
                amount
            } else {
                let ubwi = vault.underlying_balance_with_investment(env)?;
                if ubwi == 0 {
                    return Err(ContractError::invalid("outstanding shares have no backing"));
                }
                mul_div(amount, total, ubwi).ok_or(ContractError::Overflow("deposit shares"))?
            };
            if shares == 0 {
                return Err(ContractError::invalid("deposit too small to mint a share"));
            }
            let underlying = vault.underlying().clone();

            env.tokens_mut()
                .transfer_from(&underlying, &address, caller, &address, amount)?;
            env.vault_mut(&address)?.mint_shares(beneficiary, shares)?;

            info!(vault = %address, depositor = %caller, beneficiary = %beneficiary, amount, shares, "deposit");
            env.emit(ContractEvent::Deposit {
                vault: address.clone(),
                depositor: caller.clone(),
                beneficiary: beneficiary.clone(),
                amount,
                shares,
            });
            Ok(shares)
        })
    }

    /// Burns `shares` of the caller's and pays out their underlying value.
    /// Returns the amount paid.
    ///
    /// Any shortfall in idle funds is pulled from the strategy first. If the
    /// strategy delivers less than asked the whole call fails with
    /// [`ContractError::StrategyShortfall`].
    pub fn withdraw(&mut self, caller: &Address, shares: u64) -> ContractResult<u64> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            if shares == 0 {
                return Err(ContractError::invalid("withdraw shares must be positive"));
            }
            let vault = env.vault(&address)?;
            let balance = vault.balance_of(caller);
            if balance < shares {
                return Err(ContractError::InsufficientBalance {
                    holder: caller.clone(),
                    balance,
                    requested: shares,
                });
            }
            let total = vault.total_shares();
            let owed = mul_div(shares, vault.underlying_balance_with_investment(env)?, total)
                .ok_or(ContractError::Overflow("withdraw amount"))?;
            let underlying = vault.underlying().clone();
            let strategy = vault.strategy().cloned();
            let idle = vault.underlying_balance_in_vault(env);

            env.vault_mut(&address)?.burn_shares(caller, shares)?;

            if owed > idle {
                let needed = owed - idle;
                let strategy = strategy
                    .ok_or_else(|| ContractError::invalid("idle balance cannot cover withdrawal"))?;
                env.with_strategy(&strategy, |s, env| {
                    if shares == total {
                        s.withdraw_all_to_vault(env, &address)
                    } else {
                        s.withdraw_to_vault(env, &address, needed)
                    }
                })?;
                let received = env
                    .tokens()
                    .balance_of(&underlying, &address)
                    .saturating_sub(idle);
                if received < needed {
                    return Err(ContractError::StrategyShortfall {
                        strategy,
                        requested: needed,
                        received,
                    });
                }
            }

            env.tokens_mut().transfer(&underlying, &address, caller, owed)?;

            info!(vault = %address, holder = %caller, shares, amount = owed, "withdraw");
            env.emit(ContractEvent::Withdraw {
                vault: address.clone(),
                holder: caller.clone(),
                shares,
                amount: owed,
            });
            Ok(owed)
        })
    }

    /// Moves `shares` from the caller to `to`.
    pub fn transfer_shares(&mut self, caller: &Address, to: &Address, shares: u64) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            if shares == 0 {
                return Err(ContractError::invalid("share amount must be positive"));
            }
            if to.is_empty() {
                return Err(ContractError::invalid("recipient must not be empty"));
            }
            let vault = env.vault_mut(&address)?;
            vault.burn_shares(caller, shares)?;
            vault.mint_shares(to, shares)?;
            debug!(vault = %address, from = %caller, to = %to, shares, "shares transferred");
            env.emit(ContractEvent::SharesTransferred {
                vault: address.clone(),
                from: caller.clone(),
                to: to.clone(),
                shares,
            });
            Ok(())
        })
    }

    /// Tops the strategy up to the invest ratio, then lets it harvest.
    /// Controller or governance. No-op without a strategy.
    pub fn do_hard_work(&mut self, caller: &Address) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            let vault = env.vault(&address)?;
            vault.require_controller_or_governance(env, caller)?;
            let Some(strategy) = vault.strategy().cloned() else {
                debug!(vault = %address, "hard work skipped: no strategy");
                return Ok(());
            };
            invest(env, &address, &strategy)?;
            env.with_strategy(&strategy, |s, env| s.do_hard_work(env, &address))?;
            info!(vault = %address, strategy = %strategy, "hard work done");
            Ok(())
        })
    }

    /// Replaces the active strategy, recalling every unit from the old one
    /// first. Controller or governance.
    ///
    /// # Errors
    ///
    /// - [`ContractError::InvalidArgument`] if `new` is empty or was built
    ///   for another vault or asset.
    /// - [`ContractError::StrategyMigrationFailed`] if the old strategy
    ///   still reports funds after the recall.
    pub fn set_strategy(&mut self, caller: &Address, new: &Address) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            let vault = env.vault(&address)?;
            vault.require_controller_or_governance(env, caller)?;
            if new.is_empty() {
                return Err(ContractError::invalid("strategy must not be empty"));
            }
            let core = env.strategy(new)?.core();
            if core.vault() != &address || core.underlying() != vault.underlying() {
                return Err(ContractError::invalid(format!(
                    "strategy {new} does not serve vault {address}"
                )));
            }
            let previous = vault.strategy().cloned();
            if previous.as_ref() == Some(new) {
                return Ok(());
            }

            if let Some(old) = &previous {
                recall(env, &address, old)?;
                let residual = env.strategy(old)?.invested_underlying_balance(env);
                if residual > 0 {
                    return Err(ContractError::StrategyMigrationFailed {
                        strategy: old.clone(),
                        residual,
                    });
                }
            }

            env.vault_mut(&address)?.strategy = Some(new.clone());
            info!(vault = %address, previous = ?previous, new = %new, "strategy changed");
            env.emit(ContractEvent::StrategyChanged {
                vault: address.clone(),
                previous,
                new: new.clone(),
            });
            Ok(())
        })
    }

    /// Changes the fraction of holdings pushed into the strategy. Governance only.
    pub fn set_invest_ratio(&mut self, caller: &Address, numerator: u64, denominator: u64) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            env.vault(&address)?.require_governance(env, caller)?;
            validate_ratio(numerator, denominator)?;
            let vault = env.vault_mut(&address)?;
            vault.invest_numerator = numerator;
            vault.invest_denominator = denominator;
            info!(vault = %address, numerator, denominator, "invest ratio changed");
            env.emit(ContractEvent::InvestRatioChanged {
                vault: address.clone(),
                numerator,
                denominator,
            });
            Ok(())
        })
    }

    /// Recalls everything from the strategy. Controller or governance.
    pub fn withdraw_all(&mut self, caller: &Address) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            let vault = env.vault(&address)?;
            vault.require_controller_or_governance(env, caller)?;
            match vault.strategy().cloned() {
                Some(strategy) => recall(env, &address, &strategy),
                None => Ok(()),
            }
        })
    }

    /// Recalls everything, then reinvests up to the invest ratio.
    /// Controller or governance.
    pub fn rebalance(&mut self, caller: &Address) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.guarded(&address, |env| {
            let vault = env.vault(&address)?;
            vault.require_controller_or_governance(env, caller)?;
            let Some(strategy) = vault.strategy().cloned() else {
                return Ok(());
            };
            recall(env, &address, &strategy)?;
            invest(env, &address, &strategy)
        })
    }

    /// Points the vault at another registry. Governance of the current
    /// registry only.
    pub fn set_registry(&mut self, caller: &Address, registry: &Address) -> ContractResult<()> {
        access::set_registry(self.env, caller, &self.address, registry)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn balance_of(&self, holder: &Address) -> ContractResult<u64> {
        Ok(self.env.vault(&self.address)?.balance_of(holder))
    }

    pub fn total_shares(&self) -> ContractResult<u64> {
        Ok(self.env.vault(&self.address)?.total_shares())
    }

    pub fn strategy(&self) -> ContractResult<Option<Address>> {
        Ok(self.env.vault(&self.address)?.strategy().cloned())
    }

    pub fn underlying(&self) -> ContractResult<Address> {
        Ok(self.env.vault(&self.address)?.underlying().clone())
    }

    pub fn underlying_balance_in_vault(&self) -> ContractResult<u64> {
        Ok(self.env.vault(&self.address)?.underlying_balance_in_vault(self.env))
    }

    pub fn underlying_balance_with_investment(&self) -> ContractResult<u64> {
        self.env
            .vault(&self.address)?
            .underlying_balance_with_investment(self.env)
    }

    pub fn underlying_balance_with_investment_for_holder(&self, holder: &Address) -> ContractResult<u64> {
        self.env
            .vault(&self.address)?
            .underlying_balance_with_investment_for_holder(self.env, holder)
    }

    pub fn available_to_invest_out(&self) -> ContractResult<u64> {
        self.env.vault(&self.address)?.available_to_invest_out(self.env)
    }

    pub fn price_per_full_share(&self) -> ContractResult<u128> {
        self.env.vault(&self.address)?.price_per_full_share(self.env)
    }
}

/// Pushes the vault's available funds into `strategy` and lets it invest them.
fn invest(env: &mut Env, vault: &Address, strategy: &Address) -> ContractResult<()> {
    let state = env.vault(vault)?;
    let available = state.available_to_invest_out(env)?;
    if available == 0 {
        return Ok(());
    }
    let underlying = state.underlying().clone();
    env.tokens_mut().transfer(&underlying, vault, strategy, available)?;
    env.with_strategy(strategy, |s, env| s.invest_all_underlying(env, vault))?;
    info!(vault = %vault, strategy = %strategy, amount = available, "invested");
    env.emit(ContractEvent::Invested {
        vault: vault.clone(),
        strategy: strategy.clone(),
        amount: available,
    });
    Ok(())
}

/// Has `strategy` return everything to the vault.
fn recall(env: &mut Env, vault: &Address, strategy: &Address) -> ContractResult<()> {
    let state = env.vault(vault)?;
    let before = state.underlying_balance_in_vault(env);
    let underlying = state.underlying().clone();
    env.with_strategy(strategy, |s, env| s.withdraw_all_to_vault(env, vault))?;
    let amount = env
        .tokens()
        .balance_of(&underlying, vault)
        .saturating_sub(before);
    info!(vault = %vault, strategy = %strategy, amount, "funds recalled");
    env.emit(ContractEvent::FundsRecalled {
        vault: vault.clone(),
        strategy: strategy.clone(),
        amount,
    });
    Ok(())
}

fn validate_ratio(numerator: u64, denominator: u64) -> ContractResult<()> {
    if denominator == 0 || numerator > denominator {
        return Err(ContractError::invalid(format!(
            "invest ratio {numerator}/{denominator} must satisfy 0 <= numerator <= denominator, denominator > 0"
        )));
    }
    Ok(())
}
