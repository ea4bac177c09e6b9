//! A strategy whose holdings grow on every hard work.
//!
//! Yield is minted directly into the strategy, so it must be a minter of the
//! underlying asset. A share of each harvest is handed to the controller
//! through [`ControllerClient::notify_fee`], which forwards it to the fee
//! reward forwarder; the remainder stays invested and lifts the vault's
//! price per full share. Without a controller contract behind the registry
//! no fee is taken.

use granary_protocol::config::{
    BPS_DENOMINATOR, DEFAULT_PROFIT_SHARING_DENOMINATOR, DEFAULT_PROFIT_SHARING_NUMERATOR,
};
use granary_protocol::math::{bps_of, mul_div};
use granary_protocol::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Strategy, StrategyCore};
use crate::access::Controlled;
use crate::controller::ControllerClient;
use crate::env::Env;
use crate::error::{ContractError, ContractResult};
use crate::events::ContractEvent;

/// Mints `profit_bps` of its holdings as yield on each hard work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitStrategy {
    core: StrategyCore,
    profit_bps: u64,
    profit_sharing_numerator: u64,
    profit_sharing_denominator: u64,
}

impl ProfitStrategy {
    /// Deploys a profit strategy for `vault` with the default 30/100 profit
    /// sharing.
    ///
    /// The fee is paid to the controller contract named by the registry; if
    /// the registry's controller is not a deployed controller the fee is
    /// skipped on each harvest.
    ///
    /// # Errors
    ///
    /// [`ContractError::InvalidArgument`] if `profit_bps` exceeds 100%.
    pub fn deploy(
        env: &mut Env,
        registry: &Address,
        vault: &Address,
        profit_bps: u64,
    ) -> ContractResult<Address> {
        if profit_bps > BPS_DENOMINATOR {
            return Err(ContractError::invalid(format!(
                "profit of {profit_bps} bps exceeds {BPS_DENOMINATOR}"
            )));
        }
        let core = StrategyCore::new(env, registry, vault)?;
        env.install_strategy(Box::new(ProfitStrategy {
            core,
            profit_bps,
            profit_sharing_numerator: DEFAULT_PROFIT_SHARING_NUMERATOR,
            profit_sharing_denominator: DEFAULT_PROFIT_SHARING_DENOMINATOR,
        }))
    }

    /// Yield per hard work, in basis points of holdings.
    pub fn profit_bps(&self) -> u64 {
        self.profit_bps
    }

    /// Hands `fee` to the registry's controller and returns what was paid.
    ///
    /// When no controller contract is deployed at that identity (a registry
    /// whose controller is a plain account) nothing is paid and the whole
    /// profit stays invested.
    fn share_profit(&self, env: &mut Env, fee: u64) -> ContractResult<u64> {
        let address = self.core.address().clone();
        let underlying = self.core.underlying().clone();
        let controller = self.core.controller(env)?;
        if env.controller(&controller).is_err() {
            debug!(
                strategy = %address,
                controller = %controller,
                fee,
                "no controller contract, fee kept"
            );
            return Ok(0);
        }
        env.tokens_mut().approve(&underlying, &address, &controller, fee)?;
        ControllerClient::new(env, &controller).notify_fee(&address, &underlying, fee)?;
        Ok(fee)
    }
}

impl Strategy for ProfitStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        "profit"
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }

    fn do_hard_work(&mut self, env: &mut Env, caller: &Address) -> ContractResult<()> {
        self.core.require_restricted(env, caller)?;

        let holdings = self.core.idle_balance(env);
        let profit = bps_of(holdings, self.profit_bps).ok_or(ContractError::Overflow("profit"))?;
        if profit == 0 {
            return Ok(());
        }

        let address = self.core.address().clone();
        let underlying = self.core.underlying().clone();
        env.tokens_mut().mint(&underlying, &address, &address, profit)?;

        let fee = mul_div(
            profit,
            self.profit_sharing_numerator,
            self.profit_sharing_denominator,
        )
        .ok_or(ContractError::Overflow("profit sharing"))?;
        let fee = if fee > 0 { self.share_profit(env, fee)? } else { 0 };

        info!(strategy = %address, profit, fee, "harvested");
        env.emit(ContractEvent::Harvested {
            strategy: address,
            profit,
            fee,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PermissionRegistry;
    use crate::vault::{Vault, VaultClient};

    #[test]
    fn rejects_profit_above_one_hundred_percent() {
        let mut env = Env::new();
        let gov = Address::new("gov");
        let registry = PermissionRegistry::deploy(&mut env, &gov, &gov).unwrap();
        let token = env.tokens_mut().create_token(&gov, "USD", "usd", 6).unwrap();
        let vault = Vault::deploy(&mut env, &registry, &token, 100, 100).unwrap();

        let result = ProfitStrategy::deploy(&mut env, &registry, &vault, BPS_DENOMINATOR + 1);
        assert!(matches!(result, Err(ContractError::InvalidArgument(_))));
    }

    #[test]
    fn empty_strategy_harvests_nothing() {
        let mut env = Env::new();
        let gov = Address::new("gov");
        let registry = PermissionRegistry::deploy(&mut env, &gov, &gov).unwrap();
        let token = env.tokens_mut().create_token(&gov, "USD", "usd", 6).unwrap();
        let vault = Vault::deploy(&mut env, &registry, &token, 100, 100).unwrap();
        let strategy = ProfitStrategy::deploy(&mut env, &registry, &vault, 500).unwrap();

        env.with_strategy(&strategy, |s, env| s.do_hard_work(env, &gov))
            .unwrap();
        assert_eq!(env.tokens().total_supply(&token), 0);
    }

    #[test]
    fn fee_is_kept_without_a_controller_contract() {
        let mut env = Env::new();
        let gov = Address::new("gov");
        // The registry names governance as controller; no controller is deployed.
        let registry = PermissionRegistry::deploy(&mut env, &gov, &gov).unwrap();
        let token = env.tokens_mut().create_token(&gov, "USD", "usd", 6).unwrap();
        let vault = Vault::deploy(&mut env, &registry, &token, 100, 100).unwrap();
        let strategy = ProfitStrategy::deploy(&mut env, &registry, &vault, 1_000).unwrap();
        env.tokens_mut().add_minter(&token, &gov, &strategy).unwrap();
        env.tokens_mut().mint(&token, &gov, &strategy, 1_000).unwrap();

        VaultClient::new(&mut env, &vault).set_strategy(&gov, &strategy).unwrap();
        VaultClient::new(&mut env, &vault).do_hard_work(&gov).unwrap();

        assert_eq!(env.tokens().balance_of(&token, &strategy), 1_100);
        assert_eq!(env.tokens().balance_of(&token, &gov), 0);
        let harvested = env.events().iter().any(|r| {
            matches!(
                r.event,
                ContractEvent::Harvested { profit: 100, fee: 0, .. }
            )
        });
        assert!(harvested);
    }
}
