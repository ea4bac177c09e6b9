//! A strategy that loses money.
//!
//! Each hard work sends `loss_bps` of its holdings to a sink, and partial
//! withdrawals are charged `withdrawal_fee_bps`, so the vault receives less
//! than it asked for. Full withdrawals are never charged: a migration must
//! be able to empty the strategy.

use granary_protocol::config::BPS_DENOMINATOR;
use granary_protocol::math::bps_of;
use granary_protocol::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Strategy, StrategyCore};
use crate::env::Env;
use crate::error::{ContractError, ContractResult};
use crate::events::ContractEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossyStrategy {
    core: StrategyCore,
    sink: Address,
    loss_bps: u64,
    withdrawal_fee_bps: u64,
}

impl LossyStrategy {
    /// Deploys a lossy strategy for `vault`. Lost funds and withdrawal fees
    /// go to `sink`.
    pub fn deploy(
        env: &mut Env,
        registry: &Address,
        vault: &Address,
        sink: &Address,
        loss_bps: u64,
        withdrawal_fee_bps: u64,
    ) -> ContractResult<Address> {
        if sink.is_empty() {
            return Err(ContractError::invalid("loss sink must not be empty"));
        }
        if loss_bps > BPS_DENOMINATOR || withdrawal_fee_bps > BPS_DENOMINATOR {
            return Err(ContractError::invalid(format!(
                "basis points must not exceed {BPS_DENOMINATOR}"
            )));
        }
        let core = StrategyCore::new(env, registry, vault)?;
        env.install_strategy(Box::new(LossyStrategy {
            core,
            sink: sink.clone(),
            loss_bps,
            withdrawal_fee_bps,
        }))
    }

    fn send_to_sink(&self, env: &mut Env, amount: u64) -> ContractResult<()> {
        env.tokens_mut().transfer(
            self.core.underlying(),
            self.core.address(),
            &self.sink,
            amount,
        )?;
        Ok(())
    }
}

impl Strategy for LossyStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        "lossy"
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }

    fn withdraw_to_vault(
        &mut self,
        env: &mut Env,
        caller: &Address,
        amount: u64,
    ) -> ContractResult<()> {
        self.core.require_restricted(env, caller)?;
        let gross = amount.min(self.core.idle_balance(env));
        let fee = bps_of(gross, self.withdrawal_fee_bps).ok_or(ContractError::Overflow("withdrawal fee"))?;
        self.send_to_sink(env, fee)?;
        self.core.send_to_vault(env, gross - fee)
    }

    fn do_hard_work(&mut self, env: &mut Env, caller: &Address) -> ContractResult<()> {
        self.core.require_restricted(env, caller)?;
        let loss = bps_of(self.core.idle_balance(env), self.loss_bps)
            .ok_or(ContractError::Overflow("loss"))?;
        if loss == 0 {
            return Ok(());
        }
        self.send_to_sink(env, loss)?;
        info!(strategy = %self.core.address(), loss, "loss realized");
        env.emit(ContractEvent::LossRealized {
            strategy: self.core.address().clone(),
            amount: loss,
        });
        Ok(())
    }
}
