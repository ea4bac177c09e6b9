//! A strategy that holds funds and does nothing with them.

use granary_protocol::Address;
use serde::{Deserialize, Serialize};

use super::{Strategy, StrategyCore};
use crate::env::Env;
use crate::error::ContractResult;

/// Keeps invested funds idle at its own address. No yield, no loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoopStrategy {
    core: StrategyCore,
}

impl NoopStrategy {
    /// Deploys a no-op strategy for `vault` and returns its address.
    pub fn deploy(env: &mut Env, registry: &Address, vault: &Address) -> ContractResult<Address> {
        let core = StrategyCore::new(env, registry, vault)?;
        env.install_strategy(Box::new(NoopStrategy { core }))
    }
}

impl Strategy for NoopStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        "noop"
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }

    fn do_hard_work(&mut self, env: &mut Env, caller: &Address) -> ContractResult<()> {
        self.core.require_restricted(env, caller)
    }
}
