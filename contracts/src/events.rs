//! # Contract Events
//!
//! Every state-changing entry point appends an [`EventRecord`] to the
//! environment's log. Events live in the same storage as contract state, so a
//! reverted call leaves no events behind.

use chrono::{DateTime, Utc};
use granary_protocol::Address;
use serde::{Deserialize, Serialize};

/// A single state transition, as seen by indexers and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContractEvent {
    /// A permission registry was deployed.
    RegistryDeployed {
        registry: Address,
        governance: Address,
        controller: Address,
    },
    /// Governance authority moved to a new identity.
    GovernanceChanged {
        registry: Address,
        previous: Address,
        new: Address,
    },
    /// The controller identity was replaced.
    ControllerChanged {
        registry: Address,
        previous: Address,
        new: Address,
    },
    /// A component was re-pointed at a different registry.
    RegistryRebound {
        component: Address,
        previous: Address,
        new: Address,
    },
    /// A vault was deployed.
    VaultDeployed {
        vault: Address,
        underlying: Address,
        numerator: u64,
        denominator: u64,
    },
    /// Underlying entered a vault and shares were minted.
    Deposit {
        vault: Address,
        depositor: Address,
        beneficiary: Address,
        amount: u64,
        shares: u64,
    },
    /// Shares were burnt and underlying paid out.
    Withdraw {
        vault: Address,
        holder: Address,
        shares: u64,
        amount: u64,
    },
    /// Shares moved between holders.
    SharesTransferred {
        vault: Address,
        from: Address,
        to: Address,
        shares: u64,
    },
    /// The vault's active strategy changed.
    StrategyChanged {
        vault: Address,
        previous: Option<Address>,
        new: Address,
    },
    /// Idle vault funds were pushed into the strategy.
    Invested {
        vault: Address,
        strategy: Address,
        amount: u64,
    },
    /// All strategy funds were recalled to the vault.
    FundsRecalled {
        vault: Address,
        strategy: Address,
        amount: u64,
    },
    /// The vault's investment ratio changed.
    InvestRatioChanged {
        vault: Address,
        numerator: u64,
        denominator: u64,
    },
    /// A controller was deployed.
    ControllerDeployed {
        controller: Address,
        fee_reward_forwarder: Address,
    },
    /// A vault/strategy pair was approved.
    VaultAdded {
        controller: Address,
        vault: Address,
        strategy: Address,
    },
    /// A hard worker was allow-listed.
    HardWorkerAdded { controller: Address, worker: Address },
    /// A hard worker was removed from the allow-list.
    HardWorkerRemoved { controller: Address, worker: Address },
    /// Fee routing destination changed.
    FeeRewardForwarderChanged {
        controller: Address,
        forwarder: Address,
    },
    /// Hard-rewards pool changed (or was cleared).
    HardRewardsChanged {
        controller: Address,
        pool: Option<Address>,
    },
    /// Outcome of a controller-driven hard work.
    SharePriceChanged {
        vault: Address,
        strategy: Option<Address>,
        old_price: u128,
        new_price: u128,
    },
    /// A hard worker earned a reward from the hard-rewards pool.
    HardRewardsNotified {
        pool: Address,
        worker: Address,
        vault: Address,
    },
    /// Harvest fees were forwarded to the fee reward forwarder.
    FeeForwarded {
        controller: Address,
        from: Address,
        token: Address,
        forwarder: Address,
        amount: u64,
    },
    /// Mistakenly sent tokens were recovered.
    Salvaged {
        contract: Address,
        token: Address,
        recipient: Address,
        amount: u64,
    },
    /// A strategy was deployed for a vault.
    StrategyDeployed {
        strategy: Address,
        vault: Address,
        kind: String,
    },
    /// A strategy harvested yield.
    Harvested {
        strategy: Address,
        profit: u64,
        fee: u64,
    },
    /// A strategy realized a loss.
    LossRealized { strategy: Address, amount: u64 },
}

/// A logged event with its position and wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the environment's log, starting at 0.
    pub sequence: u64,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub event: ContractEvent,
}
