//! # Scenarios
//!
//! A scenario is a JSON document that describes one vault deployment and a
//! sequence of calls against it. The runner deploys a fresh environment,
//! funds the listed holders, replays every step, and returns a report with
//! the per-step outcomes plus the final ledger snapshot and its digest.
//!
//! Failing steps do not stop the run. Each contract call is atomic, so a
//! failure leaves the environment untouched and the next step proceeds from
//! the same state.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use granary_contracts::{
    ContractResult, Controller, ControllerClient, Env, EventRecord, LedgerSnapshot,
    LossyStrategy, NoopStrategy, PermissionRegistry, ProfitStrategy, RegistryClient, Vault,
    VaultClient,
};
use granary_protocol::config::{
    DEFAULT_INVEST_DENOMINATOR, DEFAULT_INVEST_NUMERATOR, DEFAULT_TOKEN_DECIMALS,
};
use granary_protocol::Address;

use crate::metrics::RunMetrics;

// ---------------------------------------------------------------------------
// Scenario Document
// ---------------------------------------------------------------------------

/// A complete scenario: deployment parameters plus the steps to replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Governance identity. Also administers the underlying asset.
    pub governance: Address,
    #[serde(default = "default_forwarder")]
    pub fee_reward_forwarder: Address,
    pub token: TokenSpec,
    #[serde(default)]
    pub invest_ratio: InvestRatio,
    pub strategy: StrategySpec,
    /// Underlying minted to each holder before the first step.
    #[serde(default)]
    pub balances: BTreeMap<Address, u64>,
    #[serde(default)]
    pub hard_workers: Vec<Address>,
    #[serde(default)]
    pub hard_rewards: Option<Address>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// The underlying asset to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpec {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestRatio {
    pub numerator: u64,
    pub denominator: u64,
}

impl Default for InvestRatio {
    fn default() -> Self {
        Self {
            numerator: DEFAULT_INVEST_NUMERATOR,
            denominator: DEFAULT_INVEST_DENOMINATOR,
        }
    }
}

/// Which reference strategy to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySpec {
    /// Holds funds idle.
    Noop,
    /// Mints `profit_bps` of its holdings on every hard work.
    Profit { profit_bps: u64 },
    /// Loses `loss_bps` per hard work and charges `withdrawal_fee_bps` on
    /// partial withdrawals. Both go to `sink`.
    Lossy {
        sink: Address,
        loss_bps: u64,
        #[serde(default)]
        withdrawal_fee_bps: u64,
    },
}

impl StrategySpec {
    fn deploy(
        &self,
        env: &mut Env,
        registry: &Address,
        vault: &Address,
        minter_admin: &Address,
    ) -> ContractResult<Address> {
        match self {
            StrategySpec::Noop => NoopStrategy::deploy(env, registry, vault),
            StrategySpec::Profit { profit_bps } => {
                let strategy = ProfitStrategy::deploy(env, registry, vault, *profit_bps)?;
                let underlying = env.vault(vault)?.underlying().clone();
                env.tokens_mut()
                    .add_minter(&underlying, minter_admin, &strategy)?;
                Ok(strategy)
            }
            StrategySpec::Lossy {
                sink,
                loss_bps,
                withdrawal_fee_bps,
            } => LossyStrategy::deploy(env, registry, vault, sink, *loss_bps, *withdrawal_fee_bps),
        }
    }
}

/// A single call replayed against the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Approves the vault for `amount` and deposits it.
    Deposit { from: Address, amount: u64 },
    /// Deposits on behalf of `beneficiary`.
    DepositFor {
        from: Address,
        beneficiary: Address,
        amount: u64,
    },
    Withdraw { from: Address, shares: u64 },
    TransferShares {
        from: Address,
        to: Address,
        shares: u64,
    },
    /// Controller-driven hard work. Runs as governance when `caller` is omitted.
    HardWork {
        #[serde(default)]
        caller: Option<Address>,
    },
    AddHardWorker { worker: Address },
    RemoveHardWorker { worker: Address },
    SetInvestRatio { numerator: u64, denominator: u64 },
    Rebalance,
    WithdrawAll,
    /// Deploys a new strategy and moves the vault onto it.
    Migrate { strategy: StrategySpec },
}

impl Step {
    /// Short name used in reports and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Deposit { .. } => "deposit",
            Step::DepositFor { .. } => "deposit_for",
            Step::Withdraw { .. } => "withdraw",
            Step::TransferShares { .. } => "transfer_shares",
            Step::HardWork { .. } => "hard_work",
            Step::AddHardWorker { .. } => "add_hard_worker",
            Step::RemoveHardWorker { .. } => "remove_hard_worker",
            Step::SetInvestRatio { .. } => "set_invest_ratio",
            Step::Rebalance => "rebalance",
            Step::WithdrawAll => "withdraw_all",
            Step::Migrate { .. } => "migrate",
        }
    }
}

fn default_forwarder() -> Address {
    Address::new("fee-forwarder")
}

fn default_decimals() -> u8 {
    DEFAULT_TOKEN_DECIMALS
}

impl Scenario {
    /// Reads and parses a scenario file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    /// Writes the scenario as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to encode scenario")?;
        fs::write(path, json + "\n")
            .with_context(|| format!("failed to write scenario {}", path.display()))
    }

    /// A small but complete scenario: two depositors, a profitable strategy,
    /// a keeper, and a migration to an idle strategy at the end.
    pub fn sample() -> Self {
        let alice = Address::new("alice");
        let bob = Address::new("bob");
        let keeper = Address::new("keeper");

        Self {
            governance: Address::new("governance"),
            fee_reward_forwarder: default_forwarder(),
            token: TokenSpec {
                name: "Granary Dollar".into(),
                symbol: "GUSD".into(),
                decimals: 6,
            },
            invest_ratio: InvestRatio::default(),
            strategy: StrategySpec::Profit { profit_bps: 100 },
            balances: BTreeMap::from([(alice.clone(), 1_000_000), (bob.clone(), 500_000)]),
            hard_workers: vec![keeper.clone()],
            hard_rewards: None,
            steps: vec![
                Step::Deposit {
                    from: alice.clone(),
                    amount: 1_000_000,
                },
                Step::Deposit {
                    from: bob.clone(),
                    amount: 500_000,
                },
                Step::HardWork {
                    caller: Some(keeper),
                },
                Step::Withdraw {
                    from: bob.clone(),
                    shares: 250_000,
                },
                Step::TransferShares {
                    from: bob,
                    to: alice.clone(),
                    shares: 250_000,
                },
                Step::HardWork { caller: None },
                Step::Migrate {
                    strategy: StrategySpec::Noop,
                },
                Step::Withdraw {
                    from: alice,
                    shares: 1_250_000,
                },
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Result of one replayed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: &'static str,
    /// Shares minted, underlying paid out, or the new share price,
    /// depending on the action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything `granary run` prints.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub registry: Address,
    pub controller: Address,
    pub vault: Address,
    pub steps: Vec<StepOutcome>,
    pub snapshot: LedgerSnapshot,
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventRecord>>,
}

impl ScenarioReport {
    /// Number of steps that returned an error.
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| !s.is_ok()).count()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

struct Deployment {
    governance: Address,
    registry: Address,
    controller: Address,
    vault: Address,
    token: Address,
}

/// Deploys the scenario's contracts and replays its steps.
///
/// # Errors
///
/// Only deployment failures are returned. Step failures are recorded in
/// the report and counted in `failed_steps_total`.
pub fn run(
    scenario: &Scenario,
    metrics: &RunMetrics,
    include_events: bool,
) -> anyhow::Result<ScenarioReport> {
    let mut env = Env::new();
    let d = deploy(&mut env, scenario).context("failed to deploy scenario contracts")?;
    info!(vault = %d.vault, controller = %d.controller, "scenario deployed");

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let action = step.name();
        let outcome = match apply(&mut env, &d, step) {
            Ok(value) => {
                record_success(metrics, step);
                info!(index, action, ?value, "step applied");
                StepOutcome {
                    index,
                    action,
                    value,
                    error: None,
                }
            }
            Err(e) => {
                metrics.failed_steps_total.inc();
                warn!(index, action, error = %e, "step failed");
                StepOutcome {
                    index,
                    action,
                    value: None,
                    error: Some(e.to_string()),
                }
            }
        };
        steps.push(outcome);
        observe_vault(&env, &d.vault, metrics);
    }

    let snapshot = env.snapshot().context("failed to snapshot ledger")?;
    let digest = snapshot.digest().context("failed to digest snapshot")?;
    info!(digest = %digest, steps = steps.len(), "scenario complete");

    Ok(ScenarioReport {
        registry: d.registry,
        controller: d.controller,
        vault: d.vault,
        steps,
        snapshot,
        digest,
        events: include_events.then(|| env.events().to_vec()),
    })
}

fn deploy(env: &mut Env, scenario: &Scenario) -> ContractResult<Deployment> {
    let gov = scenario.governance.clone();

    let registry = PermissionRegistry::deploy(env, &gov, &gov)?;
    let controller = Controller::deploy(env, &registry, &scenario.fee_reward_forwarder)?;
    RegistryClient::new(env, &registry).set_controller(&gov, &controller)?;

    let token = env.tokens_mut().create_token(
        &gov,
        scenario.token.name.as_str(),
        scenario.token.symbol.as_str(),
        scenario.token.decimals,
    )?;
    for (holder, amount) in &scenario.balances {
        env.tokens_mut().mint(&token, &gov, holder, *amount)?;
    }

    let vault = Vault::deploy(
        env,
        &registry,
        &token,
        scenario.invest_ratio.numerator,
        scenario.invest_ratio.denominator,
    )?;
    let strategy = scenario.strategy.deploy(env, &registry, &vault, &gov)?;

    let mut client = ControllerClient::new(env, &controller);
    client.add_vault_and_strategy(&gov, &vault, &strategy)?;
    for worker in &scenario.hard_workers {
        client.add_hard_worker(&gov, worker)?;
    }
    if let Some(pool) = &scenario.hard_rewards {
        client.set_hard_rewards(&gov, Some(pool))?;
    }

    Ok(Deployment {
        governance: gov,
        registry,
        controller,
        vault,
        token,
    })
}

fn apply(env: &mut Env, d: &Deployment, step: &Step) -> ContractResult<Option<u128>> {
    let gov = &d.governance;
    match step {
        Step::Deposit { from, amount } => {
            env.tokens_mut().approve(&d.token, from, &d.vault, *amount)?;
            VaultClient::new(env, &d.vault)
                .deposit(from, *amount)
                .map(|shares| Some(shares.into()))
        }
        Step::DepositFor {
            from,
            beneficiary,
            amount,
        } => {
            env.tokens_mut().approve(&d.token, from, &d.vault, *amount)?;
            VaultClient::new(env, &d.vault)
                .deposit_for(from, *amount, beneficiary)
                .map(|shares| Some(shares.into()))
        }
        Step::Withdraw { from, shares } => {
            VaultClient::new(env, &d.vault)
                .withdraw(from, *shares)
                .map(|paid| Some(paid.into()))
        }
        Step::TransferShares { from, to, shares } => {
            VaultClient::new(env, &d.vault).transfer_shares(from, to, *shares)?;
            Ok(None)
        }
        Step::HardWork { caller } => {
            let caller = caller.as_ref().unwrap_or(gov);
            let (_, new_price) =
                ControllerClient::new(env, &d.controller).do_hard_work(caller, &d.vault)?;
            Ok(Some(new_price))
        }
        Step::AddHardWorker { worker } => {
            ControllerClient::new(env, &d.controller).add_hard_worker(gov, worker)?;
            Ok(None)
        }
        Step::RemoveHardWorker { worker } => {
            ControllerClient::new(env, &d.controller).remove_hard_worker(gov, worker)?;
            Ok(None)
        }
        Step::SetInvestRatio {
            numerator,
            denominator,
        } => {
            VaultClient::new(env, &d.vault).set_invest_ratio(gov, *numerator, *denominator)?;
            Ok(None)
        }
        Step::Rebalance => {
            VaultClient::new(env, &d.vault).rebalance(gov)?;
            Ok(None)
        }
        Step::WithdrawAll => {
            VaultClient::new(env, &d.vault).withdraw_all(gov)?;
            Ok(None)
        }
        Step::Migrate { strategy } => {
            let next = strategy.deploy(env, &d.registry, &d.vault, gov)?;
            ControllerClient::new(env, &d.controller).set_vault_strategy(gov, &d.vault, &next)?;
            Ok(None)
        }
    }
}

fn record_success(metrics: &RunMetrics, step: &Step) {
    match step {
        Step::Deposit { .. } | Step::DepositFor { .. } => metrics.deposits_total.inc(),
        Step::Withdraw { .. } => metrics.withdrawals_total.inc(),
        Step::HardWork { .. } => metrics.hard_works_total.inc(),
        Step::Migrate { .. } => metrics.strategy_migrations_total.inc(),
        _ => {}
    }
}

fn observe_vault(env: &Env, vault: &Address, metrics: &RunMetrics) {
    let Ok(vault) = env.vault(vault) else {
        return;
    };
    metrics
        .total_shares
        .set(i64::try_from(vault.total_shares()).unwrap_or(i64::MAX));
    if let Ok(price) = vault.price_per_full_share(env) {
        metrics
            .price_per_full_share
            .set(i64::try_from(price).unwrap_or(i64::MAX));
    }
}
