//! Integration tests for failure handling.
//!
//! Misbehaving strategies are plugged in through the public [`Strategy`]
//! trait: one that re-enters its vault, one that refuses to hand back all of
//! its funds. Every failure must leave the environment exactly as it was.

mod common;

use granary_contracts::{
    ContractError, ContractResult, Env, LossyStrategy, NoopStrategy, Strategy, StrategyCore,
    VaultClient,
};
use granary_protocol::Address;

// ---------------------------------------------------------------------------
// Test Doubles
// ---------------------------------------------------------------------------

/// Calls back into its own vault during hard work.
#[derive(Debug, Clone)]
struct ReentrantStrategy {
    core: StrategyCore,
    depositor: Address,
}

impl Strategy for ReentrantStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        "reentrant"
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }

    fn do_hard_work(&mut self, env: &mut Env, _caller: &Address) -> ContractResult<()> {
        let vault = self.core.vault().clone();
        VaultClient::new(env, &vault).deposit(&self.depositor, 1)?;
        Ok(())
    }
}

/// Only ever returns half of what it holds.
#[derive(Debug, Clone)]
struct StickyStrategy {
    core: StrategyCore,
}

impl Strategy for StickyStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        "sticky"
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }

    fn withdraw_all_to_vault(&mut self, env: &mut Env, caller: &Address) -> ContractResult<()> {
        self.core.require_restricted(env, caller)?;
        let half = self.core.idle_balance(env) / 2;
        self.core.send_to_vault(env, half)
    }

    fn do_hard_work(&mut self, env: &mut Env, caller: &Address) -> ContractResult<()> {
        self.core.require_restricted(env, caller)
    }
}

// ---------------------------------------------------------------------------
// Reentrancy
// ---------------------------------------------------------------------------

#[test]
fn strategy_reentering_its_vault_is_rejected() {
    let mut d = common::deploy(100, 100);
    let alice = Address::new("alice");
    d.deposit(&alice, 1_000);
    d.fund(&alice, 1);

    let core = StrategyCore::new(&d.env, &d.registry, &d.vault).unwrap();
    let strategy = d
        .env
        .install_strategy(Box::new(ReentrantStrategy {
            core,
            depositor: alice.clone(),
        }))
        .unwrap();
    d.approve_strategy(&strategy);

    let before = d.env.snapshot().unwrap().digest().unwrap();
    let events = d.env.events().len();

    let (gov, vault) = (d.gov.clone(), d.vault.clone());
    let result = d.controller().do_hard_work(&gov, &vault);
    assert_eq!(result, Err(ContractError::Reentrant(vault.clone())));

    // The invest transfer that preceded the callback was rolled back too.
    assert_eq!(d.balance(&strategy), 0);
    assert_eq!(d.vault().total_shares().unwrap(), 1_000);
    assert_eq!(d.env.snapshot().unwrap().digest().unwrap(), before);
    assert_eq!(d.env.events().len(), events);
    assert!(!d.env.is_entered(&vault));
}

// ---------------------------------------------------------------------------
// Migration Failure
// ---------------------------------------------------------------------------

#[test]
fn incomplete_recall_aborts_migration() {
    let mut d = common::deploy(100, 100);
    d.deposit(&Address::new("alice"), 1_000);

    let core = StrategyCore::new(&d.env, &d.registry, &d.vault).unwrap();
    let sticky = d
        .env
        .install_strategy(Box::new(StickyStrategy { core }))
        .unwrap();
    let replacement = NoopStrategy::deploy(&mut d.env, &d.registry, &d.vault).unwrap();
    d.approve_strategy(&sticky);

    let (gov, vault) = (d.gov.clone(), d.vault.clone());
    d.controller().do_hard_work(&gov, &vault).unwrap();
    assert_eq!(d.balance(&sticky), 1_000);

    let result = d.controller().set_vault_strategy(&gov, &vault, &replacement);
    assert_eq!(
        result,
        Err(ContractError::StrategyMigrationFailed {
            strategy: sticky.clone(),
            residual: 500,
        })
    );

    // Nothing moved: the partial recall was rolled back with the rest.
    assert_eq!(d.balance(&sticky), 1_000);
    assert_eq!(d.vault().underlying_balance_in_vault().unwrap(), 0);
    assert_eq!(d.vault().strategy().unwrap(), Some(sticky.clone()));
    assert_eq!(d.controller().strategy_of(&vault).unwrap(), Some(sticky));
}

// ---------------------------------------------------------------------------
// Withdrawal Shortfall
// ---------------------------------------------------------------------------

#[test]
fn short_paying_strategy_aborts_partial_withdrawal() {
    let mut d = common::deploy(100, 100);
    let sink = Address::new("sink");
    let strategy =
        LossyStrategy::deploy(&mut d.env, &d.registry, &d.vault, &sink, 0, 100).unwrap();
    d.approve_strategy(&strategy);

    let alice = Address::new("alice");
    let bob = Address::new("bob");
    d.deposit(&alice, 1_000);
    d.deposit(&bob, 1_000);
    let (gov, vault) = (d.gov.clone(), d.vault.clone());
    d.controller().do_hard_work(&gov, &vault).unwrap();

    let result = d.vault().withdraw(&alice, 500);
    assert_eq!(
        result,
        Err(ContractError::StrategyShortfall {
            strategy: strategy.clone(),
            requested: 500,
            received: 495,
        })
    );
    assert_eq!(d.vault().balance_of(&alice).unwrap(), 1_000);
    assert_eq!(d.balance(&alice), 0);
    assert_eq!(d.balance(&sink), 0);
}

#[test]
fn full_redemption_is_never_charged() {
    let mut d = common::deploy(100, 100);
    let sink = Address::new("sink");
    let strategy =
        LossyStrategy::deploy(&mut d.env, &d.registry, &d.vault, &sink, 0, 100).unwrap();
    d.approve_strategy(&strategy);

    let alice = Address::new("alice");
    d.deposit(&alice, 1_000);
    let (gov, vault) = (d.gov.clone(), d.vault.clone());
    d.controller().do_hard_work(&gov, &vault).unwrap();

    assert_eq!(d.vault().withdraw(&alice, 1_000).unwrap(), 1_000);
    assert_eq!(d.balance(&alice), 1_000);
}

// ---------------------------------------------------------------------------
// Rollback
// ---------------------------------------------------------------------------

#[test]
fn failed_deposit_leaves_no_trace() {
    let mut d = common::deploy(95, 100);
    let alice = Address::new("alice");
    let (token, gov) = (d.token.clone(), d.gov.clone());
    d.env.tokens_mut().mint(&token, &gov, &alice, 100).unwrap();
    let events = d.env.events().len();

    // No allowance granted.
    let result = d.vault().deposit(&alice, 100);
    assert!(matches!(result, Err(ContractError::Token(_))));
    assert_eq!(d.vault().total_shares().unwrap(), 0);
    assert_eq!(d.balance(&alice), 100);
    assert_eq!(d.env.events().len(), events);
}

#[test]
fn deposit_too_small_for_one_share_is_refused() {
    let mut d = common::deploy(95, 100);
    let alice = Address::new("alice");
    d.deposit(&alice, 10);

    // A donation straight to the vault lifts the value of each share to 11.
    let (token, gov, vault) = (d.token.clone(), d.gov.clone(), d.vault.clone());
    d.env.tokens_mut().mint(&token, &gov, &vault, 100).unwrap();

    let bob = Address::new("bob");
    d.fund(&bob, 5);
    assert!(matches!(
        d.vault().deposit(&bob, 5),
        Err(ContractError::InvalidArgument(_))
    ));
    assert_eq!(d.balance(&bob), 5);
    assert_eq!(d.deposit(&bob, 11), 1);
}
