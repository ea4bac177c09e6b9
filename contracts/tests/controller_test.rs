//! Integration tests for the controller and the permission registry.
//!
//! Hard-worker gating, vault approval, salvage, and governance handover as
//! seen by every component that shares the registry.

mod common;

use granary_contracts::{
    ContractError, ContractEvent, NoopStrategy, PermissionRegistry, RegistryClient, Role,
};
use granary_protocol::Address;

// ---------------------------------------------------------------------------
// Hard Work Gating
// ---------------------------------------------------------------------------

#[test]
fn hard_worker_allow_list_flow() {
    let mut d = common::deploy(95, 100);
    let strategy = NoopStrategy::deploy(&mut d.env, &d.registry, &d.vault).unwrap();
    d.approve_strategy(&strategy);
    let (gov, vault) = (d.gov.clone(), d.vault.clone());
    let bot = Address::new("keeper-bot");

    let result = d.controller().do_hard_work(&bot, &vault);
    assert!(matches!(
        result,
        Err(ContractError::Unauthorized {
            role: Role::HardWorkerOrGovernance,
            ..
        })
    ));

    d.controller().add_hard_worker(&gov, &bot).unwrap();
    d.controller().do_hard_work(&bot, &vault).unwrap();

    d.controller().remove_hard_worker(&gov, &bot).unwrap();
    assert!(matches!(
        d.controller().do_hard_work(&bot, &vault),
        Err(ContractError::Unauthorized { .. })
    ));
}

#[test]
fn hard_rewards_pool_is_notified_with_the_worker() {
    let mut d = common::deploy(95, 100);
    let strategy = NoopStrategy::deploy(&mut d.env, &d.registry, &d.vault).unwrap();
    d.approve_strategy(&strategy);
    let (gov, vault) = (d.gov.clone(), d.vault.clone());
    let pool = Address::new("hard-rewards");
    let bot = Address::new("keeper-bot");

    d.controller().set_hard_rewards(&gov, Some(&pool)).unwrap();
    d.controller().add_hard_worker(&gov, &bot).unwrap();
    d.controller().do_hard_work(&bot, &vault).unwrap();

    let notified = d.env.events().iter().any(|r| {
        matches!(
            &r.event,
            ContractEvent::HardRewardsNotified { pool: p, worker, .. } if p == &pool && worker == &bot
        )
    });
    assert!(notified);

    // Cleared pool: no more notifications.
    d.controller().set_hard_rewards(&gov, None).unwrap();
    let before = d.env.events().len();
    d.controller().do_hard_work(&bot, &vault).unwrap();
    assert!(!d.env.events()[before..]
        .iter()
        .any(|r| matches!(r.event, ContractEvent::HardRewardsNotified { .. })));
}

// ---------------------------------------------------------------------------
// Vault Approval
// ---------------------------------------------------------------------------

#[test]
fn vault_can_only_be_added_once() {
    let mut d = common::deploy(95, 100);
    let first = NoopStrategy::deploy(&mut d.env, &d.registry, &d.vault).unwrap();
    let second = NoopStrategy::deploy(&mut d.env, &d.registry, &d.vault).unwrap();
    d.approve_strategy(&first);

    let (gov, vault) = (d.gov.clone(), d.vault.clone());
    let result = d.controller().add_vault_and_strategy(&gov, &vault, &second);
    assert_eq!(result, Err(ContractError::AlreadyRegistered(vault.clone())));
    assert_eq!(d.vault().strategy().unwrap(), Some(first));
    assert!(d.controller().has_vault(&vault).unwrap());
}

#[test]
fn only_governance_adds_vaults() {
    let mut d = common::deploy(95, 100);
    let strategy = NoopStrategy::deploy(&mut d.env, &d.registry, &d.vault).unwrap();
    let vault = d.vault.clone();

    let result = d
        .controller()
        .add_vault_and_strategy(&Address::new("alice"), &vault, &strategy);
    assert!(matches!(result, Err(ContractError::Unauthorized { .. })));
    assert!(!d.controller().has_vault(&vault).unwrap());
    assert_eq!(d.vault().strategy().unwrap(), None);
}

#[test]
fn migrating_an_unapproved_vault_fails() {
    let mut d = common::deploy(95, 100);
    let strategy = NoopStrategy::deploy(&mut d.env, &d.registry, &d.vault).unwrap();
    let (gov, vault) = (d.gov.clone(), d.vault.clone());

    let result = d.controller().set_vault_strategy(&gov, &vault, &strategy);
    assert_eq!(result, Err(ContractError::UnknownVault(vault)));
}

#[test]
fn strategy_of_follows_migrations_made_on_the_vault() {
    let mut d = common::deploy(95, 100);
    let first = NoopStrategy::deploy(&mut d.env, &d.registry, &d.vault).unwrap();
    let second = NoopStrategy::deploy(&mut d.env, &d.registry, &d.vault).unwrap();
    d.approve_strategy(&first);
    d.deposit(&Address::new("alice"), 1_000);

    // Governance migrates the vault without going through the controller.
    let gov = d.gov.clone();
    d.vault().set_strategy(&gov, &second).unwrap();

    let vault = d.vault.clone();
    assert_eq!(d.vault().strategy().unwrap(), Some(second.clone()));
    assert_eq!(d.controller().strategy_of(&vault).unwrap(), Some(second));
    assert_eq!(
        d.controller().strategy_of(&Address::new("vault:elsewhere")).unwrap(),
        None
    );
}

// ---------------------------------------------------------------------------
// Salvage
// ---------------------------------------------------------------------------

#[test]
fn salvage_sweeps_controller_tokens_to_governance() {
    let mut d = common::deploy(95, 100);
    let (gov, controller, token) = (d.gov.clone(), d.controller.clone(), d.token.clone());

    // Someone sends tokens to the controller by mistake.
    d.env.tokens_mut().mint(&token, &gov, &controller, 777).unwrap();

    d.controller().salvage(&gov, &token, 777).unwrap();
    assert_eq!(d.balance(&controller), 0);
    assert_eq!(d.balance(&gov), 777);

    assert!(matches!(
        d.controller().salvage(&Address::new("alice"), &token, 1),
        Err(ContractError::Unauthorized { .. })
    ));
}

#[test]
fn strategy_salvage_refuses_the_managed_asset() {
    let mut d = common::deploy(95, 100);
    let strategy = NoopStrategy::deploy(&mut d.env, &d.registry, &d.vault).unwrap();
    d.approve_strategy(&strategy);
    let (gov, token) = (d.gov.clone(), d.token.clone());
    d.env.tokens_mut().mint(&token, &gov, &strategy, 50).unwrap();

    let result = d.controller().salvage_strategy(&gov, &strategy, &token, 50);
    assert_eq!(result, Err(ContractError::ProtectedAsset(token.clone())));
    assert_eq!(d.balance(&strategy), 50);

    // Any other asset can be recovered.
    let stray = d
        .env
        .tokens_mut()
        .create_token(&gov, "Stray", "stry", 6)
        .unwrap();
    d.env.tokens_mut().mint(&stray, &gov, &strategy, 20).unwrap();
    d.controller()
        .salvage_strategy(&gov, &strategy, &stray, 20)
        .unwrap();
    assert_eq!(d.env.tokens().balance_of(&stray, &gov), 20);
}

// ---------------------------------------------------------------------------
// Governance
// ---------------------------------------------------------------------------

#[test]
fn governance_handover_is_seen_by_every_component() {
    let mut d = common::deploy(95, 100);
    let (gov, registry) = (d.gov.clone(), d.registry.clone());
    let next = Address::new("next-governance");

    assert!(matches!(
        RegistryClient::new(&mut d.env, &registry).set_governance(&Address::new("alice"), &next),
        Err(ContractError::Unauthorized { .. })
    ));
    RegistryClient::new(&mut d.env, &registry)
        .set_governance(&gov, &next)
        .unwrap();

    // The vault and the controller read the new identity immediately.
    assert!(matches!(
        d.vault().set_invest_ratio(&gov, 1, 2),
        Err(ContractError::Unauthorized { .. })
    ));
    d.vault().set_invest_ratio(&next, 1, 2).unwrap();
    assert!(d.controller().add_hard_worker(&gov, &gov).is_err());
    d.controller().add_hard_worker(&next, &gov).unwrap();
}

#[test]
fn components_can_be_rebound_to_a_new_registry() {
    let mut d = common::deploy(95, 100);
    let gov = d.gov.clone();
    let other_gov = Address::new("other-governance");
    let other = PermissionRegistry::deploy(&mut d.env, &other_gov, &other_gov).unwrap();

    assert!(matches!(
        d.vault().set_registry(&other_gov, &other),
        Err(ContractError::Unauthorized { .. })
    ));
    assert!(matches!(
        d.vault().set_registry(&gov, &Address::empty()),
        Err(ContractError::InvalidArgument(_))
    ));
    assert!(matches!(
        d.vault().set_registry(&gov, &Address::new("registry:missing")),
        Err(ContractError::UnknownContract { .. })
    ));

    d.vault().set_registry(&gov, &other).unwrap();
    assert!(d.vault().set_invest_ratio(&gov, 1, 2).is_err());
    d.vault().set_invest_ratio(&other_gov, 1, 2).unwrap();

    d.controller().set_registry(&gov, &other).unwrap();
    d.controller().add_hard_worker(&other_gov, &gov).unwrap();
}
