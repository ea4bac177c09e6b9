//! Shared deployment fixture for the integration tests.

#![allow(dead_code)]

use granary_contracts::{
    Controller, ControllerClient, Env, PermissionRegistry, RegistryClient, Vault, VaultClient,
};
use granary_protocol::Address;

/// A registry, a controller wired into it, one asset and one vault.
pub struct Deployment {
    pub env: Env,
    pub gov: Address,
    pub forwarder: Address,
    pub registry: Address,
    pub controller: Address,
    pub token: Address,
    pub vault: Address,
}

/// Deploys the standard stack with a 6-decimal asset.
pub fn deploy(numerator: u64, denominator: u64) -> Deployment {
    deploy_with_decimals(numerator, denominator, 6)
}

pub fn deploy_with_decimals(numerator: u64, denominator: u64, decimals: u8) -> Deployment {
    let mut env = Env::new();
    let gov = Address::new("governance");
    let forwarder = Address::new("fee-forwarder");

    let registry = PermissionRegistry::deploy(&mut env, &gov, &gov).unwrap();
    let controller = Controller::deploy(&mut env, &registry, &forwarder).unwrap();
    RegistryClient::new(&mut env, &registry)
        .set_controller(&gov, &controller)
        .unwrap();

    let token = env
        .tokens_mut()
        .create_token(&gov, "Granary Dollar", "gusd", decimals)
        .unwrap();
    let vault = Vault::deploy(&mut env, &registry, &token, numerator, denominator).unwrap();

    Deployment {
        env,
        gov,
        forwarder,
        registry,
        controller,
        token,
        vault,
    }
}

impl Deployment {
    /// Mints `amount` to `who` and approves the vault for exactly that much.
    pub fn fund(&mut self, who: &Address, amount: u64) {
        self.env
            .tokens_mut()
            .mint(&self.token, &self.gov, who, amount)
            .unwrap();
        self.env
            .tokens_mut()
            .approve(&self.token, who, &self.vault, amount)
            .unwrap();
    }

    /// Funds `who` and deposits everything.
    pub fn deposit(&mut self, who: &Address, amount: u64) -> u64 {
        self.fund(who, amount);
        let vault = self.vault.clone();
        VaultClient::new(&mut self.env, &vault)
            .deposit(who, amount)
            .unwrap()
    }

    pub fn vault(&mut self) -> VaultClient<'_> {
        VaultClient::new(&mut self.env, &self.vault)
    }

    pub fn controller(&mut self) -> ControllerClient<'_> {
        ControllerClient::new(&mut self.env, &self.controller)
    }

    pub fn balance(&self, who: &Address) -> u64 {
        self.env.tokens().balance_of(&self.token, who)
    }

    pub fn price(&self) -> u128 {
        self.env
            .vault(&self.vault)
            .unwrap()
            .price_per_full_share(&self.env)
            .unwrap()
    }

    /// Approves `strategy` for the vault through the controller.
    pub fn approve_strategy(&mut self, strategy: &Address) {
        let (gov, vault) = (self.gov.clone(), self.vault.clone());
        self.controller()
            .add_vault_and_strategy(&gov, &vault, strategy)
            .unwrap();
    }
}
