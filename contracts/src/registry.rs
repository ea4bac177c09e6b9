//! # Permission Registry
//!
//! The single shared record of who governs the protocol and which identity
//! acts as its controller. Vaults, controllers and strategies hold the
//! registry's address (see [`crate::access`]) and consult it on every
//! privileged call.
//!
//! Only the current governance identity can change either field, and neither
//! field can ever be set to the empty identity.

use granary_protocol::config::REGISTRY_PREFIX;
use granary_protocol::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::access::denied;
use crate::env::Env;
use crate::error::{ContractError, ContractResult, Role};
use crate::events::ContractEvent;

/// Governance and controller identities shared by every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRegistry {
    address: Address,
    governance: Address,
    controller: Address,
}

impl PermissionRegistry {
    /// Deploys a registry and returns its address.
    ///
    /// # Errors
    ///
    /// [`ContractError::InvalidArgument`] if either identity is empty.
    pub fn deploy(env: &mut Env, governance: &Address, controller: &Address) -> ContractResult<Address> {
        require_identity(governance, "governance")?;
        require_identity(controller, "controller")?;

        let registry = PermissionRegistry {
            address: Address::generate(REGISTRY_PREFIX),
            governance: governance.clone(),
            controller: controller.clone(),
        };
        let address = registry.address.clone();
        env.atomically(|env| {
            env.insert_registry(registry);
            env.emit(ContractEvent::RegistryDeployed {
                registry: address.clone(),
                governance: governance.clone(),
                controller: controller.clone(),
            });
            Ok(())
        })?;
        info!(registry = %address, governance = %governance, controller = %controller, "registry deployed");
        Ok(address)
    }

    /// The registry's own address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Current governance identity.
    pub fn governance(&self) -> &Address {
        &self.governance
    }

    /// Current controller identity.
    pub fn controller(&self) -> &Address {
        &self.controller
    }

    /// `true` if `who` is the current governance identity.
    pub fn is_governance(&self, who: &Address) -> bool {
        !who.is_empty() && &self.governance == who
    }

    /// `true` if `who` is the current controller identity.
    pub fn is_controller(&self, who: &Address) -> bool {
        !who.is_empty() && &self.controller == who
    }
}

/// Calls into a deployed [`PermissionRegistry`].
pub struct RegistryClient<'a> {
    env: &'a mut Env,
    address: Address,
}

impl<'a> RegistryClient<'a> {
    /// Binds a client to the registry at `address`.
    pub fn new(env: &'a mut Env, address: &Address) -> Self {
        Self {
            env,
            address: address.clone(),
        }
    }

    /// Hands governance authority to `new`. Governance only.
    pub fn set_governance(&mut self, caller: &Address, new: &Address) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.atomically(|env| {
            let registry = env.registry(&address)?;
            if !registry.is_governance(caller) {
                return Err(denied(Role::Governance, caller));
            }
            require_identity(new, "governance")?;

            let registry = env.registry_mut(&address)?;
            let previous = std::mem::replace(&mut registry.governance, new.clone());
            info!(registry = %address, previous = %previous, new = %new, "governance changed");
            env.emit(ContractEvent::GovernanceChanged {
                registry: address.clone(),
                previous,
                new: new.clone(),
            });
            Ok(())
        })
    }

    /// Replaces the controller identity. Governance only.
    pub fn set_controller(&mut self, caller: &Address, new: &Address) -> ContractResult<()> {
        let address = self.address.clone();
        self.env.atomically(|env| {
            let registry = env.registry(&address)?;
            if !registry.is_governance(caller) {
                return Err(denied(Role::Governance, caller));
            }
            require_identity(new, "controller")?;

            let registry = env.registry_mut(&address)?;
            let previous = std::mem::replace(&mut registry.controller, new.clone());
            info!(registry = %address, previous = %previous, new = %new, "controller changed");
            env.emit(ContractEvent::ControllerChanged {
                registry: address.clone(),
                previous,
                new: new.clone(),
            });
            Ok(())
        })
    }

    /// Current governance identity.
    pub fn governance(&self) -> ContractResult<Address> {
        Ok(self.env.registry(&self.address)?.governance().clone())
    }

    /// Current controller identity.
    pub fn controller(&self) -> ContractResult<Address> {
        Ok(self.env.registry(&self.address)?.controller().clone())
    }
}

fn require_identity(who: &Address, what: &str) -> ContractResult<()> {
    if who.is_empty() {
        Err(ContractError::invalid(format!("{what} must not be empty")))
    } else {
        Ok(())
    }
}
