//! # Access Control Capabilities
//!
//! Every stateful component embeds an [`AccessControl`]: the address of the
//! [`PermissionRegistry`](crate::registry::PermissionRegistry) it answers to.
//! The capability never caches identities. Each check resolves the registry
//! through the environment, so a governance or controller change is visible
//! to every dependent immediately.
//!
//! The checks themselves live on two traits:
//!
//! - [`Governed`]: governance reads and the governance gate.
//! - [`Controlled`]: adds the controller gate and the combined
//!   controller-or-governance gate.
//!
//! A component implements `access()` and inherits the rest, so vaults,
//! controllers and strategies share one copy of the authorization logic.

use granary_protocol::Address;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::env::Env;
use crate::error::{ContractError, ContractResult, Role};
use crate::events::ContractEvent;

/// Back-reference from a component to its permission registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    registry: Address,
}

impl AccessControl {
    /// Binds a new capability to `registry`.
    ///
    /// # Errors
    ///
    /// [`ContractError::InvalidArgument`] if `registry` is empty;
    /// [`ContractError::UnknownContract`] if no registry lives there.
    pub fn new(env: &Env, registry: &Address) -> ContractResult<Self> {
        validate_registry(env, registry)?;
        Ok(Self {
            registry: registry.clone(),
        })
    }

    /// The registry this capability answers to.
    pub fn registry(&self) -> &Address {
        &self.registry
    }
}

/// Components whose privileged operations are gated on governance.
pub trait Governed {
    /// The embedded capability.
    fn access(&self) -> &AccessControl;

    /// Current governance identity, read live from the registry.
    fn governance(&self, env: &Env) -> ContractResult<Address> {
        Ok(env.registry(self.access().registry())?.governance().clone())
    }

    /// `true` if `who` is the current governance identity.
    fn is_governance(&self, env: &Env, who: &Address) -> ContractResult<bool> {
        Ok(env.registry(self.access().registry())?.is_governance(who))
    }

    /// Fails with [`ContractError::Unauthorized`] unless `caller` is governance.
    fn require_governance(&self, env: &Env, caller: &Address) -> ContractResult<()> {
        if self.is_governance(env, caller)? {
            Ok(())
        } else {
            Err(denied(Role::Governance, caller))
        }
    }
}

/// Components that additionally accept commands from the controller.
pub trait Controlled: Governed {
    /// Current controller identity, read live from the registry.
    fn controller(&self, env: &Env) -> ContractResult<Address> {
        Ok(env.registry(self.access().registry())?.controller().clone())
    }

    /// Fails with [`ContractError::Unauthorized`] unless `caller` is the controller.
    fn require_controller(&self, env: &Env, caller: &Address) -> ContractResult<()> {
        if env.registry(self.access().registry())?.is_controller(caller) {
            Ok(())
        } else {
            Err(denied(Role::Controller, caller))
        }
    }

    /// Fails unless `caller` is the controller or governance.
    fn require_controller_or_governance(&self, env: &Env, caller: &Address) -> ContractResult<()> {
        let registry = env.registry(self.access().registry())?;
        if registry.is_controller(caller) || registry.is_governance(caller) {
            Ok(())
        } else {
            Err(denied(Role::ControllerOrGovernance, caller))
        }
    }
}

impl Governed for AccessControl {
    fn access(&self) -> &AccessControl {
        self
    }
}

impl Controlled for AccessControl {}

/// Re-points the component at `component` to the registry `new`.
///
/// Authorization is checked against the component's *current* registry, so
/// the governance of the registry being left behind is the one that decides.
///
/// # Errors
///
/// [`ContractError::Unauthorized`] unless `caller` is that governance;
/// [`ContractError::InvalidArgument`] for an empty `new`;
/// [`ContractError::UnknownContract`] if `new` is not a deployed registry.
pub fn set_registry(
    env: &mut Env,
    caller: &Address,
    component: &Address,
    new: &Address,
) -> ContractResult<()> {
    env.guarded(component, |env| {
        let access = env.access_control(component)?;
        access.require_governance(env, caller)?;
        validate_registry(env, new)?;

        let access = env.access_control_mut(component)?;
        let previous = std::mem::replace(&mut access.registry, new.clone());
        info!(component = %component, previous = %previous, new = %new, "registry rebound");
        env.emit(ContractEvent::RegistryRebound {
            component: component.clone(),
            previous,
            new: new.clone(),
        });
        Ok(())
    })
}

fn validate_registry(env: &Env, registry: &Address) -> ContractResult<()> {
    if registry.is_empty() {
        return Err(ContractError::invalid("registry reference must not be empty"));
    }
    env.registry(registry)?;
    Ok(())
}

pub(crate) fn denied(role: Role, caller: &Address) -> ContractError {
    warn!(caller = %caller, %role, "unauthorized call rejected");
    ContractError::Unauthorized {
        role,
        caller: caller.clone(),
    }
}
