//! # Ledger Snapshots
//!
//! A [`LedgerSnapshot`] is a serializable view of every persisted record:
//! registries, vault ledgers, controller registries, strategy summaries and
//! token balances. The event log is left out, so two environments holding the
//! same state produce the same snapshot.
//!
//! The digest is BLAKE3 over the snapshot's JSON encoding. Every collection
//! is ordered by address, which makes the encoding canonical.

use std::collections::BTreeMap;

use granary_protocol::Address;
use serde::{Deserialize, Serialize};

use crate::access::Governed;
use crate::controller::Controller;
use crate::env::Env;
use crate::error::ContractResult;
use crate::registry::PermissionRegistry;
use crate::vault::VaultState;

/// Share ledger and accounting figures for one vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSummary {
    pub address: Address,
    pub registry: Address,
    pub underlying: Address,
    pub state: VaultState,
    pub strategy: Option<Address>,
    pub invest_numerator: u64,
    pub invest_denominator: u64,
    pub total_shares: u64,
    pub shares: BTreeMap<Address, u64>,
    pub underlying_in_vault: u64,
    pub underlying_with_investment: u64,
    pub price_per_full_share: u128,
}

/// What a strategy is and how much it manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub address: Address,
    pub kind: String,
    pub vault: Address,
    pub underlying: Address,
    pub invested: u64,
}

/// One non-zero token balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub token: Address,
    pub holder: Address,
    pub amount: u64,
}

/// Serializable view of the environment's persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub registries: Vec<PermissionRegistry>,
    pub vaults: Vec<VaultSummary>,
    pub controllers: Vec<Controller>,
    pub strategies: Vec<StrategySummary>,
    pub balances: Vec<BalanceEntry>,
}

impl LedgerSnapshot {
    /// Hex-encoded BLAKE3 digest of the canonical JSON encoding.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
    }

    /// Looks up a vault summary by address.
    pub fn vault(&self, address: &Address) -> Option<&VaultSummary> {
        self.vaults.iter().find(|v| &v.address == address)
    }
}

impl Env {
    /// Captures every registry, vault, controller, strategy and balance.
    pub fn snapshot(&self) -> ContractResult<LedgerSnapshot> {
        let mut vaults = Vec::new();
        for vault in self.vaults() {
            vaults.push(VaultSummary {
                address: vault.address().clone(),
                registry: vault.access().registry().clone(),
                underlying: vault.underlying().clone(),
                state: vault.state(),
                strategy: vault.strategy().cloned(),
                invest_numerator: vault.invest_ratio().0,
                invest_denominator: vault.invest_ratio().1,
                total_shares: vault.total_shares(),
                shares: vault.holders().map(|(h, s)| (h.clone(), s)).collect(),
                underlying_in_vault: vault.underlying_balance_in_vault(self),
                underlying_with_investment: vault.underlying_balance_with_investment(self)?,
                price_per_full_share: vault.price_per_full_share(self)?,
            });
        }

        let strategies = self
            .strategies()
            .map(|s| StrategySummary {
                address: s.core().address().clone(),
                kind: s.kind().to_string(),
                vault: s.core().vault().clone(),
                underlying: s.core().underlying().clone(),
                invested: s.invested_underlying_balance(self),
            })
            .collect();

        let balances = self
            .tokens()
            .balances()
            .map(|(token, holder, amount)| BalanceEntry {
                token: token.clone(),
                holder: holder.clone(),
                amount,
            })
            .collect();

        Ok(LedgerSnapshot {
            registries: self.registries().cloned().collect(),
            vaults,
            controllers: self.controllers().cloned().collect(),
            strategies,
            balances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::NoopStrategy;
    use crate::vault::{Vault, VaultClient};

    fn populated() -> (Env, Address) {
        let mut env = Env::new();
        let gov = Address::new("gov");
        let registry = PermissionRegistry::deploy(&mut env, &gov, &gov).unwrap();
        let token = env.tokens_mut().create_token(&gov, "USD", "usd", 6).unwrap();
        let vault = Vault::deploy(&mut env, &registry, &token, 100, 100).unwrap();
        let strategy = NoopStrategy::deploy(&mut env, &registry, &vault).unwrap();
        env.tokens_mut().mint(&token, &gov, &gov, 500).unwrap();
        env.tokens_mut().approve(&token, &gov, &vault, 500).unwrap();

        let mut client = VaultClient::new(&mut env, &vault);
        client.deposit(&gov, 500).unwrap();
        client.set_strategy(&gov, &strategy).unwrap();
        client.do_hard_work(&gov).unwrap();
        (env, vault)
    }

    #[test]
    fn snapshot_reflects_vault_ledger() {
        let (env, vault) = populated();
        let snapshot = env.snapshot().unwrap();
        let summary = snapshot.vault(&vault).unwrap();
        assert_eq!(summary.total_shares, 500);
        assert_eq!(summary.underlying_in_vault, 0);
        assert_eq!(summary.underlying_with_investment, 500);
        assert_eq!(summary.state, VaultState::Invested);
        assert_eq!(snapshot.strategies.len(), 1);
        assert_eq!(snapshot.strategies[0].invested, 500);
    }

    #[test]
    fn digest_is_deterministic() {
        let (env, _) = populated();
        let first = env.snapshot().unwrap().digest().unwrap();
        let second = env.snapshot().unwrap().digest().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn digest_changes_with_state() {
        let (mut env, _) = populated();
        let before = env.snapshot().unwrap().digest().unwrap();
        let token = env.tokens().balances().next().map(|(t, _, _)| t.clone()).unwrap();
        env.tokens_mut()
            .mint(&token, &Address::new("gov"), &Address::new("someone"), 1)
            .unwrap();
        assert_ne!(before, env.snapshot().unwrap().digest().unwrap());
    }
}
