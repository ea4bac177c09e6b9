//! # Fungible Asset Ledger
//!
//! A standard multi-asset ledger: every asset has an admin, a set of minters,
//! a total supply, per-holder balances and per-(owner, spender) allowances.
//! The vault contracts consume exactly this surface: `transfer`,
//! `transfer_from`, `approve`, `balance_of`, `mint` and `decimals`.
//!
//! ## Security Model
//!
//! - **Caller identity**: the environment passes the authenticated caller as
//!   `from` / `owner` / `spender`. The ledger never infers who is calling.
//! - **Exact allowances**: `approve` overwrites, `transfer_from` consumes.
//!   There is no "infinite approval" sentinel.
//! - **Mint gating**: only the asset admin or a minter it appointed can mint.
//! - **Supply tracking**: total supply and balances move together; every
//!   addition is checked.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

use crate::address::Address;
use crate::config::{MAX_TOKEN_DECIMALS, TOKEN_PREFIX};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during asset ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The referenced asset does not exist.
    #[error("token not found: {0}")]
    TokenNotFound(Address),

    /// The caller is neither the admin nor an appointed minter.
    #[error("unauthorized: {caller} cannot mint or manage {token}")]
    Unauthorized {
        /// The asset being minted or managed.
        token: Address,
        /// The rejected caller.
        caller: Address,
    },

    /// The holder does not have enough of the asset.
    #[error("insufficient balance of {token}: {holder} has {balance}, needs {amount}")]
    InsufficientBalance {
        /// The asset being moved.
        token: Address,
        /// The account being debited.
        holder: Address,
        /// Its current balance.
        balance: u64,
        /// The amount requested.
        amount: u64,
    },

    /// The spender's allowance does not cover the transfer.
    #[error("insufficient allowance of {token}: {spender} may move {allowance} from {owner}, needs {amount}")]
    InsufficientAllowance {
        /// The asset being moved.
        token: Address,
        /// The account whose funds are being moved.
        owner: Address,
        /// The account moving them.
        spender: Address,
        /// The approved amount.
        allowance: u64,
        /// The amount requested.
        amount: u64,
    },

    /// A balance or the total supply would exceed `u64::MAX`.
    #[error("supply overflow on {token}: adding {amount}")]
    Overflow {
        /// The asset whose supply overflowed.
        token: Address,
        /// The amount that was being added.
        amount: u64,
    },

    /// An identity argument was the zero identity.
    #[error("empty identity supplied for {0}")]
    EmptyIdentity(&'static str),

    /// Decimal precision outside the supported range.
    #[error("unsupported decimals: {0} (max {max})", max = MAX_TOKEN_DECIMALS)]
    InvalidDecimals(u8),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metadata and supply information for a registered asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// The asset's address.
    pub address: Address,
    /// Human-readable name (e.g., "Granary Dollar").
    pub name: String,
    /// Ticker symbol, upper-cased.
    pub symbol: String,
    /// Decimal precision. Determines the price-per-full-share scale.
    pub decimals: u8,
    /// Identity allowed to appoint minters.
    pub admin: Address,
    /// Identities allowed to mint besides the admin.
    pub minters: BTreeSet<Address>,
    /// Current total supply in smallest units.
    pub total_supply: u64,
}

/// The asset ledger — registration, balances, allowances, minting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenLedger {
    /// Registered assets keyed by address.
    tokens: BTreeMap<Address, TokenInfo>,
    /// `token -> holder -> balance`. Zero balances are pruned.
    balances: BTreeMap<Address, BTreeMap<Address, u64>>,
    /// `token -> owner -> spender -> allowance`. Zero allowances are pruned.
    allowances: BTreeMap<Address, BTreeMap<Address, BTreeMap<Address, u64>>>,
}

impl TokenLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new asset administered by `admin` and returns its address.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::EmptyIdentity`] for an empty admin and
    /// [`TokenError::InvalidDecimals`] above [`MAX_TOKEN_DECIMALS`].
    pub fn create_token(
        &mut self,
        admin: &Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> Result<Address, TokenError> {
        if admin.is_empty() {
            return Err(TokenError::EmptyIdentity("admin"));
        }
        if decimals > MAX_TOKEN_DECIMALS {
            return Err(TokenError::InvalidDecimals(decimals));
        }

        let address = Address::generate(TOKEN_PREFIX);
        let info = TokenInfo {
            address: address.clone(),
            name: name.into(),
            symbol: symbol.into().to_uppercase(),
            decimals,
            admin: admin.clone(),
            minters: BTreeSet::new(),
            total_supply: 0,
        };
        debug!(token = %address, symbol = %info.symbol, decimals, "token created");
        self.tokens.insert(address.clone(), info);
        Ok(address)
    }

    /// Appoints `minter` as an additional minter. Admin only.
    pub fn add_minter(
        &mut self,
        token: &Address,
        caller: &Address,
        minter: &Address,
    ) -> Result<(), TokenError> {
        if minter.is_empty() {
            return Err(TokenError::EmptyIdentity("minter"));
        }
        let info = self.info_mut(token)?;
        if &info.admin != caller {
            return Err(TokenError::Unauthorized {
                token: token.clone(),
                caller: caller.clone(),
            });
        }
        info.minters.insert(minter.clone());
        Ok(())
    }

    /// Mints `amount` of `token` to `to`.
    ///
    /// # Errors
    ///
    /// [`TokenError::Unauthorized`] unless `caller` is the admin or a minter;
    /// [`TokenError::Overflow`] if supply or balance would overflow.
    pub fn mint(
        &mut self,
        token: &Address,
        caller: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), TokenError> {
        if to.is_empty() {
            return Err(TokenError::EmptyIdentity("recipient"));
        }
        let info = self.info(token)?;
        if &info.admin != caller && !info.minters.contains(caller) {
            return Err(TokenError::Unauthorized {
                token: token.clone(),
                caller: caller.clone(),
            });
        }
        let new_supply = info
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| TokenError::Overflow {
                token: token.clone(),
                amount,
            })?;

        self.credit(token, to, amount)?;
        self.info_mut(token)?.total_supply = new_supply;
        debug!(token = %token, to = %to, amount, "minted");
        Ok(())
    }

    /// Moves `amount` of `token` from `from` (the caller) to `to`.
    pub fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), TokenError> {
        self.info(token)?;
        if to.is_empty() {
            return Err(TokenError::EmptyIdentity("recipient"));
        }
        if amount == 0 || from == to {
            return Ok(());
        }
        self.debit(token, from, amount)?;
        self.credit(token, to, amount)?;
        debug!(token = %token, from = %from, to = %to, amount, "transfer");
        Ok(())
    }

    /// Sets the allowance of `spender` over `owner`'s `token` to exactly `amount`.
    pub fn approve(
        &mut self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), TokenError> {
        self.info(token)?;
        if spender.is_empty() {
            return Err(TokenError::EmptyIdentity("spender"));
        }
        let owners = self.allowances.entry(token.clone()).or_default();
        let spenders = owners.entry(owner.clone()).or_default();
        if amount == 0 {
            spenders.remove(spender);
            if spenders.is_empty() {
                owners.remove(owner);
            }
        } else {
            spenders.insert(spender.clone(), amount);
        }
        Ok(())
    }

    /// Moves `amount` of `owner`'s `token` to `to`, spending `spender`'s
    /// allowance. The allowance is checked before any balance moves.
    pub fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), TokenError> {
        if spender.is_empty() {
            return Err(TokenError::EmptyIdentity("spender"));
        }
        let allowance = self.allowance(token, owner, spender);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                token: token.clone(),
                owner: owner.clone(),
                spender: spender.clone(),
                allowance,
                amount,
            });
        }
        self.transfer(token, owner, to, amount)?;
        self.approve(token, owner, spender, allowance - amount)
    }

    /// Returns the balance of `holder`, or 0.
    pub fn balance_of(&self, token: &Address, holder: &Address) -> u64 {
        self.balances
            .get(token)
            .and_then(|b| b.get(holder))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the remaining allowance of `spender` over `owner`'s funds.
    pub fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> u64 {
        self.allowances
            .get(token)
            .and_then(|o| o.get(owner))
            .and_then(|s| s.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the decimal precision of `token`.
    pub fn decimals(&self, token: &Address) -> Result<u8, TokenError> {
        Ok(self.info(token)?.decimals)
    }

    /// Returns the total supply of `token`, or 0 if it does not exist.
    pub fn total_supply(&self, token: &Address) -> u64 {
        self.tokens.get(token).map(|t| t.total_supply).unwrap_or(0)
    }

    /// Returns metadata for a token.
    pub fn info(&self, token: &Address) -> Result<&TokenInfo, TokenError> {
        self.tokens
            .get(token)
            .ok_or_else(|| TokenError::TokenNotFound(token.clone()))
    }

    /// Returns `true` if `token` is registered.
    pub fn exists(&self, token: &Address) -> bool {
        self.tokens.contains_key(token)
    }

    /// Iterates over every non-zero balance as `(token, holder, amount)`.
    pub fn balances(&self) -> impl Iterator<Item = (&Address, &Address, u64)> {
        self.balances
            .iter()
            .flat_map(|(token, holders)| holders.iter().map(move |(h, a)| (token, h, *a)))
    }

    fn info_mut(&mut self, token: &Address) -> Result<&mut TokenInfo, TokenError> {
        self.tokens
            .get_mut(token)
            .ok_or_else(|| TokenError::TokenNotFound(token.clone()))
    }

    fn credit(&mut self, token: &Address, to: &Address, amount: u64) -> Result<(), TokenError> {
        let holders = self.balances.entry(token.clone()).or_default();
        let current = holders.get(to).copied().unwrap_or(0);
        let next = current.checked_add(amount).ok_or_else(|| TokenError::Overflow {
            token: token.clone(),
            amount,
        })?;
        if next > 0 {
            holders.insert(to.clone(), next);
        }
        Ok(())
    }

    fn debit(&mut self, token: &Address, from: &Address, amount: u64) -> Result<(), TokenError> {
        let balance = self.balance_of(token, from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                token: token.clone(),
                holder: from.clone(),
                balance,
                amount,
            });
        }
        let holders = self.balances.entry(token.clone()).or_default();
        let remaining = balance - amount;
        if remaining == 0 {
            holders.remove(from);
        } else {
            holders.insert(from.clone(), remaining);
        }
        Ok(())
    }
}
