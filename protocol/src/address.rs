//! # Identities
//!
//! An [`Address`] names anything that can hold assets or make a call: a user,
//! a vault, a strategy, the controller. Component addresses are allocated by
//! the execution environment as `<kind>:<uuid>`; user addresses are whatever
//! string the caller chooses.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An identity on the Granary platform.
///
/// The empty string is the zero identity. It can be constructed (so that
/// validation code has something to reject) but never passes
/// [`Address::is_empty`]-guarded entry points.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps an arbitrary identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The zero identity.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Allocates a fresh component address with the given kind prefix,
    /// e.g. `vault:3f2a…`.
    pub fn generate(kind: &str) -> Self {
        Self(format!("{}:{}", kind, Uuid::new_v4().simple()))
    }

    /// Returns `true` for the zero identity.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<empty>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}
