//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers and the permission ordering:
//! - `ConnId`: UUID-based unique connection identifier
//! - `SessionId`: numeric id handed to each session at creation
//! - `Permission`: ordered `User < Manager < Admin`

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe identification of an open transport
/// endpoint, authenticated or not. Implements Hash and Eq for use as
/// HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub Uuid);

impl ConnId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric id assigned to a session when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Permission level of an account or session.
///
/// The derived `Ord` gives the strict ordering `User < Manager < Admin`;
/// every gated command compares against its minimum level explicitly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Permission {
    /// Ordinary participant
    #[default]
    User,
    /// May create rooms and kick users below their level
    Manager,
    /// Full control, including the account store
    Admin,
}

impl Permission {
    /// String form used by the account store and the `user setper` command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::User => "User",
            Permission::Manager => "Manager",
            Permission::Admin => "Admin",
        }
    }
}

impl FromStr for Permission {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Permission::User),
            "Manager" => Ok(Permission::Manager),
            "Admin" => Ok(Permission::Admin),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
