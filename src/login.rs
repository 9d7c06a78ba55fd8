//! Login and registration workflow
//!
//! Credential verification talks to the account store, which blocks, so
//! the server actor runs [`verify`] and [`register`] inside
//! `tokio::task::spawn_blocking` and commits the outcome on its own task
//! when the result is posted back. Everything here is pure with respect
//! to the Directory; only the actor mutates shared state.

use std::net::SocketAddr;

use crate::config::ServerOptions;
use crate::error::AppError;
use crate::session::MAX_NAME_LEN;
use crate::store::{AccountStore, ROOT_NAME};
use crate::types::Permission;

/// Reserved display name; clients may not log in or register as the server.
pub const RESERVED_NAME: &str = "Server";

/// Parsed `username\r\npassword` credential blob. The password field holds
/// the client-side digest, or is empty for a guest login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    /// Split a credential payload. A payload without the separator is a
    /// guest login with the whole payload as the name.
    pub fn parse(payload: &str) -> Self {
        match payload.split_once("\r\n") {
            Some((user, password)) => Self {
                user: user.trim().to_string(),
                password: password.to_string(),
            },
            None => Self {
                user: payload.trim().to_string(),
                password: String::new(),
            },
        }
    }

    pub fn is_guest(&self) -> bool {
        self.password.is_empty()
    }
}

/// Outcome of credential verification, computed off the actor task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginDecision {
    /// Login refused; the client is told why and the connection closed
    Reject { reason: String },
    /// Account login verified; session permission seeded from the account
    Account { name: String, permission: Permission },
    /// Guest login admitted with default permission
    Guest { name: String },
}

/// Verify one login attempt against the store and options snapshot.
///
/// Active-name duplicate checks are not done here - the actor re-validates
/// against the Directory when it commits, preserving the single-writer
/// rule.
pub fn verify(
    store: &AccountStore,
    options: &ServerOptions,
    credentials: &Credentials,
    peer: SocketAddr,
) -> LoginDecision {
    if !credentials.is_guest() {
        return verify_account(store, options, credentials);
    }

    if options.force_account {
        return LoginDecision::Reject {
            reason: "This server requires an account, please log in with credentials.".to_string(),
        };
    }
    if options.lock_server {
        return LoginDecision::Reject {
            reason: "This server is locked, please log in with an Admin account.".to_string(),
        };
    }
    let mut name = credentials.user.clone();
    if name.is_empty() {
        // Anonymous guests are named after their endpoint
        name = format!("{}:{}", peer.ip(), peer.port());
    }
    if name == RESERVED_NAME {
        return LoginDecision::Reject {
            reason: "That name is reserved.".to_string(),
        };
    }
    match store.get_account(&name) {
        Ok(Some(_)) => LoginDecision::Reject {
            reason: "That name belongs to a registered account.".to_string(),
        },
        Ok(None) => LoginDecision::Guest { name },
        Err(e) => persistence_reject(e),
    }
}

fn verify_account(
    store: &AccountStore,
    options: &ServerOptions,
    credentials: &Credentials,
) -> LoginDecision {
    let account = match store.get_account(&credentials.user) {
        Ok(account) => account,
        Err(e) => return persistence_reject(e),
    };
    let Some(account) = account else {
        return LoginDecision::Reject {
            reason: "Wrong username or password.".to_string(),
        };
    };
    if account.password_hash != credentials.password {
        return LoginDecision::Reject {
            reason: "Wrong username or password.".to_string(),
        };
    }
    if account.banned {
        return LoginDecision::Reject {
            reason: "You are banned from this server.".to_string(),
        };
    }
    if options.lock_server && account.permission != Permission::Admin {
        return LoginDecision::Reject {
            reason: "This server is locked, please log in with an Admin account.".to_string(),
        };
    }
    LoginDecision::Account {
        name: account.username,
        permission: account.permission,
    }
}

fn persistence_reject(e: AppError) -> LoginDecision {
    tracing::error!("account lookup failed: {e}");
    LoginDecision::Reject {
        reason: "Server error, please try again later.".to_string(),
    }
}

/// Process one registration attempt. On success the account is stored with
/// `User` permission; the connection is closed either way.
pub fn register(
    store: &AccountStore,
    options: &ServerOptions,
    credentials: &Credentials,
) -> Result<(), String> {
    if !options.allow_register {
        return Err("Registration is disabled on this server.".to_string());
    }
    if credentials.user.is_empty() || credentials.is_guest() {
        return Err("A username and password are required.".to_string());
    }
    if credentials.user == RESERVED_NAME || credentials.user == ROOT_NAME {
        return Err("That name is reserved.".to_string());
    }
    if credentials.user.chars().count() > MAX_NAME_LEN {
        return Err(format!("Names are limited to {MAX_NAME_LEN} characters."));
    }
    match store.create_account(&credentials.user, &credentials.password, Permission::User) {
        Ok(true) => Ok(()),
        Ok(false) => Err("That name is already registered.".to_string()),
        Err(e) => {
            tracing::error!("account creation failed: {e}");
            Err("Server error, please try again later.".to_string())
        }
    }
}

/// Resolve an active-name collision by appending the remote port until the
/// name is free, then truncating to the name cap.
pub fn resolve_name(base: &str, port: u16, taken: impl Fn(&str) -> bool) -> String {
    let mut name = base.trim().to_string();
    let suffix = port.to_string();
    while taken(&name) {
        name.push_str(&suffix);
    }
    name.chars().take(MAX_NAME_LEN).collect::<String>().trim().to_string()
}
