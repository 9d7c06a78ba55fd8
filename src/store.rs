//! Account store
//!
//! Durable credential/permission records behind the login workflow and the
//! Admin `user` commands. Backed by SQLite through rusqlite; the
//! connection lives behind a mutex so the blocking login tasks and the
//! dispatcher can share one handle.

use std::path::Path;
use std::sync::Mutex;

use md5::{Digest, Md5};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::AppError;
use crate::types::Permission;

/// The `root` account always exists with Admin permission and may not be
/// deleted, banned or stripped by anyone else.
pub const ROOT_NAME: &str = "root";

/// Seed password hash for a freshly created `root` (md5 of "12345678").
const ROOT_DEFAULT_HASH: &str = "25d55ad283aa400af464c76d713c07ad";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS USERS(
    USER_NAME VARCHAR(20) PRIMARY KEY NOT NULL,
    PASSWORD CHAR(32) NOT NULL,
    PERMISSION VARCHAR(8) NOT NULL,
    BAN INTEGER NOT NULL
)";

/// Lowercase hex md5 digest, the password format the store keeps.
pub fn hash_password(raw: &str) -> String {
    hex::encode(Md5::digest(raw.as_bytes()))
}

/// One account row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub password_hash: String,
    pub permission: Permission,
    pub banned: bool,
}

/// SQLite-backed account store.
#[derive(Debug)]
pub struct AccountStore {
    conn: Mutex<Connection>,
}

impl AccountStore {
    /// Open (or create) the store at the given path and reassert the
    /// `root` account.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, AppError> {
        conn.execute(CREATE_TABLE, [])?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_root()?;
        Ok(store)
    }

    /// Create `root` if absent and reassert its Admin permission either way.
    fn ensure_root(&self) -> Result<(), AppError> {
        let conn = self.lock();
        let exists: Option<String> = conn
            .query_row(
                "SELECT USER_NAME FROM USERS WHERE USER_NAME = ?1",
                params![ROOT_NAME],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            conn.execute(
                "INSERT INTO USERS (USER_NAME, PASSWORD, PERMISSION, BAN) VALUES (?1, ?2, ?3, 0)",
                params![ROOT_NAME, ROOT_DEFAULT_HASH, Permission::Admin.as_str()],
            )?;
            info!("root account not found, created");
        } else {
            conn.execute(
                "UPDATE USERS SET PERMISSION = ?1 WHERE USER_NAME = ?2",
                params![Permission::Admin.as_str(), ROOT_NAME],
            )?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // Statements are single-shot; a panicked holder leaves no partial state.
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Fetch one account, or None when the username is unknown.
    pub fn get_account(&self, username: &str) -> Result<Option<Account>, AppError> {
        let conn = self.lock();
        let account = conn
            .query_row(
                "SELECT USER_NAME, PASSWORD, PERMISSION, BAN FROM USERS WHERE USER_NAME = ?1",
                params![username],
                |row| {
                    let permission: String = row.get(2)?;
                    Ok(Account {
                        username: row.get(0)?,
                        password_hash: row.get(1)?,
                        permission: permission.parse().unwrap_or(Permission::User),
                        banned: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    /// Insert a new account. Returns false when the username is taken.
    pub fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        permission: Permission,
    ) -> Result<bool, AppError> {
        let conn = self.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO USERS (USER_NAME, PASSWORD, PERMISSION, BAN) \
             VALUES (?1, ?2, ?3, 0)",
            params![username, password_hash, permission.as_str()],
        )?;
        Ok(inserted > 0)
    }

    /// Replace the stored password hash. Returns false for unknown users.
    pub fn set_password(&self, username: &str, password_hash: &str) -> Result<bool, AppError> {
        let updated = self.lock().execute(
            "UPDATE USERS SET PASSWORD = ?1 WHERE USER_NAME = ?2",
            params![password_hash, username],
        )?;
        Ok(updated > 0)
    }

    /// Replace the stored permission. Returns false for unknown users.
    pub fn set_permission(&self, username: &str, permission: Permission) -> Result<bool, AppError> {
        let updated = self.lock().execute(
            "UPDATE USERS SET PERMISSION = ?1 WHERE USER_NAME = ?2",
            params![permission.as_str(), username],
        )?;
        Ok(updated > 0)
    }

    /// Delete an account. Returns false for unknown users.
    pub fn delete_account(&self, username: &str) -> Result<bool, AppError> {
        let deleted = self.lock().execute(
            "DELETE FROM USERS WHERE USER_NAME = ?1",
            params![username],
        )?;
        Ok(deleted > 0)
    }

    /// Set or clear the ban flag. Returns false for unknown users.
    pub fn set_ban(&self, username: &str, banned: bool) -> Result<bool, AppError> {
        let updated = self.lock().execute(
            "UPDATE USERS SET BAN = ?1 WHERE USER_NAME = ?2",
            params![banned as i64, username],
        )?;
        Ok(updated > 0)
    }

    /// All registered usernames.
    pub fn list_usernames(&self) -> Result<Vec<String>, AppError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT USER_NAME FROM USERS ORDER BY USER_NAME")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}
