//! Server configuration
//!
//! Loaded once at startup from a TOML file; the [`ServerOptions`] half is
//! additionally mutable at runtime through the Admin `option` command.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_room() -> String {
    "Chatting Room".to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("sql/server.db")
}

fn default_transcript() -> PathBuf {
    PathBuf::from("records/chatting_record.txt")
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_true() -> bool {
    true
}

/// Runtime-toggleable server options, surfaced by `option show` / `option set`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerOptions {
    /// Write server log lines to disk
    #[serde(default = "default_true")]
    pub logable: bool,
    /// Append default-room messages to the chat transcript
    #[serde(default = "default_true")]
    pub recordable: bool,
    /// Reject guest logins, accounts only
    #[serde(default)]
    pub force_account: bool,
    /// Accept REGISTER frames
    #[serde(default = "default_true")]
    pub allow_register: bool,
    /// Only Admin accounts may log in; existing sessions stay
    #[serde(default)]
    pub lock_server: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            logable: true,
            recordable: true,
            force_account: false,
            allow_register: true,
            lock_server: false,
        }
    }
}

impl ServerOptions {
    /// Set one option by its wire name. Returns false for an unknown key
    /// or a value that is not `true`/`false`.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let flag = match value {
            "true" => true,
            "false" => false,
            _ => return false,
        };
        match key {
            "logable" => self.logable = flag,
            "recordable" => self.recordable = flag,
            "forceAccount" => self.force_account = flag,
            "allowRegister" => self.allow_register = flag,
            "lockServer" => self.lock_server = flag,
            _ => return false,
        }
        true
    }

    /// Render the current options for an `option show` reply.
    pub fn show(&self) -> String {
        format!(
            "Server Management Settings\n\
             logable: {}\n\
             recordable: {}\n\
             forceAccount: {}\n\
             allowRegister: {}\n\
             lockServer: {}",
            self.logable, self.recordable, self.force_account, self.allow_register, self.lock_server
        )
    }
}

/// Startup configuration for the whole server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name of the default room every session belongs to
    #[serde(default = "default_room")]
    pub default_room: String,
    /// SQLite database path for the account store
    #[serde(default = "default_database")]
    pub database_path: PathBuf,
    /// Chat transcript path
    #[serde(default = "default_transcript")]
    pub transcript_path: PathBuf,
    /// Directory where transferred files are saved
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
    /// Runtime-mutable options
    #[serde(default)]
    pub options: ServerOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_room: default_room(),
            database_path: default_database(),
            transcript_path: default_transcript(),
            files_dir: default_files_dir(),
            options: ServerOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| AppError::Config(format!("{}: {e}", path.display())))
    }

    /// Socket address to bind.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Create the directories the server writes into (database, transcript,
    /// transferred files). Missing parents are created, existing ones kept.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for parent in [
            self.database_path.parent(),
            self.transcript_path.parent(),
            Some(self.files_dir.as_path()),
        ]
        .into_iter()
        .flatten()
        {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
