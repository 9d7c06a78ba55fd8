//! Multi-room TCP Chat Server Library
//!
//! A multi-user chat server speaking NUL-delimited JSON envelopes over
//! plain TCP, built on tokio using the Actor pattern for state
//! management.
//!
//! # Features
//! - Guest and account logins with md5-digest credentials
//! - A default room every session belongs to, plus named rooms
//! - Room-targeted, private and broadcast message delivery
//! - Three-tier permissions (User, Manager, Admin) and admin commands
//! - SQLite-backed accounts with bans and online enforcement
//! - Default-room transcript recording and runtime option toggles
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor managing all state
//! - Each connection has a `handler` task communicating with the server
//! - Credential checks run on blocking workers and report back as commands
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//!
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use chatd::{handle_connection, AccountStore, ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let store = Arc::new(AccountStore::open(&config.database_path).unwrap());
//!     let listener = TcpListener::bind(config.listen_addr()).await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(ChatServer::new(&config, store, cmd_rx, cmd_tx.clone()).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod files;
pub mod handler;
pub mod login;
pub mod message;
pub mod server;
pub mod session;
pub mod store;
pub mod transcript;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, Outbound};
pub use codec::EnvelopeCodec;
pub use config::{ServerConfig, ServerOptions};
pub use directory::Directory;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{Envelope, Inbound};
pub use server::{ChatServer, ServerCommand};
pub use store::AccountStore;
pub use types::{ConnId, Permission, SessionId};
