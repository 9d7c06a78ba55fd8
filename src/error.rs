//! Error types for the chat server
//!
//! Defines the fault taxonomy: transport and framing faults tear down a
//! single connection, auth faults end a login attempt, permission/syntax
//! faults turn into a reply to the sender, persistence faults are logged
//! and answered with a generic failure. Uses thiserror for ergonomic
//! error definitions.

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Transport-level error (reset, broken pipe, EOF) - fatal for one connection
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error: a frame exceeded the size cap or the stream is unrecoverable
    #[error("frame error: {0}")]
    Frame(String),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("channel send error")]
    ChannelSend,

    /// Login or registration rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Command issued below the required permission level
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Missing or invalid command arguments, unknown sub-command
    #[error("syntax error: {0}")]
    CommandSyntax(String),

    /// Account store unavailable or query failure
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Configuration file could not be read or parsed
    #[error("config error: {0}")]
    Config(String),
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("channel closed")]
    ChannelClosed,
}
