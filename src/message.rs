//! Wire envelope and inbound classification
//!
//! Every logical message travels as one JSON envelope
//! `{by, to, type, time, message, file?}`. After the framing layer has
//! reassembled a complete frame, [`Inbound::classify`] turns the raw bytes
//! into a tagged variant carrying only the fields that kind needs.
//! Structurally malformed input becomes [`Inbound::Malformed`] and is never
//! forwarded to other sessions.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Sender name used for every server-originated envelope.
pub const SERVER_NAME: &str = "Server";

/// Envelope `type` tags understood by the dispatcher.
pub mod kind {
    pub const TEXT_MESSAGE: &str = "TEXT_MESSAGE";
    pub const COLOR_MESSAGE: &str = "COLOR_MESSAGE";
    pub const USER_NAME: &str = "USER_NAME";
    pub const REGISTER: &str = "REGISTER";
    pub const COMMAND: &str = "COMMAND";
    pub const SEND_FILE: &str = "SEND_FILE";

    // Server -> client only
    pub const USER_MANIFEST: &str = "USER_MANIFEST";
    pub const ROOM_MANIFEST: &str = "ROOM_MANIFEST";
    pub const MANAGER_LIST: &str = "MANAGER_LIST";
    pub const KICK_NOTICE: &str = "KICK_NOTICE";
    pub const DEFAULT_ROOM: &str = "DEFAULT_ROOM";
    pub const REGISTER_RESULT: &str = "REGISTER_RESULT";
}

/// The structured application-level message unit exchanged over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Sender name
    pub by: String,
    /// Target name - a room or a username
    pub to: String,
    /// Message type tag, see [`kind`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Send timestamp, seconds since the unix epoch
    pub time: f64,
    /// Payload - free text, command line or credential blob depending on kind
    pub message: String,
    /// Filename, present only for file-transfer handshakes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    pub fn new(
        message: impl Into<String>,
        by: impl Into<String>,
        to: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            by: by.into(),
            to: to.into(),
            kind: kind.into(),
            time: now(),
            message: message.into(),
            file: None,
        }
    }

    /// Build a server-originated envelope addressed to one connection.
    pub fn server(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(message, SERVER_NAME, "", kind)
    }

    /// Plain server text reply, the workhorse of command responses.
    pub fn server_text(message: impl Into<String>) -> Self {
        Self::server(message, kind::TEXT_MESSAGE)
    }
}

/// Current unix timestamp in seconds.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A decoded frame, classified by its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `TEXT_MESSAGE` - broadcast or private chat text
    Text {
        to: String,
        by: String,
        time: f64,
        body: String,
    },
    /// `COLOR_MESSAGE` - chat text with client-side color markup
    Color {
        to: String,
        by: String,
        time: f64,
        body: String,
    },
    /// `USER_NAME` - login credential blob `username\r\npassword`
    UserName { payload: String },
    /// `REGISTER` - registration credential blob `username\r\npassword`
    Register { payload: String },
    /// `COMMAND` - administrative command line from a named sender
    Command { sender: String, line: String },
    /// `SEND_FILE` - offer of a named file for the transfer side channel
    SendFile { name: String },
    /// A recognized envelope with a type tag the dispatcher does not handle
    Unknown { tag: String },
    /// Input that fails envelope validation; dropped with a diagnostic
    Malformed,
}

impl Inbound {
    /// Classify one reassembled frame.
    ///
    /// Bad JSON or an envelope missing `by`/`to`/`message` yields
    /// [`Inbound::Malformed`]; an unrecognized `type` yields
    /// [`Inbound::Unknown`] so the sender gets an explicit reply instead
    /// of a dropped connection.
    pub fn classify(frame: &[u8]) -> Inbound {
        let envelope: Envelope = match serde_json::from_slice(frame) {
            Ok(envelope) => envelope,
            Err(_) => return Inbound::Malformed,
        };
        match envelope.kind.as_str() {
            kind::TEXT_MESSAGE => Inbound::Text {
                to: envelope.to,
                by: envelope.by,
                time: envelope.time,
                body: envelope.message,
            },
            kind::COLOR_MESSAGE => Inbound::Color {
                to: envelope.to,
                by: envelope.by,
                time: envelope.time,
                body: envelope.message,
            },
            kind::USER_NAME => Inbound::UserName {
                payload: envelope.message,
            },
            kind::REGISTER => Inbound::Register {
                payload: envelope.message,
            },
            kind::COMMAND => Inbound::Command {
                sender: envelope.by,
                line: envelope.message,
            },
            kind::SEND_FILE => Inbound::SendFile {
                name: envelope.file.unwrap_or(envelope.message),
            },
            other => Inbound::Unknown {
                tag: other.to_string(),
            },
        }
    }
}
