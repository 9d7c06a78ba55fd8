//! Connection registry entry
//!
//! Represents one open transport endpoint inside the server actor: its
//! outbound channel, lifecycle state and, once login completes, the name
//! of the session it owns.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::Envelope;
use crate::types::ConnId;

/// Lifecycle of a connection.
///
/// `Authenticating -> Active -> Closing -> Closed`; there is no way back
/// to `Authenticating`, a re-login requires a new connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Connected, no session yet; only login/registration frames count
    Authenticating,
    /// Login completed, session registered
    Active,
    /// Teardown started (kick, ban, error); no further frames processed
    Closing,
    /// Transport released
    Closed,
}

/// What the actor pushes to a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    /// Encode and send one envelope
    Frame(Envelope),
    /// Flush and close the transport after everything queued before it
    Close,
}

/// One connected client as the server actor sees it.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ConnId,
    /// Peer address; the port feeds name-collision resolution
    pub addr: SocketAddr,
    /// Actor -> writer-task channel
    pub sender: mpsc::Sender<Outbound>,
    /// Lifecycle state
    pub state: ConnState,
    /// Display name of the session owned by this connection, if any
    pub session_name: Option<String>,
}

impl Client {
    /// Create a new client in the `Authenticating` state.
    pub fn new(id: ConnId, addr: SocketAddr, sender: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            addr,
            sender,
            state: ConnState::Authenticating,
            session_name: None,
        }
    }

    /// Queue one envelope for this connection.
    ///
    /// Returns an error if the writer task is gone (client disconnected).
    pub async fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.sender
            .send(Outbound::Frame(envelope))
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Ask the writer task to flush and close the transport.
    pub async fn close(&self) {
        let _ = self.sender.send(Outbound::Close).await;
    }
}
