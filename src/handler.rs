//! TCP connection handler
//!
//! Handles individual client connections: NUL-delimited frame decoding,
//! and bidirectional communication with the ChatServer.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::client::Outbound;
use crate::codec::EnvelopeCodec;
use crate::error::AppError;
use crate::server::ServerCommand;
use crate::types::ConnId;

/// Handle a new TCP connection
///
/// Sets up framed reading and writing over the stream and manages the
/// connection lifecycle. The handler never touches shared state; every
/// decoded frame goes to the ChatServer in receipt order.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream.peer_addr()?;

    debug!("New TCP connection from {}", peer_addr);

    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, EnvelopeCodec);
    let mut writer = FramedWrite::new(write_half, EnvelopeCodec);

    let conn_id = ConnId::new();
    info!("Connection {} opened from {}", conn_id, peer_addr);

    // Channel for server -> connection traffic
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(32);

    // Register with ChatServer
    if cmd_tx
        .send(ServerCommand::Connect {
            conn_id,
            addr: peer_addr,
            sender: out_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register connection {} - server closed", conn_id);
        return Err(AppError::ChannelSend);
    }

    // Clone cmd_tx for the read task
    let cmd_tx_read = cmd_tx.clone();

    // Read task (socket -> ServerCommand)
    let read_task = tokio::spawn(async move {
        while let Some(frame_result) = reader.next().await {
            match frame_result {
                Ok(message) => {
                    if cmd_tx_read
                        .send(ServerCommand::Frame { conn_id, message })
                        .await
                        .is_err()
                    {
                        debug!("Server closed, ending read task for {}", conn_id);
                        break;
                    }
                }
                Err(e) => {
                    warn!("Framing error on {}: {}", conn_id, e);
                    let _ = cmd_tx_read
                        .send(ServerCommand::FrameFault {
                            conn_id,
                            detail: e.to_string(),
                        })
                        .await;
                    break;
                }
            }
        }
        debug!("Read task ended for {}", conn_id);
    });

    // Write task (Outbound -> socket)
    let write_task = tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            match out {
                Outbound::Frame(envelope) => {
                    if writer.send(envelope).await.is_err() {
                        debug!("Socket send failed, ending write task for {}", conn_id);
                        break;
                    }
                }
                Outbound::Close => {
                    debug!("Close requested for {}", conn_id);
                    break;
                }
            }
        }
        let _ = writer.close().await;
        debug!("Write task ended for {}", conn_id);
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", conn_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", conn_id);
        }
    }

    // Send disconnect command
    let _ = cmd_tx.send(ServerCommand::Disconnect { conn_id }).await;

    info!("Connection {} closed", conn_id);

    Ok(())
}
