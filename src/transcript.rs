//! Chat transcript writer
//!
//! Appends default-room messages to a transcript file. Write failures are
//! logged and swallowed; transcript loss never affects delivery.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tracing::warn;

use crate::message::Envelope;

/// Appends delivered default-room messages to a file.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append one message. Best effort.
    pub fn record(&self, envelope: &Envelope) {
        let line = match serde_json::to_string(envelope) {
            Ok(line) => line,
            Err(e) => {
                warn!("transcript serialization failed: {e}");
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            warn!("transcript write to {} failed: {e}", self.path.display());
        }
    }
}
