//! File-transfer registry
//!
//! The byte-copy side channel runs outside the core; what the core owns is
//! the file-id to path registry the side channel consults. A save is
//! refused when the target path already exists.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Handshake reply words used on the transfer side channel.
pub mod reply {
    pub const EXISTS: &str = "exists";
    pub const SUCCESSFUL: &str = "successful";
    pub const RECEIVING: &str = "receiving";
    pub const SENDING: &str = "sending";
}

/// Outcome of offering a new file for saving.
#[derive(Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Path reserved; the side channel may start receiving
    Accepted(PathBuf),
    /// The target path already exists on disk or is already registered
    AlreadyExists,
}

/// Maps transfer ids to paths under the configured files directory.
#[derive(Debug)]
pub struct FileRegistry {
    root: PathBuf,
    entries: HashMap<String, PathBuf>,
}

impl FileRegistry {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            entries: HashMap::new(),
        }
    }

    /// Reserve a path for an incoming file. File names are flattened to
    /// their final component so a transfer cannot escape the files
    /// directory.
    pub fn offer(&mut self, file_id: &str, file_name: &str) -> SaveOutcome {
        let name = Path::new(file_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| file_name.into());
        let path = self.root.join(name);
        if path.exists() || self.entries.values().any(|p| p == &path) {
            return SaveOutcome::AlreadyExists;
        }
        self.entries.insert(file_id.to_string(), path.clone());
        SaveOutcome::Accepted(path)
    }

    /// Path for a registered transfer id, consulted by the sending side.
    pub fn resolve(&self, file_id: &str) -> Option<&PathBuf> {
        self.entries.get(file_id)
    }
}
