//! Last-used pedalboard lookup.
//!
//! The panel-ready handshake restores whatever (bank, pedalboard) was in
//! use when the process last ran. The store is deliberately forgiving: a
//! missing or unreadable record means "nothing to restore", never an error
//! the handshake has to handle.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastBoard {
    pub bank_id: i64,
    pub bundle_path: String,
}

/// Where the last-used pedalboard is remembered between runs.
pub trait LastBoardStore: Send + Sync {
    /// The last-used board, or `None` when there is nothing to restore.
    fn last(&self) -> Option<LastBoard>;

    fn remember(&self, board: &LastBoard);

    fn forget(&self);
}

/// JSON record under the state directory.
pub struct FileLastBoardStore {
    path: PathBuf,
}

impl FileLastBoardStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("last_pedalboard.json"),
        }
    }
}

impl LastBoardStore for FileLastBoardStore {
    fn last(&self) -> Option<LastBoard> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "last pedalboard record unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(board) => Some(board),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "last pedalboard record corrupt");
                None
            }
        }
    }

    fn remember(&self, board: &LastBoard) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string_pretty(board)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            fs::write(&self.path, raw)
        };
        match write() {
            Ok(()) => debug!(bundle = %board.bundle_path, bank = board.bank_id, "last pedalboard remembered"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remember last pedalboard"),
        }
    }

    fn forget(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to forget last pedalboard");
            }
        }
    }
}
