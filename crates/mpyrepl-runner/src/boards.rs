//! Saved WebREPL boards.
//!
//! `webrepl setup` records every provisioned board in a JSON file so its
//! URL and password can be looked up later:
//!
//! ```json
//! [
//!   {
//!     "boardname": "greenhouse",
//!     "wsurl": "ws://192.168.1.20:8266",
//!     "webreplpw": "secret",
//!     "date": "2026-10-16T09:30:00+02:00"
//!   }
//! ]
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use mpyrepl_transport::{ConnectionProfile, DEFAULT_LOGIN_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RunnerResult;

/// Registry file used when none is given.
pub const DEFAULT_BOARDS_FILE: &str = "boards.json";

/// One provisioned board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardRecord {
    #[serde(rename = "boardname")]
    pub name: String,
    #[serde(rename = "wsurl")]
    pub url: String,
    #[serde(rename = "webreplpw")]
    pub password: String,
    /// When the board was provisioned.
    pub date: DateTime<Local>,
}

impl BoardRecord {
    /// A record stamped with the current local time.
    pub fn now(
        name: impl Into<String>,
        url: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        BoardRecord {
            name: name.into(),
            url: url.into(),
            password: password.into(),
            date: Local::now(),
        }
    }

    /// Connection profile reaching this board through WebREPL.
    pub fn connection(&self) -> ConnectionProfile {
        ConnectionProfile::WebSocket {
            url: self.url.clone(),
            password: Some(self.password.clone()),
            login_timeout_ms: DEFAULT_LOGIN_TIMEOUT_MS,
        }
    }
}

/// The boards saved in one JSON file.
#[derive(Debug)]
pub struct BoardRegistry {
    path: PathBuf,
    boards: Vec<BoardRecord>,
}

impl BoardRegistry {
    /// Read the registry at `path`. A missing file is an empty registry.
    pub fn load(path: impl AsRef<Path>) -> RunnerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let boards = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            Vec::new()
        };
        Ok(BoardRegistry { path, boards })
    }

    pub fn boards(&self) -> &[BoardRecord] {
        &self.boards
    }

    /// The board called `name`.
    pub fn find(&self, name: &str) -> Option<&BoardRecord> {
        self.boards.iter().find(|board| board.name == name)
    }

    /// Add `record`, replacing a board of the same name.
    pub fn upsert(&mut self, record: BoardRecord) {
        match self.boards.iter_mut().find(|board| board.name == record.name) {
            Some(existing) => *existing = record,
            None => self.boards.push(record),
        }
    }

    /// Write the registry back, creating its directory if needed.
    pub fn save(&self) -> RunnerResult<()> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.boards)?)?;
        debug!(path = %self.path.display(), boards = self.boards.len(), "saved board registry");
        Ok(())
    }
}
