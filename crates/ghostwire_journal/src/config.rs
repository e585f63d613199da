//! Journal configuration.
//!
//! ```toml
//! mode = "record"
//! path = "sessions/client.journal"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::JournalResult;
use crate::journal::JournalMode;

/// Which mode to start a journal in, and where its file lives.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Starting mode.
    pub mode: JournalMode,
    /// Journal file, written when recording and read for playback.
    pub path: PathBuf,
}

impl JournalConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// [`crate::JournalError::Config`] for malformed TOML or an unknown mode.
    pub fn from_toml_str(text: &str) -> JournalResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// [`crate::JournalError::Io`] if the file cannot be read, or a parse error.
    pub fn from_toml_file(path: impl AsRef<Path>) -> JournalResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            mode: JournalMode::Inactive,
            path: PathBuf::from("session.journal"),
        }
    }
}
