//! Error types for the execution journal.
//!
//! Everything here except [`JournalError::Io`] and
//! [`JournalError::Config`] means the journal does not match the binary
//! replaying it. Playback drivers stop on the first one.

use ghostwire_shared::StreamError;
use thiserror::Error;

use crate::journal::JournalMode;

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Journal errors.
#[derive(Error, Debug)]
pub enum JournalError {
    /// Opening, reading or flushing the journal file failed.
    #[error("journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Playback reached the declared end of the journal in the middle of an entry.
    #[error("journal truncated: entry at bit {position} runs past declared end at bit {declared}")]
    Truncated {
        /// Bit offset of the entry being read.
        position: usize,
        /// Bit count declared in the header.
        declared: usize,
    },

    /// The header's bit count disagrees with the file length.
    #[error("journal header declares {declared} bits but the file holds {file_bytes} bytes")]
    SizeMismatch {
        /// Bit count declared in the header.
        declared: usize,
        /// Actual file length.
        file_bytes: usize,
    },

    /// A recorded or called entry has no registered handler.
    #[error("no journal entry registered as '{0}'")]
    UnknownEntry(String),

    /// `record` or `load` was called on a journal that is already active.
    #[error("journal is already in {0:?} mode")]
    ModeAlreadySelected(JournalMode),

    /// Arguments could not be read back.
    #[error("journal stream error: {0}")]
    Stream(#[from] StreamError),

    /// A journal configuration file could not be parsed.
    #[error("journal config parse failed: {0}")]
    Config(#[from] toml::de::Error),
}

impl JournalError {
    /// True for errors that mean the journal cannot be trusted any further.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::SizeMismatch { .. } | Self::UnknownEntry(_) | Self::Stream(_)
        )
    }
}
