//! Error types for ghosting, packets and configuration.

use ghostwire_shared::StreamError;
use thiserror::Error;

/// Result type for packet processing.
pub type NetResult<T> = Result<T, NetError>;

/// Errors that make an incoming packet unusable.
///
/// Desync that the protocol repairs by itself (unresolved references,
/// CRC mismatches, refused moves) never shows up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// Packet ended early or carried a bad string.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// Ghost record named a class this build does not know.
    #[error("unknown ghost class {0}")]
    UnknownClass(u32),

    /// Update for a ghost index that was never created on this side.
    #[error("update for unknown ghost index {0}")]
    UnknownGhost(u32),

    /// Packet was addressed to a connection that does not exist.
    #[error("no connection with id {0}")]
    UnknownConnection(u32),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for the expected structure.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
