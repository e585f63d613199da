//! # Session Configuration
//!
//! Tunables that each endpoint may choose for itself. Anything both ends
//! must agree on (bit widths, visibility window, move bounds) is a
//! compile-time constant instead.
//!
//! ```toml
//! server_tick_ms = 32
//! max_time_credit_ms = 512
//! one_way_latency_ms = 50
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigResult;

/// Per-endpoint session settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Server simulation step in milliseconds.
    pub server_tick_ms: u32,
    /// Interval between outgoing client packets in milliseconds.
    pub client_packet_interval_ms: u32,
    /// Upper bound on the move time a client may bank, in milliseconds.
    pub max_time_credit_ms: u32,
    /// Estimated one-way latency used to extrapolate received positions.
    pub one_way_latency_ms: u32,
    /// Highest priority bonus a starved ghost can accumulate.
    pub max_update_skips: u32,
}

impl SessionConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed TOML or mistyped values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a parse error.
    pub fn from_toml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_tick_ms: 32,
            client_packet_interval_ms: 32,
            max_time_credit_ms: 512,
            one_way_latency_ms: 50,
            max_update_skips: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = SessionConfig::from_toml_str("max_time_credit_ms = 100\n").unwrap();
        assert_eq!(config.max_time_credit_ms, 100);
        assert_eq!(config.server_tick_ms, SessionConfig::default().server_tick_ms);
    }

    #[test]
    fn test_bad_type_is_parse_error() {
        let err = SessionConfig::from_toml_str("server_tick_ms = \"fast\"\n").unwrap_err();
        assert!(matches!(err, crate::error::ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SessionConfig::from_toml_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, crate::error::ConfigError::Io(_)));
    }
}
