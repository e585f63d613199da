//! Error types for bit-stream reads.

use thiserror::Error;

/// Result type for stream reads.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors raised while reading a [`crate::BitStream`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A read went past the readable end of the stream.
    #[error("read of {requested} bits at bit {position} exceeds readable size of {available} bits")]
    UnexpectedEnd {
        /// Bits asked for.
        requested: usize,
        /// Cursor position when the read started.
        position: usize,
        /// Readable size in bits.
        available: usize,
    },

    /// String bytes were not UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
}
