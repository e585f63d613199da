//! # GHOSTWIRE Shared
//!
//! Common types used by both client and server.
//!
//! - [`Point`] / [`Rect`]: the 2D math every simulation and wire format uses.
//! - [`BitStream`]: the bit-exact sink/source behind packets, control-state
//!   CRCs and the execution journal.
//!
//! ## CRITICAL RULE
//!
//! Whatever is written through a [`BitStream`] on one endpoint must read back
//! bit-for-bit on the other. Quantizing writers (`write_float`,
//! `write_ranged_u32`) are the only lossy operations.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod bitstream;
pub mod error;
pub mod math;

pub use bitstream::BitStream;
pub use error::{StreamError, StreamResult};
pub use math::{Point, Rect};
