//! # GHOSTWIRE Networking - Ghosts and Prediction
//!
//! Keeps a client's copy of the world consistent with the server over a
//! lossy, bandwidth-limited link, and hides latency for the object the
//! client controls.
//!
//! ## Architecture
//!
//! - **Ghosts**: per-connection indices for replicated objects
//! - **Codec**: masked, bit-packed delta updates with retry of unresolved references
//! - **Notify**: every packet's fate is reported, lost aspects are re-armed
//! - **Prediction**: queued moves, CRC comparison, replay on correction
//!
//! ```text
//! SERVER                                   CLIENT
//!   world ──► ghost records ─────────────► ghosted world
//!     ▲       control state on mismatch ──► load + replay
//!     │                                       │
//!     └──── moves (time-credited) ◄───────────┘ predicted moves
//! ```
//!
//! Transport and connection handshakes are outside this crate: sessions
//! take and produce byte buffers.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod compression;
pub mod config;
pub mod control;
pub mod error;
pub mod ghost;
pub mod packet;
pub mod replication;
pub mod server;
pub mod simulation;

pub use client::ClientSession;
pub use config::SessionConfig;
pub use control::{control_crc, ControlConnection, MAX_PENDING_MOVES};
pub use error::{ConfigError, ConfigResult, NetError, NetResult};
pub use ghost::{GhostTable, GHOST_INDEX_BITS};
pub use packet::{PacketHeader, PacketWindow, MAX_PACKET_SIZE};
pub use replication::{GhostContext, Replicated, UnpackOutcome};
pub use server::{ConnectionId, ServerConnection, ServerSession};
pub use simulation::{LinkConditions, LinkStats, LossyLink};
