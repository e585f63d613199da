//! # GHOSTWIRE Journal
//!
//! Deterministic record/playback of the calls that drive a session from
//! outside: frames, packets, console lines.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  call_entry(name, args)  ┌──────────┐  handler(target, args)
//! │  caller   │ ───────────────────────► │ Journal  │ ─────────────────────► T
//! └───────────┘                          └────┬─────┘
//!                                 record │    ▲ playback
//!                                        ▼    │
//!                                   ┌──────────────┐
//!                                   │ journal file │
//!                                   └──────────────┘
//! ```
//!
//! Structural errors during playback ([`JournalError::is_structural`])
//! mean the recording and the replaying binary disagree. Drivers stop on
//! the first one.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod args;
pub mod config;
pub mod error;
pub mod journal;
pub mod registry;
pub mod session;

pub use args::JournalArgs;
pub use config::JournalConfig;
pub use error::{JournalError, JournalResult};
pub use journal::{BlockDirection, BlockSpan, EntryContext, EntryInfo, Journal, JournalMode, HEADER_BITS};
pub use registry::{JournalRegistry, MAX_ENTRY_NAME_LEN};
pub use session::{client_registry, ClientJournal, JournaledClient, CLIENT_IDLE, CONSOLE_COMMAND, RECEIVE_PACKET};
