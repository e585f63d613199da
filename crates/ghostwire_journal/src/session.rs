//! # Journaled Client Session
//!
//! Routes every external input of a [`ClientSession`] through the journal:
//!
//! ```text
//! client_idle(dt, move)   ─► session.idle ─► outgoing packet
//! receive_packet(bytes)   ─► session.receive_packet
//! console_command(text)   ─► console output
//! ```
//!
//! Replaying a recording feeds the same inputs in the same order, so the
//! replayed client ends in the same state as the recorded one.

use std::time::{SystemTime, UNIX_EPOCH};

use ghostwire_core::Move;
use ghostwire_networking::{ClientSession, SessionConfig};
use tracing::warn;

use crate::config::JournalConfig;
use crate::error::JournalResult;
use crate::journal::{EntryContext, EntryInfo, Journal};
use crate::registry::JournalRegistry;

/// Entry name for a client frame.
pub const CLIENT_IDLE: &str = "client_idle";
/// Entry name for an incoming server packet.
pub const RECEIVE_PACKET: &str = "receive_packet";
/// Entry name for a console line.
pub const CONSOLE_COMMAND: &str = "console_command";

/// Dispatch target for the client entry points.
#[derive(Debug)]
pub struct JournaledClient {
    session: ClientSession,
    outgoing: Vec<Vec<u8>>,
    console: Vec<String>,
    packet_errors: u32,
}

impl JournaledClient {
    /// Wraps a fresh client session.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            session: ClientSession::new(config),
            outgoing: Vec::new(),
            console: Vec::new(),
            packet_errors: 0,
        }
    }

    /// The wrapped session.
    #[must_use]
    pub const fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Lines printed by console commands.
    #[must_use]
    pub fn console_output(&self) -> &[String] {
        &self.console
    }

    /// Server packets that failed to decode.
    #[must_use]
    pub const fn packet_errors(&self) -> u32 {
        self.packet_errors
    }

    fn idle(&mut self, delta_ms: u32, input: Move) {
        self.session.idle(delta_ms, input);
        let packet = self.session.write_packet();
        self.outgoing.push(packet);
    }

    fn receive(&mut self, bytes: &[u8]) {
        if let Err(err) = self.session.receive_packet(bytes) {
            self.packet_errors += 1;
            warn!(%err, len = bytes.len(), "dropping undecodable server packet");
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn console(&mut self, ctx: &mut EntryContext<'_>, line: &str) {
        let mut words = line.split_whitespace();
        let reply = match words.next() {
            None => return,
            Some("stats") => {
                let control = self.session.control();
                format!(
                    "ghosts {} objects {} pending {} corrections {}",
                    self.session.ghosts().len(),
                    self.session.world().len(),
                    control.pending_move_count(),
                    control.correction_count()
                )
            }
            Some("clock") => {
                let now = ctx.capture("wall_clock", || {
                    SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs() as u32)
                        .unwrap_or(0)
                });
                match now {
                    Some(secs) => format!("clock {secs}"),
                    None => String::from("clock unavailable"),
                }
            }
            Some("echo") => words.collect::<Vec<_>>().join(" "),
            Some(other) => format!("unknown command: {other}"),
        };
        self.console.push(reply);
    }
}

/// Registry of the client entry points.
#[must_use]
pub fn client_registry() -> JournalRegistry<JournaledClient> {
    let mut registry = JournalRegistry::new();
    registry
        .register(CLIENT_IDLE, |client: &mut JournaledClient, _ctx: &mut EntryContext<'_>, (delta_ms, input): (u32, Move)| {
            client.idle(delta_ms, input);
        })
        .register(RECEIVE_PACKET, |client: &mut JournaledClient, _ctx: &mut EntryContext<'_>, bytes: Vec<u8>| {
            client.receive(&bytes);
        })
        .register(CONSOLE_COMMAND, |client: &mut JournaledClient, ctx: &mut EntryContext<'_>, line: String| {
            client.console(ctx, &line);
        });
    registry
}

/// A client session whose inputs all go through a [`Journal`].
#[derive(Debug)]
pub struct ClientJournal {
    journal: Journal<JournaledClient>,
    client: JournaledClient,
}

impl ClientJournal {
    /// Creates an unjournaled client.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            journal: Journal::new(client_registry()),
            client: JournaledClient::new(config),
        }
    }

    /// Creates a client journaled as `journal` asks.
    ///
    /// # Errors
    ///
    /// Whatever opening the journal reports.
    pub fn from_config(session: SessionConfig, journal: &JournalConfig) -> JournalResult<Self> {
        Ok(Self {
            journal: Journal::from_config(client_registry(), journal)?,
            client: JournaledClient::new(session),
        })
    }

    /// The journal.
    #[must_use]
    pub const fn journal(&self) -> &Journal<JournaledClient> {
        &self.journal
    }

    /// Mutable access to the journal, for `record` and `load`.
    pub fn journal_mut(&mut self) -> &mut Journal<JournaledClient> {
        &mut self.journal
    }

    /// The client.
    #[must_use]
    pub const fn client(&self) -> &JournaledClient {
        &self.client
    }

    /// Runs one client frame. The move is quantized before it is journaled.
    ///
    /// # Errors
    ///
    /// Journal I/O errors while recording.
    pub fn idle(&mut self, delta_ms: u32, mut input: Move) -> JournalResult<()> {
        input.time = delta_ms;
        input.prepare();
        self.journal.call_entry(&mut self.client, CLIENT_IDLE, &(delta_ms, input))
    }

    /// Hands a server packet to the client.
    ///
    /// # Errors
    ///
    /// Journal I/O errors while recording. Undecodable packets are counted,
    /// not returned.
    pub fn receive_packet(&mut self, bytes: &[u8]) -> JournalResult<()> {
        self.journal.call_entry(&mut self.client, RECEIVE_PACKET, &bytes.to_vec())
    }

    /// Runs a console line.
    ///
    /// # Errors
    ///
    /// Journal I/O errors while recording.
    pub fn console_command(&mut self, line: &str) -> JournalResult<()> {
        self.journal.call_entry(&mut self.client, CONSOLE_COMMAND, &line.to_owned())
    }

    /// Packets the client produced since the last call.
    pub fn take_outgoing(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.client.outgoing)
    }

    /// Replays the next recorded entry.
    ///
    /// # Errors
    ///
    /// Structural journal errors. The run cannot continue after one.
    pub fn play_next(&mut self) -> JournalResult<Option<EntryInfo>> {
        self.journal.process_next_entry(&mut self.client)
    }

    /// Replays every remaining entry, returning how many ran.
    ///
    /// # Errors
    ///
    /// The first structural journal error.
    pub fn play_all(&mut self) -> JournalResult<usize> {
        let mut count = 0;
        while self.play_next()?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}
