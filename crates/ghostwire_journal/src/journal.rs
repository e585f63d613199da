//! # Execution Journal
//!
//! Records every call into a registered entry point and replays them in the
//! same order. Anything else a handler needs that is not a pure function of
//! its arguments (wall clock, OS queries) goes through a journaled block.
//!
//! ## File Format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ total bit count, u32 LE (counts these 32 bits too)       │
//! ├──────────────────────────────────────────────────────────┤
//! │ entry: name (8-bit length + bytes) │ marshalled args     │
//! │        │ blocks written by the handler, inline            │
//! ├──────────────────────────────────────────────────────────┤
//! │ entry ...                                                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The header is rewritten after every entry, so a file cut short by a
//! crash still declares how much of it is valid. Entries carry no length
//! of their own: reading one back needs the same registry that wrote it.
//!
//! ## Modes
//!
//! - **Inactive**: calls dispatch directly.
//! - **Record**: calls are written, flushed, then dispatched.
//! - **Playback**: direct calls are ignored; [`Journal::process_next_entry`]
//!   drives the handlers from the file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use ghostwire_shared::{BitStream, StreamError, StreamResult};
use serde::Deserialize;
use tracing::{debug, info, trace};

use crate::args::JournalArgs;
use crate::config::JournalConfig;
use crate::error::{JournalError, JournalResult};
use crate::registry::JournalRegistry;

/// Size of the bit-count header.
pub const HEADER_BITS: usize = 32;

/// What the journal does with entry calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Calls dispatch directly, nothing is written.
    #[default]
    Inactive,
    /// Calls are written to the journal file and dispatched.
    Record,
    /// Calls come from the journal file.
    Playback,
}

/// Whether a block was written or read back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockDirection {
    /// Written while recording.
    Write,
    /// Read during playback.
    Read,
}

/// Where a journaled block sits in the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSpan {
    /// Interned block name, see [`Journal::block_name`].
    pub id: u32,
    /// Write or read.
    pub direction: BlockDirection,
    /// First bit, counted from the start of the file.
    pub start_bit: usize,
    /// One past the last bit.
    pub end_bit: usize,
}

/// One entry processed during playback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    /// Entry-point name.
    pub name: String,
    /// First bit of the entry, counted from the start of the file.
    pub start_bit: usize,
    /// One past the last bit, blocks included.
    pub end_bit: usize,
}

#[derive(Debug, Default)]
struct BlockLog {
    names: Vec<String>,
    ids: BTreeMap<String, u32>,
    spans: Vec<BlockSpan>,
}

impl BlockLog {
    #[allow(clippy::cast_possible_truncation)]
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        id
    }
}

/// What a handler sees of the journal while it runs.
pub struct EntryContext<'a> {
    mode: JournalMode,
    stream: &'a mut BitStream,
    base_bits: usize,
    args: Option<&'a mut BitStream>,
    blocks: &'a mut BlockLog,
    failure: Option<StreamError>,
}

impl EntryContext<'_> {
    /// Mode of the journal driving this call.
    #[must_use]
    pub const fn mode(&self) -> JournalMode {
        self.mode
    }

    /// Runs `write` against the journal while recording. Skipped otherwise.
    pub fn write_block(&mut self, name: &str, write: impl FnOnce(&mut BitStream)) {
        if self.mode != JournalMode::Record {
            return;
        }
        let id = self.blocks.intern(name);
        let start_bit = self.base_bits + self.stream.bit_position();
        write(self.stream);
        let end_bit = self.base_bits + self.stream.bit_position();
        self.blocks.spans.push(BlockSpan {
            id,
            direction: BlockDirection::Write,
            start_bit,
            end_bit,
        });
    }

    /// Runs `read` against the journal during playback. Returns `None` in
    /// other modes, or once a read in this entry has failed.
    pub fn read_block<R>(&mut self, name: &str, read: impl FnOnce(&mut BitStream) -> StreamResult<R>) -> Option<R> {
        if self.mode != JournalMode::Playback || self.failure.is_some() {
            return None;
        }
        let id = self.blocks.intern(name);
        let start_bit = self.stream.bit_position();
        match read(self.stream) {
            Ok(value) => {
                self.blocks.spans.push(BlockSpan {
                    id,
                    direction: BlockDirection::Read,
                    start_bit,
                    end_bit: self.stream.bit_position(),
                });
                Some(value)
            }
            Err(err) => {
                self.failure = Some(err);
                None
            }
        }
    }

    /// A value produced outside the simulation: `produce` runs live, the
    /// result is recorded, and playback returns the recorded value instead.
    ///
    /// `None` only when playback cannot read the block back.
    pub fn capture<V: JournalArgs>(&mut self, name: &str, produce: impl FnOnce() -> V) -> Option<V> {
        match self.mode {
            JournalMode::Inactive => Some(produce()),
            JournalMode::Record => {
                let value = produce();
                self.write_block(name, |stream| value.marshal(stream));
                Some(value)
            }
            JournalMode::Playback => self.read_block(name, V::unmarshal),
        }
    }

    pub(crate) fn unmarshal_args<A: JournalArgs>(&mut self) -> StreamResult<A> {
        match self.args.as_deref_mut() {
            Some(args) => A::unmarshal(args),
            None => A::unmarshal(self.stream),
        }
    }
}

/// Record/playback journal for the entry points of a dispatch target `T`.
pub struct Journal<T> {
    registry: JournalRegistry<T>,
    mode: JournalMode,
    file: Option<File>,
    /// Unflushed tail. Its first bit sits at byte `write_position` of the file.
    write_stream: BitStream,
    write_position: usize,
    read_stream: BitStream,
    declared_bits: usize,
    blocks: BlockLog,
    entry_count: u64,
    last_entry: Option<String>,
}

impl<T> Journal<T> {
    /// Creates an inactive journal over `registry`.
    #[must_use]
    pub fn new(registry: JournalRegistry<T>) -> Self {
        Self {
            registry,
            mode: JournalMode::Inactive,
            file: None,
            write_stream: BitStream::new(),
            write_position: 0,
            read_stream: BitStream::new(),
            declared_bits: 0,
            blocks: BlockLog::default(),
            entry_count: 0,
            last_entry: None,
        }
    }

    /// Creates a journal in the mode `config` asks for.
    ///
    /// # Errors
    ///
    /// Whatever [`Journal::record`] or [`Journal::load`] report.
    pub fn from_config(registry: JournalRegistry<T>, config: &JournalConfig) -> JournalResult<Self> {
        let mut journal = Self::new(registry);
        match config.mode {
            JournalMode::Inactive => {}
            JournalMode::Record => journal.record(&config.path)?,
            JournalMode::Playback => journal.load(&config.path)?,
        }
        Ok(journal)
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> JournalMode {
        self.mode
    }

    /// The registry entries dispatch through.
    #[must_use]
    pub const fn registry(&self) -> &JournalRegistry<T> {
        &self.registry
    }

    /// Entries recorded, dispatched or played back so far.
    #[must_use]
    pub const fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Name of the most recent entry.
    #[must_use]
    pub fn last_entry_name(&self) -> Option<&str> {
        self.last_entry.as_deref()
    }

    /// Every journaled block seen so far, in order.
    #[must_use]
    pub fn block_spans(&self) -> &[BlockSpan] {
        &self.blocks.spans
    }

    /// Name behind an interned block id.
    #[must_use]
    pub fn block_name(&self, id: u32) -> Option<&str> {
        self.blocks.names.get(id as usize).map(String::as_str)
    }

    /// Bit count declared by a loaded journal's header.
    #[must_use]
    pub const fn declared_bits(&self) -> usize {
        self.declared_bits
    }

    /// Bits written so far while recording, header included.
    #[must_use]
    pub const fn recorded_bits(&self) -> usize {
        self.write_position * 8 + self.write_stream.bit_position()
    }

    /// Starts recording into a new file at `path`.
    ///
    /// # Errors
    ///
    /// [`JournalError::ModeAlreadySelected`] if the journal is active, or the
    /// I/O error from creating the file.
    pub fn record(&mut self, path: impl AsRef<Path>) -> JournalResult<()> {
        self.ensure_inactive()?;
        let path = path.as_ref();
        let mut file = File::create(path)?;
        #[allow(clippy::cast_possible_truncation)]
        file.write_all(&(HEADER_BITS as u32).to_le_bytes())?;
        file.flush()?;

        self.file = Some(file);
        self.write_position = HEADER_BITS / 8;
        self.write_stream.clear();
        self.mode = JournalMode::Record;
        info!(path = %path.display(), "journal recording");
        Ok(())
    }

    /// Loads the journal at `path` for playback.
    ///
    /// # Errors
    ///
    /// [`JournalError::ModeAlreadySelected`] if the journal is active, the
    /// I/O error from reading the file, or [`JournalError::SizeMismatch`]
    /// when the header does not match the file.
    pub fn load(&mut self, path: impl AsRef<Path>) -> JournalResult<()> {
        self.ensure_inactive()?;
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        self.load_bytes(bytes)?;
        info!(path = %path.display(), bits = self.declared_bits, "journal loaded");
        Ok(())
    }

    /// Loads journal contents already in memory.
    ///
    /// # Errors
    ///
    /// As [`Journal::load`], without the I/O.
    pub fn load_bytes(&mut self, bytes: Vec<u8>) -> JournalResult<()> {
        self.ensure_inactive()?;
        let file_bytes = bytes.len();
        let mut stream = BitStream::from_bytes(bytes);
        let declared = stream.read_u32().map(|bits| bits as usize).unwrap_or(0);
        if declared < HEADER_BITS || (declared + 7) / 8 != file_bytes {
            return Err(JournalError::SizeMismatch { declared, file_bytes });
        }
        stream.set_max_read_bit_position(declared);

        self.read_stream = stream;
        self.declared_bits = declared;
        self.mode = JournalMode::Playback;
        Ok(())
    }

    /// True while playback has entries left.
    #[must_use]
    pub const fn has_pending_entries(&self) -> bool {
        matches!(self.mode, JournalMode::Playback) && self.read_stream.remaining_bits() > 0
    }

    /// Calls the entry point `name` with `args`.
    ///
    /// Recording writes the call and flushes before returning. In playback
    /// the call is ignored: the journal is the only source of entries. The
    /// handler always receives arguments read back from their marshalled
    /// form, so recording and playback see identical values. Handlers get an
    /// [`EntryContext`], never the journal, so entries cannot nest.
    ///
    /// # Errors
    ///
    /// [`JournalError::UnknownEntry`] for unregistered names, or the I/O
    /// error from flushing.
    pub fn call_entry<A: JournalArgs>(&mut self, target: &mut T, name: &str, args: &A) -> JournalResult<()> {
        if self.mode == JournalMode::Playback {
            trace!(name, "direct entry call ignored during playback");
            return Ok(());
        }
        if !self.registry.contains(name) {
            return Err(JournalError::UnknownEntry(name.to_owned()));
        }
        let mut call = BitStream::new();
        args.marshal(&mut call);
        if self.mode == JournalMode::Record {
            self.write_stream.write_string(name);
            self.write_stream.write_stream(&call);
        }
        call.set_bit_position(0);

        let mut ctx = EntryContext {
            mode: self.mode,
            stream: &mut self.write_stream,
            base_bits: self.write_position * 8,
            args: Some(&mut call),
            blocks: &mut self.blocks,
            failure: None,
        };
        let result = self.registry.dispatch(name, target, &mut ctx);

        match result {
            Some(Ok(())) => {}
            Some(Err(err)) => return Err(err.into()),
            None => return Err(JournalError::UnknownEntry(name.to_owned())),
        }
        if self.mode == JournalMode::Record {
            self.sync_write_stream()?;
        }
        self.finish_entry(name);
        Ok(())
    }

    /// Reads the next recorded entry and dispatches it.
    ///
    /// Returns `Ok(None)` outside playback or once every entry has run.
    ///
    /// # Errors
    ///
    /// [`JournalError::Truncated`] when an entry runs past the declared end,
    /// [`JournalError::UnknownEntry`] for names nothing registered.
    pub fn process_next_entry(&mut self, target: &mut T) -> JournalResult<Option<EntryInfo>> {
        if !self.has_pending_entries() {
            return Ok(None);
        }
        let start_bit = self.read_stream.bit_position();
        let declared = self.declared_bits;
        let name = self
            .read_stream
            .read_string()
            .map_err(|err| structural(err, start_bit, declared))?;
        if !self.registry.contains(&name) {
            return Err(JournalError::UnknownEntry(name));
        }

        let mut ctx = EntryContext {
            mode: JournalMode::Playback,
            stream: &mut self.read_stream,
            base_bits: 0,
            args: None,
            blocks: &mut self.blocks,
            failure: None,
        };
        let result = self.registry.dispatch(&name, target, &mut ctx);
        let failure = ctx.failure.take();

        match result {
            Some(Ok(())) => {}
            Some(Err(err)) => return Err(structural(err, start_bit, declared)),
            None => return Err(JournalError::UnknownEntry(name)),
        }
        if let Some(err) = failure {
            return Err(structural(err, start_bit, declared));
        }

        let end_bit = self.read_stream.bit_position();
        trace!(name = %name, start_bit, end_bit, "journal entry replayed");
        self.finish_entry(&name);
        Ok(Some(EntryInfo { name, start_bit, end_bit }))
    }

    fn finish_entry(&mut self, name: &str) {
        self.entry_count += 1;
        if self.last_entry.as_deref() != Some(name) {
            self.last_entry = Some(name.to_owned());
        }
    }

    fn ensure_inactive(&self) -> JournalResult<()> {
        if self.mode == JournalMode::Inactive {
            Ok(())
        } else {
            Err(JournalError::ModeAlreadySelected(self.mode))
        }
    }

    /// Flushes the whole bytes of the write stream and rewrites the header.
    /// A trailing partial byte stays buffered and is rewritten next time.
    fn sync_write_stream(&mut self) -> JournalResult<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let bits = self.write_stream.bit_position();
        if bits == 0 {
            return Ok(());
        }
        let total = self.write_position * 8 + bits;

        file.seek(SeekFrom::Start(0))?;
        #[allow(clippy::cast_possible_truncation)]
        file.write_all(&(total as u32).to_le_bytes())?;
        file.seek(SeekFrom::Start(self.write_position as u64))?;
        let bytes = self.write_stream.as_bytes();
        file.write_all(bytes)?;
        file.flush()?;

        let written = bytes.len();
        let tail = total % 8;
        let last = bytes.last().copied().unwrap_or(0);
        self.write_stream.clear();
        if tail == 0 {
            self.write_position += written;
        } else {
            #[allow(clippy::cast_possible_truncation)]
            self.write_stream.write_bits(u32::from(last), tail as u32);
            self.write_position += written - 1;
        }
        debug!(total, "journal synced");
        Ok(())
    }
}

impl<T> std::fmt::Debug for Journal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("mode", &self.mode)
            .field("registry", &self.registry)
            .field("entry_count", &self.entry_count)
            .finish_non_exhaustive()
    }
}

/// Running out of declared bits mid-entry is corruption, not end of data.
fn structural(err: StreamError, position: usize, declared: usize) -> JournalError {
    match err {
        StreamError::UnexpectedEnd { .. } => JournalError::Truncated { position, declared },
        other => JournalError::Stream(other),
    }
}
