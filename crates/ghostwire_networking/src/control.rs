//! # Control-Connection Predictor
//!
//! The move/correction loop for the object a client controls.
//!
//! ```text
//! CLIENT (controlled)                         SERVER (controller)
//!   idle: prepare move, queue it,
//!         predict locally
//!   ── [crc][first index][count][moves…] ──►  skip moves already applied,
//!                                             spend time credit, apply
//!   ◄── [control ghost][reference][relative]  compare own crc with the
//!       [mismatch][control state]             client's; send state on mismatch
//!   on mismatch: load state, then after the
//!   ghost section replay every queued move
//! ```
//!
//! The queue is trimmed when the packet that carried a move is known to
//! have arrived, so the replay always starts from the state the server
//! sent.

use std::collections::VecDeque;

use ghostwire_core::{GameObject, IdleCallPath, Move, ObjectId, Point, Ship, World};
use ghostwire_shared::BitStream;
use tracing::{debug, trace, warn};

use crate::error::NetResult;
use crate::ghost::{GhostTable, GHOST_INDEX_BITS, MAX_GHOSTS};

/// Most unacknowledged moves a client keeps.
pub const MAX_PENDING_MOVES: usize = 63;

/// Distance the control object may drift from the compression reference
/// before a new reference is chosen.
pub const REFERENCE_DRIFT: f32 = 64.0;

/// Index written into the control CRC when the object has no ghost.
#[allow(clippy::cast_possible_truncation)]
const NO_GHOST: u32 = (MAX_GHOSTS - 1) as u32;

/// CRC of the control state of `object` as seen through `ghost_index`.
///
/// Zero when there is no control object.
#[must_use]
pub fn control_crc(world: &World, object: Option<ObjectId>, ghost_index: Option<u32>) -> u32 {
    let Some(ship) = object.and_then(|id| world.get(id)).and_then(GameObject::as_ship) else {
        return 0;
    };
    let mut stream = BitStream::new();
    stream.write_int(ghost_index.unwrap_or(NO_GHOST), GHOST_INDEX_BITS);
    ship.write_control_state(&mut stream);
    stream.zero_to_byte_boundary();
    stream.calculate_crc(0, stream.byte_position())
}

/// Reference for compressed points, tracked by the server until the client
/// acknowledges it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompressionReference {
    /// Current reference.
    pub point: Option<Point>,
    /// A packet carrying `point` has been delivered.
    pub acknowledged: bool,
}

impl CompressionReference {
    /// Moves the reference if `pos` drifted too far. Returns the reference to
    /// include in the next packet, if the client may not have it yet.
    pub fn update(&mut self, pos: Point) -> Option<Point> {
        let stale = self.point.map_or(true, |p| p.distance(pos) > REFERENCE_DRIFT);
        if stale {
            self.point = Some(pos);
            self.acknowledged = false;
        }
        if self.acknowledged {
            None
        } else {
            self.point
        }
    }

    /// A packet carrying `sent` was delivered.
    pub fn delivered(&mut self, sent: Point) {
        if self.point == Some(sent) {
            self.acknowledged = true;
        }
    }
}

/// Predictor state of one connection, for whichever end it lives on.
#[derive(Clone, Debug)]
pub struct ControlConnection {
    pending_moves: VecDeque<Move>,
    first_move_index: u32,
    move_time_credit: u32,
    max_time_credit: u32,
    control_object: Option<ObjectId>,
    last_client_control_crc: u32,
    reference: CompressionReference,
    relative: bool,
    replay_pending: bool,
    correction_count: u32,
}

impl ControlConnection {
    /// Creates a connection whose move time credit is capped at `max_time_credit` ms.
    #[must_use]
    pub fn new(max_time_credit: u32) -> Self {
        Self {
            pending_moves: VecDeque::with_capacity(MAX_PENDING_MOVES),
            first_move_index: 1,
            move_time_credit: 0,
            max_time_credit,
            control_object: None,
            last_client_control_crc: 0,
            reference: CompressionReference::default(),
            relative: false,
            replay_pending: false,
            correction_count: 0,
        }
    }

    /// Object driven by this connection's moves.
    #[must_use]
    pub const fn control_object(&self) -> Option<ObjectId> {
        self.control_object
    }

    /// Sets the object driven by this connection's moves.
    pub fn set_control_object(&mut self, object: Option<ObjectId>) {
        self.control_object = object;
    }

    /// Index of the oldest queued move (client) or of the next move to
    /// apply (server).
    #[must_use]
    pub const fn first_move_index(&self) -> u32 {
        self.first_move_index
    }

    /// Queued moves, oldest first.
    pub fn pending_moves(&self) -> impl Iterator<Item = &Move> {
        self.pending_moves.iter()
    }

    /// Number of queued moves.
    #[must_use]
    pub fn pending_move_count(&self) -> usize {
        self.pending_moves.len()
    }

    /// Remaining move time credit in ms.
    #[must_use]
    pub const fn move_time_credit(&self) -> u32 {
        self.move_time_credit
    }

    /// Reference for compressed points in the packet being read or written.
    #[must_use]
    pub fn compression_reference(&self) -> Option<Point> {
        if self.relative {
            self.reference.point
        } else {
            None
        }
    }

    /// True when a correction arrived and the queue still has to be replayed.
    #[must_use]
    pub const fn replay_pending(&self) -> bool {
        self.replay_pending
    }

    /// Corrections received from the server so far.
    #[must_use]
    pub const fn correction_count(&self) -> u32 {
        self.correction_count
    }

    // =========================================================================
    // Client (controlled) side
    // =========================================================================

    /// Queues a prepared move. Past [`MAX_PENDING_MOVES`] the move is dropped
    /// and false is returned.
    pub fn add_pending_move(&mut self, m: Move) -> bool {
        if self.pending_moves.len() >= MAX_PENDING_MOVES {
            warn!(first = self.first_move_index, "pending move queue full, dropping move");
            return false;
        }
        self.pending_moves.push_back(m);
        true
    }

    /// Writes the client's half of the control section: its predicted CRC
    /// and every unacknowledged move.
    ///
    /// Returns the index one past the last move written, for the packet's notify.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_client_moves(&self, stream: &mut BitStream, crc: u32) -> u32 {
        stream.write_u32(crc);
        stream.write_u32(self.first_move_index);
        stream.write_ranged_u32(self.pending_moves.len() as u32, 0, MAX_PENDING_MOVES as u32);
        let mut prev: Option<&Move> = None;
        for m in &self.pending_moves {
            m.pack(stream, prev, true);
            prev = Some(m);
        }
        self.first_move_index + self.pending_moves.len() as u32
    }

    /// The packet that carried moves up to `first_unsent` arrived: drop them.
    pub fn moves_delivered(&mut self, first_unsent: u32) {
        while self.first_move_index < first_unsent && self.pending_moves.pop_front().is_some() {
            self.first_move_index += 1;
        }
    }

    /// Reads the server's half of the control section.
    ///
    /// On a CRC mismatch the control state is loaded into the control object
    /// and a replay is scheduled. A control ghost this client cannot resolve
    /// has its state read and discarded.
    ///
    /// # Errors
    ///
    /// Propagates stream underruns.
    pub fn read_server_control(
        &mut self,
        stream: &mut BitStream,
        world: &mut World,
        ghosts: &GhostTable,
    ) -> NetResult<()> {
        let control_index = if stream.read_flag()? {
            Some(stream.read_int(GHOST_INDEX_BITS)?)
        } else {
            None
        };
        if stream.read_flag()? {
            self.reference.point = Some(Point::new(stream.read_f32()?, stream.read_f32()?));
        }
        self.relative = stream.read_flag()?;

        let control = control_index.and_then(|index| ghosts.resolve(index));
        self.control_object = control;

        if stream.read_flag()? {
            let Some(index) = control_index else {
                trace!("server reports mismatch before control ghost exists");
                return Ok(());
            };
            match control.and_then(|id| world.get_mut(id)).and_then(GameObject::as_ship_mut) {
                Some(ship) => {
                    ship.read_control_state(stream)?;
                    self.replay_pending = true;
                    self.correction_count += 1;
                    debug!(index, pending = self.pending_moves.len(), "control state corrected");
                }
                None => {
                    let mut scratch = Ship::new(Point::ZERO);
                    scratch.read_control_state(stream)?;
                    debug!(index, "correction for unresolved control ghost ignored");
                }
            }
        }
        Ok(())
    }

    /// Re-runs every queued move on the corrected control object.
    pub fn replay_moves(&mut self, world: &mut World) {
        if !std::mem::take(&mut self.replay_pending) {
            return;
        }
        let Some(id) = self.control_object else {
            return;
        };
        for m in &self.pending_moves {
            let Some(obj) = world.get_mut(id) else {
                return;
            };
            obj.current_move = *m;
            world.integrate(id, IdleCallPath::ClientIdleControlReplay);
        }
        if let Some(ship) = world.get_mut(id).and_then(GameObject::as_ship_mut) {
            ship.control_move_replay_complete();
        }
        trace!(moves = self.pending_moves.len(), "replay complete");
    }

    // =========================================================================
    // Server (controller) side
    // =========================================================================

    /// Credits `ms` of simulated time, up to the configured cap.
    pub fn add_to_time_credit(&mut self, ms: u32) {
        self.move_time_credit = self.move_time_credit.saturating_add(ms).min(self.max_time_credit);
    }

    /// Applies one client move if enough time credit is banked.
    ///
    /// A refused move is dropped for good and leaves the credit untouched.
    pub fn apply_client_move(&mut self, world: &mut World, m: Move) -> bool {
        let Some(id) = self.control_object else {
            return false;
        };
        if self.move_time_credit < m.time {
            debug!(?id, time = m.time, credit = self.move_time_credit, "move refused: no time credit");
            return false;
        }
        let Some(obj) = world.get_mut(id) else {
            return false;
        };
        self.move_time_credit -= m.time;
        obj.current_move = m;
        world.integrate(id, IdleCallPath::ServerIdleControlFromClient);
        true
    }

    /// Reads the client's half of the control section and applies new moves
    /// in index order.
    ///
    /// # Errors
    ///
    /// Propagates stream underruns.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_client_moves(&mut self, stream: &mut BitStream, world: &mut World) -> NetResult<()> {
        self.last_client_control_crc = stream.read_u32()?;
        let mut index = stream.read_u32()?;
        let count = stream.read_ranged_u32(0, MAX_PENDING_MOVES as u32)?;

        if index > self.first_move_index {
            debug!(expected = self.first_move_index, got = index, "client skipped ahead");
            self.first_move_index = index;
        }

        let mut prev = Move::new();
        for _ in 0..count {
            let m = Move::unpack(stream, &prev, true)?;
            prev = m;
            if index >= self.first_move_index {
                self.apply_client_move(world, m);
                self.first_move_index = index + 1;
            }
            index += 1;
        }
        Ok(())
    }

    /// Writes the server's half of the control section.
    ///
    /// `ghost_index` is the control object's index if the client already has
    /// it. Returns the reference included in this packet, for its notify.
    pub fn write_server_control(
        &mut self,
        stream: &mut BitStream,
        world: &World,
        ghost_index: Option<u32>,
    ) -> Option<Point> {
        let control_pos = self
            .control_object
            .and_then(|id| world.get(id))
            .and_then(GameObject::as_ship)
            .map(|ship| ship.mover.actual().pos);

        if stream.write_flag(ghost_index.is_some()) {
            stream.write_int(ghost_index.unwrap_or(0), GHOST_INDEX_BITS);
        }

        let included = control_pos.and_then(|pos| self.reference.update(pos));
        if let Some(point) = included {
            stream.write_flag(true);
            stream.write_f32(point.x);
            stream.write_f32(point.y);
        } else {
            stream.write_flag(false);
        }

        // Points are relative only once the client has the control ghost and
        // will hold the reference after reading this packet.
        self.relative = stream.write_flag(ghost_index.is_some() && self.reference.point.is_some());

        let crc = control_crc(world, self.control_object, ghost_index);
        if stream.write_flag(crc != self.last_client_control_crc) && ghost_index.is_some() {
            if let Some(ship) = self.control_object.and_then(|id| world.get(id)).and_then(GameObject::as_ship) {
                ship.write_control_state(stream);
            }
            trace!(crc, client = self.last_client_control_crc, "sending control correction");
        }
        included
    }

    /// A packet that included `reference` was delivered.
    pub fn reference_delivered(&mut self, reference: Point) {
        self.reference.delivered(reference);
    }
}
