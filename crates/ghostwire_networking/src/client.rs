//! # Client Session
//!
//! Mirrors the server's world through ghosts and predicts the control
//! object.
//!
//! ```text
//! idle(dt, move)
//!   ├─ clamp dt, quantize the move, queue it
//!   ├─ control object: ClientIdleControlMain (prediction)
//!   └─ everything else: ClientIdleMainRemote (extrapolate + interpolate)
//!
//! receive_packet(bytes)
//!   ├─ header: trim moves the server has seen
//!   ├─ control section: correction, if any, loaded now
//!   ├─ ghost section: create / update / delete local objects
//!   └─ replay queued moves if a correction arrived
//! ```

use ghostwire_core::moves::MAX_MOVE_TIME;
use ghostwire_core::{IdleCallPath, Move, ObjectId, ObjectKind, World};
use ghostwire_shared::BitStream;
use tracing::trace;

use crate::config::SessionConfig;
use crate::control::{control_crc, ControlConnection};
use crate::error::{NetError, NetResult};
use crate::ghost::{GhostTable, GHOST_INDEX_BITS};
use crate::packet::{PacketHeader, PacketWindow};
use crate::replication::{apply_outcome, ConnectionView, Replicated, GHOST_CLASS_BITS};

/// What a client packet carried.
#[derive(Clone, Copy, Debug)]
struct ClientNotify {
    first_unsent_move: u32,
}

/// Client end of the connection plus the ghosted world.
#[derive(Debug)]
pub struct ClientSession {
    world: World,
    window: PacketWindow<ClientNotify>,
    ghosts: GhostTable,
    control: ControlConnection,
    config: SessionConfig,
}

impl ClientSession {
    /// Creates a session with an empty world.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            world: World::new(),
            window: PacketWindow::new(),
            ghosts: GhostTable::new(),
            control: ControlConnection::new(config.max_time_credit_ms),
            config,
        }
    }

    /// The ghosted world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Ghost bindings.
    #[must_use]
    pub const fn ghosts(&self) -> &GhostTable {
        &self.ghosts
    }

    /// Predictor state.
    #[must_use]
    pub const fn control(&self) -> &ControlConnection {
        &self.control
    }

    /// Local object the server told this client it controls.
    #[must_use]
    pub const fn control_object(&self) -> Option<ObjectId> {
        self.control.control_object()
    }

    /// Advances the client by one frame with the user's `input`.
    pub fn idle(&mut self, delta_ms: u32, input: Move) {
        let delta = delta_ms.min(MAX_MOVE_TIME);
        let mut m = input;
        m.time = delta;
        m.prepare();

        let control = self.control.control_object();
        if let Some(id) = control {
            self.control.add_pending_move(m);
            if let Some(obj) = self.world.get_mut(id) {
                obj.current_move = m;
                self.world.integrate(id, IdleCallPath::ClientIdleControlMain);
            }
        }
        self.world.idle_all(delta, IdleCallPath::ClientIdleMainRemote, control);

        // nothing is replicated from here
        self.world.take_dirty();
        self.world.take_removed();
    }

    /// Builds the next packet for the server.
    pub fn write_packet(&mut self) -> Vec<u8> {
        let control = self.control.control_object();
        let crc = control_crc(&self.world, control, control.and_then(|c| self.ghosts.index_of(c)));

        let mut body = BitStream::new();
        let first_unsent_move = self.control.write_client_moves(&mut body, crc);
        let header = self.window.prepare_send(ClientNotify { first_unsent_move });

        let mut stream = BitStream::new();
        header.write(&mut stream);
        stream.write_stream(&body);
        trace!(sequence = header.sequence, crc, moves = self.control.pending_move_count(), "client packet");
        stream.into_bytes()
    }

    /// Processes a server packet. Stale packets are ignored.
    ///
    /// # Errors
    ///
    /// Stream errors for truncated packets, [`NetError::UnknownClass`] or
    /// [`NetError::UnknownGhost`] for records this client cannot place.
    pub fn receive_packet(&mut self, bytes: &[u8]) -> NetResult<()> {
        let mut stream = BitStream::from_bytes(bytes.to_vec());
        let header = PacketHeader::read(&mut stream)?;
        let Some(settled) = self.window.receive(&header) else {
            return Ok(());
        };
        for (notify, delivered) in settled {
            if delivered {
                self.control.moves_delivered(notify.first_unsent_move);
            }
        }

        self.control.read_server_control(&mut stream, &mut self.world, &self.ghosts)?;
        self.read_ghosts(&mut stream)?;
        self.control.replay_moves(&mut self.world);
        Ok(())
    }

    fn read_ghosts(&mut self, stream: &mut BitStream) -> NetResult<()> {
        let reference = self.control.compression_reference();
        let one_way_ms = self.config.one_way_latency_ms;

        while stream.read_flag()? {
            let index = stream.read_int(GHOST_INDEX_BITS)?;
            if stream.read_flag()? {
                if let Some(id) = self.ghosts.unbind(index) {
                    self.world.remove(id);
                    if self.control.control_object() == Some(id) {
                        self.control.set_control_object(None);
                    }
                    trace!(index, ?id, "ghost deleted");
                }
                continue;
            }

            let id = if stream.read_flag()? {
                let class = stream.read_int(GHOST_CLASS_BITS)?;
                let kind = ObjectKind::from_class_id(class).ok_or(NetError::UnknownClass(class))?;
                let id = self.world.add(kind);
                if let Some(stale) = self.ghosts.bind(index, id) {
                    self.world.remove(stale);
                }
                trace!(index, ?id, class, "ghost created");
                id
            } else {
                self.ghosts.resolve(index).ok_or(NetError::UnknownGhost(index))?
            };

            let view = ConnectionView {
                ghosts: &self.ghosts,
                control: self.control.control_object(),
                reference,
                one_way_ms,
            };
            let obj = self.world.get_mut(id).ok_or(NetError::UnknownGhost(index))?;
            let outcome = obj.unpack_update(&view, stream)?;
            apply_outcome(&mut self.world, id, outcome, one_way_ms);
        }
        Ok(())
    }
}
