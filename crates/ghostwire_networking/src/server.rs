//! # Server Session
//!
//! Owns the authoritative [`World`] and one [`ServerConnection`] per client.
//!
//! ```text
//! idle(dt) ─► credit every connection ─► world.idle_all(ServerIdleMainLoop)
//!
//! write_packet(conn)
//!   ├─ hand dirty masks to every ghost table
//!   ├─ rescope around the control object
//!   ├─ control section (ghost, reference, relative flag, correction)
//!   └─ ghost records by priority until the packet is full
//!
//! receive_packet(conn, bytes)
//!   ├─ header: settle notifies (re-arm lost masks, confirm ghosts)
//!   └─ client moves: apply under time credit
//! ```

use std::collections::{BTreeMap, BTreeSet};

use ghostwire_core::{
    GameObject, IdleCallPath, ObjectId, ObjectKind, Point, Rect, SpatialQuery, TypeMask, UpdateMask, World,
};
use ghostwire_shared::BitStream;
use tracing::{debug, info, trace};

use crate::compression::{COMPRESS_WINDOW_X, COMPRESS_WINDOW_Y};
use crate::config::SessionConfig;
use crate::control::ControlConnection;
use crate::error::{NetError, NetResult};
use crate::ghost::{GhostSend, GhostSlot, GhostTable, GHOST_INDEX_BITS};
use crate::packet::{PacketHeader, PacketWindow, MAX_PACKET_SIZE};
use crate::replication::{ConnectionView, Replicated, GHOST_CLASS_BITS};

/// Identifies a client connection on the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u32);

/// What a server packet carried, settled when its fate is known.
#[derive(Clone, Debug, Default)]
struct ServerNotify {
    ghosts: Vec<GhostSend>,
    reference: Option<Point>,
}

/// Server end of one client connection.
#[derive(Clone, Debug)]
pub struct ServerConnection {
    window: PacketWindow<ServerNotify>,
    ghosts: GhostTable,
    control: ControlConnection,
}

impl ServerConnection {
    fn new(config: &SessionConfig, control_object: Option<ObjectId>) -> Self {
        let mut control = ControlConnection::new(config.max_time_credit_ms);
        control.set_control_object(control_object);
        Self {
            window: PacketWindow::new(),
            ghosts: GhostTable::new(),
            control,
        }
    }

    /// Ghosts of this connection.
    #[must_use]
    pub const fn ghosts(&self) -> &GhostTable {
        &self.ghosts
    }

    /// Predictor state of this connection.
    #[must_use]
    pub const fn control(&self) -> &ControlConnection {
        &self.control
    }

    fn update_scope(&mut self, world: &World) {
        let mut scoped = BTreeSet::new();
        for obj in world.iter() {
            if obj.type_mask().intersects(TypeMask::BARRIER | TypeMask::GOAL_ZONE) {
                scoped.insert(obj.id);
            }
        }
        if let Some((id, pos)) = self.control_position(world) {
            scoped.insert(id);
            let window = Rect::around(pos, Point::new(COMPRESS_WINDOW_X as f32, COMPRESS_WINDOW_Y as f32));
            scoped.extend(world.find_objects(TypeMask::ALL, &window));
        }

        for id in &scoped {
            if self.ghosts.index_of(*id).is_none() {
                self.ghosts.allocate(*id);
            }
        }
        let out_of_scope: Vec<ObjectId> = self
            .ghosts
            .iter()
            .filter(|(_, slot)| !slot.deleting && !scoped.contains(&slot.object))
            .map(|(_, slot)| slot.object)
            .collect();
        for id in out_of_scope {
            trace!(?id, "ghost left scope");
            self.ghosts.mark_for_delete(id);
        }
    }

    fn control_position(&self, world: &World) -> Option<(ObjectId, Point)> {
        let id = self.control.control_object()?;
        let pos = world.get(id)?.as_ship()?.mover.actual().pos;
        Some((id, pos))
    }

    fn write_ghosts(
        &mut self,
        world: &World,
        stream: &mut BitStream,
        budget_bits: usize,
        config: &SessionConfig,
    ) -> Vec<GhostSend> {
        let control_pos = self.control_position(world).map(|(_, pos)| pos);
        let mut candidates: Vec<(f32, u32)> = Vec::new();
        let mut vanished = Vec::new();
        for (index, slot) in self.ghosts.iter().filter(|(_, s)| s.wants_update()) {
            match world.get(slot.object) {
                Some(obj) => candidates.push((ghost_priority(obj, slot, control_pos, config), index)),
                None if !slot.deleting => vanished.push(slot.object),
                None => candidates.push((f32::MAX, index)),
            }
        }
        for id in vanished {
            self.ghosts.mark_for_delete(id);
        }
        // stable: equal priorities keep index order
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let reference = self.control.compression_reference();
        let mut sends = Vec::new();
        let mut full = false;
        for (_, index) in candidates {
            if full {
                if let Some(slot) = self.ghosts.slot_mut(index) {
                    slot.update_skips = (slot.update_skips + 1).min(config.max_update_skips);
                }
                continue;
            }
            let Some(slot) = self.ghosts.slot(index) else {
                continue;
            };
            let mut record = BitStream::new();
            record.write_flag(true);
            record.write_int(index, GHOST_INDEX_BITS);

            let (send, residual) = if record.write_flag(slot.deleting) {
                let send = GhostSend {
                    index,
                    mask: UpdateMask::NONE,
                    initial: false,
                    delete: true,
                };
                (send, UpdateMask::NONE)
            } else {
                let Some(obj) = world.get(slot.object) else {
                    continue;
                };
                let mask = slot.mask;
                let initial = record.write_flag(mask.contains(UpdateMask::INITIAL));
                if initial {
                    record.write_int(obj.kind.class_id(), GHOST_CLASS_BITS);
                }
                let view = ConnectionView {
                    ghosts: &self.ghosts,
                    control: self.control.control_object(),
                    reference,
                    one_way_ms: config.one_way_latency_ms,
                };
                let residual = obj.pack_update(&view, mask, &mut record);
                let send = GhostSend {
                    index,
                    mask: mask.without(residual),
                    initial,
                    delete: false,
                };
                (send, residual)
            };

            // one bit stays free for the section terminator
            if stream.bit_position() + record.bit_len() + 1 > budget_bits {
                full = true;
                if let Some(slot) = self.ghosts.slot_mut(index) {
                    slot.update_skips = (slot.update_skips + 1).min(config.max_update_skips);
                }
                continue;
            }
            stream.write_stream(&record);
            if let Some(slot) = self.ghosts.slot_mut(index) {
                slot.mask = residual;
            }
            self.ghosts.on_sent(&send);
            sends.push(send);
        }
        stream.write_flag(false);
        sends
    }
}

/// Send order: deletes, then objects near the control object, closing in,
/// new, or starved for several packets.
fn ghost_priority(
    obj: &GameObject,
    slot: &GhostSlot,
    control_pos: Option<Point>,
    config: &SessionConfig,
) -> f32 {
    if slot.deleting {
        return f32::MAX;
    }
    let (pos, vel) = object_motion(obj);
    let mut priority = 0.0;
    if let Some(center) = control_pos {
        let dist = center.distance(pos);
        priority += (500.0 - dist) / 500.0;
        if vel.dot(center - pos) > 0.0 {
            priority += 0.7;
        }
    }
    if slot.mask.contains(UpdateMask::INITIAL) {
        priority += 0.5;
    }
    priority + slot.update_skips.min(config.max_update_skips) as f32 * 0.5
}

fn object_motion(obj: &GameObject) -> (Point, Point) {
    match &obj.kind {
        ObjectKind::Ship(ship) => (ship.mover.actual().pos, ship.mover.actual().vel),
        ObjectKind::Item(item) => (item.mover.actual().pos, item.mover.actual().vel),
        ObjectKind::Projectile(p) => (p.pos, p.vel),
        ObjectKind::Barrier(_) | ObjectKind::GoalZone(_) => (obj.extent().center(), Point::ZERO),
    }
}

/// Authoritative simulation plus every client connection.
#[derive(Debug)]
pub struct ServerSession {
    world: World,
    connections: BTreeMap<ConnectionId, ServerConnection>,
    next_connection: u32,
    config: SessionConfig,
}

impl ServerSession {
    /// Creates a session over an empty world.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_world(World::new(), config)
    }

    /// Creates a session over an existing world.
    #[must_use]
    pub fn with_world(world: World, config: SessionConfig) -> Self {
        Self {
            world,
            connections: BTreeMap::new(),
            next_connection: 1,
            config,
        }
    }

    /// The simulated world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the simulated world.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Session settings.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connection `id`.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<&ServerConnection> {
        self.connections.get(&id)
    }

    /// Adds a client that controls `control_object`.
    pub fn connect(&mut self, control_object: Option<ObjectId>) -> ConnectionId {
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        if let Some(ship) = control_object
            .and_then(|c| self.world.get_mut(c))
            .and_then(GameObject::as_ship_mut)
        {
            ship.controlled = true;
        }
        self.connections.insert(id, ServerConnection::new(&self.config, control_object));
        info!(connection = id.0, ?control_object, "client connected");
        id
    }

    /// Drops a client and releases its control object.
    pub fn disconnect(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.remove(&id) else {
            return;
        };
        if let Some(ship) = conn
            .control
            .control_object()
            .and_then(|c| self.world.get_mut(c))
            .and_then(GameObject::as_ship_mut)
        {
            ship.controlled = false;
        }
        info!(connection = id.0, "client disconnected");
    }

    /// Runs one server tick of `delta_ms`.
    pub fn idle(&mut self, delta_ms: u32) {
        for conn in self.connections.values_mut() {
            conn.control.add_to_time_credit(delta_ms);
        }
        self.world.idle_all(delta_ms, IdleCallPath::ServerIdleMainLoop, None);
        self.distribute_dirty();
    }

    fn distribute_dirty(&mut self) {
        let dirty = self.world.take_dirty();
        let removed = self.world.take_removed();
        for conn in self.connections.values_mut() {
            for (id, mask) in &dirty {
                conn.ghosts.mark_dirty(*id, *mask);
            }
            for id in &removed {
                conn.ghosts.mark_for_delete(*id);
            }
        }
    }

    /// Builds the next packet for connection `id`.
    ///
    /// # Errors
    ///
    /// [`NetError::UnknownConnection`] if `id` is not connected.
    pub fn write_packet(&mut self, id: ConnectionId) -> NetResult<Vec<u8>> {
        self.distribute_dirty();
        let conn = self.connections.get_mut(&id).ok_or(NetError::UnknownConnection(id.0))?;
        conn.update_scope(&self.world);

        let mut body = BitStream::new();
        let control_index = conn.control.control_object().and_then(|c| conn.ghosts.ghost_index(c));
        let reference = conn.control.write_server_control(&mut body, &self.world, control_index);
        let budget = MAX_PACKET_SIZE * 8 - PacketHeader::BITS;
        let ghosts = conn.write_ghosts(&self.world, &mut body, budget, &self.config);
        trace!(connection = id.0, ghosts = ghosts.len(), bits = body.bit_len(), "server packet");

        let header = conn.window.prepare_send(ServerNotify { ghosts, reference });
        let mut stream = BitStream::new();
        header.write(&mut stream);
        stream.write_stream(&body);
        Ok(stream.into_bytes())
    }

    /// Processes a packet from connection `id`. Stale packets are ignored.
    ///
    /// # Errors
    ///
    /// [`NetError::UnknownConnection`] for an unknown `id`, or a stream error
    /// for a truncated packet.
    pub fn receive_packet(&mut self, id: ConnectionId, bytes: &[u8]) -> NetResult<()> {
        let conn = self.connections.get_mut(&id).ok_or(NetError::UnknownConnection(id.0))?;
        let mut stream = BitStream::from_bytes(bytes.to_vec());
        let header = PacketHeader::read(&mut stream)?;
        let Some(settled) = conn.window.receive(&header) else {
            return Ok(());
        };
        for (notify, delivered) in settled {
            for send in &notify.ghosts {
                if delivered {
                    conn.ghosts.on_delivered(send);
                } else {
                    conn.ghosts.on_lost(send);
                }
            }
            match notify.reference {
                Some(reference) if delivered => conn.control.reference_delivered(reference),
                _ => {}
            }
            if !delivered {
                debug!(connection = id.0, ghosts = notify.ghosts.len(), "packet lost, masks re-armed");
            }
        }
        conn.control.read_client_moves(&mut stream, &mut self.world)?;
        Ok(())
    }
}
