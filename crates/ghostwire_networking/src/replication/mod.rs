//! # Replicated-Object Codec
//!
//! Masked delta updates for every object kind.
//!
//! ```text
//! pack_update(ctx, mask) ──► [presence flag][payload] per aspect ──► residual mask
//!
//!  aspect dirty and resolvable   → flag 1 + payload
//!  aspect clean                  → flag 0
//!  aspect refers to a ghost the  → flag 1, "resolved" flag 0,
//!  remote end does not have yet     bit returned in the residual
//! ```
//!
//! The receiver's half, [`Replicated::unpack_update`], only touches the
//! object itself. Effects on other objects (mounting, extrapolation
//! against the world) come back as an [`UnpackOutcome`] for
//! [`apply_outcome`] to carry out.

mod item;
mod projectile;
mod ship;
mod static_geometry;

use ghostwire_core::{GameObject, Movable, ObjectId, ObjectKind, Point, StateIndex, UpdateMask, World};
use ghostwire_shared::BitStream;

use crate::error::NetResult;
use crate::ghost::{GhostTable, GHOST_INDEX_BITS};

pub use static_geometry::MAX_POLYGON_POINTS;

/// Ghost bits of a class id on the wire.
pub const GHOST_CLASS_BITS: u32 = 3;

/// What the codec may ask of the connection it is writing to or reading from.
pub trait GhostContext {
    /// Index of `object` if the remote end already has its ghost.
    fn ghost_index(&self, object: ObjectId) -> Option<u32>;

    /// Local object bound to a received ghost index.
    fn resolve_ghost(&self, index: u32) -> Option<ObjectId>;

    /// True if this connection's client controls `object`.
    fn is_controlling(&self, object: ObjectId) -> bool;

    /// Agreed reference for compressed points in the current packet.
    fn compression_reference(&self) -> Option<Point>;

    /// One-way trip estimate used to extrapolate received positions.
    fn one_way_time_ms(&self) -> u32;
}

/// [`GhostContext`] over one connection's ghost table.
#[derive(Clone, Copy)]
pub struct ConnectionView<'a> {
    /// Ghost table of the connection.
    pub ghosts: &'a GhostTable,
    /// Object the connection's client controls.
    pub control: Option<ObjectId>,
    /// Agreed compression reference for this packet.
    pub reference: Option<Point>,
    /// One-way trip estimate in ms.
    pub one_way_ms: u32,
}

impl GhostContext for ConnectionView<'_> {
    fn ghost_index(&self, object: ObjectId) -> Option<u32> {
        self.ghosts.ghost_index(object)
    }

    fn resolve_ghost(&self, index: u32) -> Option<ObjectId> {
        self.ghosts.resolve(index)
    }

    fn is_controlling(&self, object: ObjectId) -> bool {
        self.control == Some(object)
    }

    fn compression_reference(&self) -> Option<Point> {
        self.reference
    }

    fn one_way_time_ms(&self) -> u32 {
        self.one_way_ms
    }
}

/// How the receiver should bring the render state to a new position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionUpdate {
    /// Jump straight to the received state.
    Snap,
    /// Extrapolate by the one-way time and glide the render state there.
    Interpolate,
}

/// Side effects of an unpacked update that reach beyond the object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnpackOutcome {
    /// Update carried the initial baseline.
    pub initial: bool,
    /// New mount: `Some(None)` detaches.
    pub mount: Option<Option<ObjectId>>,
    /// New goal zone: `Some(None)` leaves all zones.
    pub zone: Option<Option<ObjectId>>,
    /// Position changed.
    pub position: Option<PositionUpdate>,
}

/// Masked serialization of one object for one connection.
pub trait Replicated {
    /// Writes every aspect in `mask`, returning the aspects that could not be
    /// written yet and must be retried.
    fn pack_update(&self, ctx: &dyn GhostContext, mask: UpdateMask, stream: &mut BitStream) -> UpdateMask;

    /// Reads an update written by [`Replicated::pack_update`].
    ///
    /// # Errors
    ///
    /// Propagates stream underruns.
    fn unpack_update(&mut self, ctx: &dyn GhostContext, stream: &mut BitStream) -> NetResult<UnpackOutcome>;
}

impl Replicated for GameObject {
    fn pack_update(&self, ctx: &dyn GhostContext, mask: UpdateMask, stream: &mut BitStream) -> UpdateMask {
        match &self.kind {
            ObjectKind::Ship(ship) => ship::pack(self.id, ship, &self.current_move, ctx, mask, stream),
            ObjectKind::Item(item) => item::pack(item, ctx, mask, stream),
            ObjectKind::Projectile(projectile) => projectile::pack(projectile, ctx, mask, stream),
            ObjectKind::Barrier(barrier) => static_geometry::pack(&barrier.points, mask, stream),
            ObjectKind::GoalZone(zone) => static_geometry::pack(&zone.points, mask, stream),
        }
    }

    fn unpack_update(&mut self, ctx: &dyn GhostContext, stream: &mut BitStream) -> NetResult<UnpackOutcome> {
        match &mut self.kind {
            ObjectKind::Ship(ship) => ship::unpack(ship, &mut self.current_move, ctx, stream),
            ObjectKind::Item(item) => item::unpack(item, ctx, stream),
            ObjectKind::Projectile(projectile) => projectile::unpack(projectile, ctx, stream),
            ObjectKind::Barrier(barrier) => static_geometry::unpack(&mut barrier.points, stream),
            ObjectKind::GoalZone(zone) => static_geometry::unpack(&mut zone.points, stream),
        }
    }
}

/// Writes a reference to `target`, or the "unresolved" flag.
///
/// Returns false when the reference could not be written.
pub(crate) fn write_ghost_ref(stream: &mut BitStream, ctx: &dyn GhostContext, target: Option<ObjectId>) -> bool {
    match target.and_then(|t| ctx.ghost_index(t)) {
        Some(index) => {
            stream.write_flag(true);
            stream.write_int(index, GHOST_INDEX_BITS);
            true
        }
        None => {
            stream.write_flag(false);
            false
        }
    }
}

/// Reads a reference written by [`write_ghost_ref`]. The outer `None` means
/// nothing usable was sent.
pub(crate) fn read_ghost_ref(stream: &mut BitStream, ctx: &dyn GhostContext) -> NetResult<Option<ObjectId>> {
    if !stream.read_flag()? {
        return Ok(None);
    }
    let index = stream.read_int(GHOST_INDEX_BITS)?;
    Ok(ctx.resolve_ghost(index))
}

/// Carries out the world-level effects of an unpacked update on `id`.
pub fn apply_outcome(world: &mut World, id: ObjectId, outcome: UnpackOutcome, one_way_ms: u32) {
    if let Some(mount) = outcome.mount {
        world.mount_item(id, mount);
    }
    if let Some(zone) = outcome.zone {
        if let Some(item) = world.get_mut(id).and_then(GameObject::as_item_mut) {
            item.zone = zone;
        }
    }

    match outcome.position {
        Some(PositionUpdate::Snap) => snap(world, id),
        Some(PositionUpdate::Interpolate) => {
            if let Some(mover) = world.get_mut(id).and_then(Movable::mover_mut) {
                mover.interpolating = true;
            }
            world.advance(id, one_way_ms as f32 * 0.001, StateIndex::Actual, false);
        }
        None if outcome.initial => snap(world, id),
        None => {}
    }
}

fn snap(world: &mut World, id: ObjectId) {
    if let Some(mover) = world.get_mut(id).and_then(Movable::mover_mut) {
        mover.snap_render_to_actual();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Context with a fixed set of resolvable ghosts.
    #[derive(Default)]
    pub(crate) struct FixedContext {
        pub ghosts: Vec<(ObjectId, u32)>,
        pub controlling: Option<ObjectId>,
        pub reference: Option<Point>,
    }

    impl FixedContext {
        pub(crate) fn with_ghost(object: ObjectId, index: u32) -> Self {
            Self {
                ghosts: vec![(object, index)],
                ..Self::default()
            }
        }
    }

    impl GhostContext for FixedContext {
        fn ghost_index(&self, object: ObjectId) -> Option<u32> {
            self.ghosts.iter().find(|(o, _)| *o == object).map(|(_, i)| *i)
        }

        fn resolve_ghost(&self, index: u32) -> Option<ObjectId> {
            self.ghosts.iter().find(|(_, i)| *i == index).map(|(o, _)| *o)
        }

        fn is_controlling(&self, object: ObjectId) -> bool {
            self.controlling == Some(object)
        }

        fn compression_reference(&self) -> Option<Point> {
            self.reference
        }

        fn one_way_time_ms(&self) -> u32 {
            0
        }
    }

    fn round_trip(obj: &GameObject, ctx: &FixedContext, mask: UpdateMask) -> (GameObject, UnpackOutcome, UpdateMask) {
        let mut stream = BitStream::new();
        let residual = obj.pack_update(ctx, mask, &mut stream);
        stream.set_bit_position(0);
        let mut received = GameObject::new(obj.id, ObjectKind::from_class_id(obj.kind.class_id()).unwrap());
        let outcome = received.unpack_update(ctx, &mut stream).unwrap();
        assert_eq!(stream.remaining_bits(), 0);
        (received, outcome, residual)
    }

    #[test]
    fn test_ship_initial_carries_everything() {
        let mut ship = ghostwire_core::Ship::new(Point::new(100.0, 50.0));
        ship.health = 0.5;
        ship.mover.state_mut(StateIndex::Actual).vel = Point::new(0.0, 200.0);
        let obj = GameObject::new(ObjectId(1), ObjectKind::Ship(ship));

        let (received, outcome, residual) = round_trip(&obj, &FixedContext::default(), UpdateMask::ALL);
        assert!(residual.is_empty());
        assert!(outcome.initial);
        assert_eq!(outcome.position, Some(PositionUpdate::Snap));
        let ship = received.as_ship().unwrap();
        assert_eq!(ship.mover.actual().pos, Point::new(100.0, 50.0));
        assert!((ship.mover.actual().vel.y - 200.0).abs() < 1e-3);
        assert!((ship.health - 0.5).abs() < 1.0 / 63.0);
    }

    #[test]
    fn test_controlling_connection_skips_ship_position() {
        let obj = GameObject::new(ObjectId(1), ObjectKind::Ship(ghostwire_core::Ship::new(Point::new(5.0, 5.0))));
        let ctx = FixedContext {
            controlling: Some(ObjectId(1)),
            ..FixedContext::default()
        };

        let (received, outcome, _) = round_trip(&obj, &ctx, UpdateMask::POSITION | UpdateMask::MOVE);
        assert_eq!(outcome.position, None);
        assert_eq!(received.as_ship().unwrap().mover.actual().pos, Point::ZERO);

        // the initial update still carries the position
        let (received, _, _) = round_trip(&obj, &ctx, UpdateMask::ALL);
        assert_eq!(received.as_ship().unwrap().mover.actual().pos, Point::new(5.0, 5.0));
    }

    #[test]
    fn test_unghosted_shooter_is_sent_as_none() {
        let shooter = ObjectId(9);
        let projectile = ghostwire_core::Projectile::new(Point::new(10.0, 20.0), Point::new(300.0, 0.0), Some(shooter));
        let obj = GameObject::new(ObjectId(4), ObjectKind::Projectile(projectile));

        let (received, outcome, residual) = round_trip(&obj, &FixedContext::default(), UpdateMask::ALL);
        assert!(outcome.initial);
        assert!(residual.is_empty());
        assert_eq!(received.as_projectile().unwrap().shooter, None);

        let (received, _, residual) = round_trip(&obj, &FixedContext::with_ghost(shooter, 3), UpdateMask::ALL);
        assert!(residual.is_empty());
        assert_eq!(received.as_projectile().unwrap().shooter, Some(shooter));
    }

    #[test]
    fn test_barrier_outline_round_trip() {
        let outline = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)];
        let obj = GameObject::new(ObjectId(2), ObjectKind::Barrier(ghostwire_core::Barrier::new(outline.clone())));
        let (received, outcome, _) = round_trip(&obj, &FixedContext::default(), UpdateMask::ALL);
        assert!(outcome.initial);
        assert_eq!(received.collision_poly().unwrap(), outline.as_slice());
    }

    #[test]
    fn test_apply_outcome_mounts_and_extrapolates() {
        let mut world = World::new();
        let ship = world.add(ObjectKind::Ship(ghostwire_core::Ship::new(Point::new(50.0, 0.0))));
        let item = world.add(ObjectKind::Item(ghostwire_core::Item::new(Point::ZERO, true)));
        world
            .get_mut(item)
            .and_then(Movable::mover_mut)
            .unwrap()
            .state_mut(StateIndex::Actual)
            .vel = Point::new(0.0, 100.0);

        let outcome = UnpackOutcome {
            mount: Some(Some(ship)),
            position: Some(PositionUpdate::Interpolate),
            ..UnpackOutcome::default()
        };
        apply_outcome(&mut world, item, outcome, 100);

        let it = world.get(item).unwrap().as_item().unwrap();
        assert_eq!(it.mount, Some(ship));
        assert!(it.mover.interpolating);
        assert!((it.mover.actual().pos.y - 10.0).abs() < 1e-4);
    }
}
