//! # Object Model
//!
//! Every simulated entity is a [`GameObject`]: shared bookkeeping plus one
//! [`ObjectKind`] variant carrying the kind-specific state.
//!
//! ```text
//! GameObject
//! ├── id / current_move / collision-disable counter
//! └── kind
//!     ├── Ship        (controllable mover)
//!     ├── Item        (mountable mover)
//!     ├── Projectile  (ray-cast, not a circle)
//!     ├── Barrier     (static polygon)
//!     └── GoalZone    (static polygon, never collides)
//! ```
//!
//! Replication lives in `ghostwire_networking`; this module only knows which
//! aspects of an object became dirty ([`UpdateMask`]).

use ghostwire_shared::{Point, Rect};

use crate::barrier::{Barrier, GoalZone};
use crate::integrator::MoveObject;
use crate::item::Item;
use crate::moves::Move;
use crate::projectile::Projectile;
use crate::ship::Ship;

/// Stable identity of an object inside one [`crate::World`].
///
/// Ids are local to a world. The server and each client number their
/// objects independently; ghost indices map between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

/// Bit set of object categories, used to filter spatial queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TypeMask(pub u32);

impl TypeMask {
    /// No category.
    pub const NONE: Self = Self(0);
    /// Ships.
    pub const SHIP: Self = Self(1 << 0);
    /// Items.
    pub const ITEM: Self = Self(1 << 1);
    /// Projectiles.
    pub const PROJECTILE: Self = Self(1 << 2);
    /// Static barriers.
    pub const BARRIER: Self = Self(1 << 3);
    /// Goal zones.
    pub const GOAL_ZONE: Self = Self(1 << 4);
    /// Everything simulated by the integrator.
    pub const MOVEABLE: Self = Self(Self::SHIP.0 | Self::ITEM.0);
    /// Every category.
    pub const ALL: Self = Self(u32::MAX);

    /// True when the two masks share any category.
    #[must_use]
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for TypeMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Independently dirty aspects of an object, one bit per aspect.
///
/// Not every kind uses every bit. Bits that a kind does not serialize are
/// simply ignored by its codec.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct UpdateMask(pub u32);

impl UpdateMask {
    /// Nothing dirty.
    pub const NONE: Self = Self(0);
    /// Baseline state of a newly scoped object.
    pub const INITIAL: Self = Self(1 << 0);
    /// Actual position and velocity.
    pub const POSITION: Self = Self(1 << 1);
    /// Current move (lets remote ships extrapolate).
    pub const MOVE: Self = Self(1 << 2);
    /// Position changed discontinuously; receivers must not interpolate.
    pub const WARP_POSITION: Self = Self(1 << 3);
    /// Ship exploded or projectile collided.
    pub const EXPLOSION: Self = Self(1 << 4);
    /// Ship health.
    pub const HEALTH: Self = Self(1 << 5);
    /// Active powers (boost, shield).
    pub const POWERS: Self = Self(1 << 6);
    /// Item mount reference.
    pub const MOUNT: Self = Self(1 << 7);
    /// Item zone reference.
    pub const ZONE: Self = Self(1 << 8);
    /// Every aspect, including [`UpdateMask::INITIAL`].
    pub const ALL: Self = Self(u32::MAX);

    /// True when no bit is set.
    #[must_use]
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when any bit of `bits` is set.
    #[must_use]
    #[inline]
    pub const fn contains(self, bits: Self) -> bool {
        self.0 & bits.0 != 0
    }

    /// Clears `bits`.
    #[must_use]
    pub const fn without(self, bits: Self) -> Self {
        Self(self.0 & !bits.0)
    }
}

impl std::ops::BitOr for UpdateMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for UpdateMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAnd for UpdateMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Why an object is being idled. Determines which move state is advanced
/// and what happens to the render state afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdleCallPath {
    /// Server tick for every object.
    ServerIdleMainLoop,
    /// Server applying one move received from the controlling client.
    ServerIdleControlFromClient,
    /// Client tick for a ghost it does not control.
    ClientIdleMainRemote,
    /// Client tick for its own control object (prediction).
    ClientIdleControlMain,
    /// Client re-applying a pending move after a server correction.
    ClientIdleControlReplay,
}

impl IdleCallPath {
    /// True on the authoritative side.
    #[must_use]
    pub const fn is_server(self) -> bool {
        matches!(self, Self::ServerIdleMainLoop | Self::ServerIdleControlFromClient)
    }
}

/// Kind-specific state.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectKind {
    /// Controllable ship.
    Ship(Ship),
    /// Mountable item.
    Item(Item),
    /// Fired projectile.
    Projectile(Projectile),
    /// Static obstacle.
    Barrier(Barrier),
    /// Static region items can sit in.
    GoalZone(GoalZone),
}

impl ObjectKind {
    /// Number of distinct kinds; bounds the class id on the wire.
    pub const CLASS_COUNT: u32 = 5;

    /// Wire class id.
    #[must_use]
    pub const fn class_id(&self) -> u32 {
        match self {
            Self::Ship(_) => 0,
            Self::Item(_) => 1,
            Self::Projectile(_) => 2,
            Self::Barrier(_) => 3,
            Self::GoalZone(_) => 4,
        }
    }

    /// Default-constructed kind for a wire class id, ready for an initial update.
    #[must_use]
    pub fn from_class_id(class_id: u32) -> Option<Self> {
        match class_id {
            0 => Some(Self::Ship(Ship::new(Point::ZERO))),
            1 => Some(Self::Item(Item::new(Point::ZERO, true))),
            2 => Some(Self::Projectile(Projectile::new(Point::ZERO, Point::ZERO, None))),
            3 => Some(Self::Barrier(Barrier::new(Vec::new()))),
            4 => Some(Self::GoalZone(GoalZone::new(Vec::new()))),
            _ => None,
        }
    }

    /// Category of this kind.
    #[must_use]
    pub const fn type_mask(&self) -> TypeMask {
        match self {
            Self::Ship(_) => TypeMask::SHIP,
            Self::Item(_) => TypeMask::ITEM,
            Self::Projectile(_) => TypeMask::PROJECTILE,
            Self::Barrier(_) => TypeMask::BARRIER,
            Self::GoalZone(_) => TypeMask::GOAL_ZONE,
        }
    }
}

/// One simulated entity.
#[derive(Clone, Debug, PartialEq)]
pub struct GameObject {
    /// Identity inside the owning world.
    pub id: ObjectId,
    /// Kind-specific state.
    pub kind: ObjectKind,
    /// Input applied on the next idle; its `time` is the idle duration.
    pub current_move: Move,
    collision_disable_count: u32,
}

impl GameObject {
    /// Wraps a kind.
    #[must_use]
    pub const fn new(id: ObjectId, kind: ObjectKind) -> Self {
        Self {
            id,
            kind,
            current_move: Move::new(),
            collision_disable_count: 0,
        }
    }

    /// Category of this object.
    #[must_use]
    pub const fn type_mask(&self) -> TypeMask {
        self.kind.type_mask()
    }

    /// False while any caller holds a collision disable.
    #[must_use]
    pub const fn is_collision_enabled(&self) -> bool {
        self.collision_disable_count == 0
    }

    /// Temporarily excludes the object from collision queries.
    pub fn disable_collision(&mut self) {
        self.collision_disable_count += 1;
    }

    /// Releases one [`GameObject::disable_collision`].
    pub fn enable_collision(&mut self) {
        self.collision_disable_count = self.collision_disable_count.saturating_sub(1);
    }

    /// Outline that swept circles collide against.
    #[must_use]
    pub fn collision_poly(&self) -> Option<&[Point]> {
        match &self.kind {
            ObjectKind::Barrier(barrier) => Some(&barrier.points),
            _ => None,
        }
    }

    /// Bounding rectangle used by spatial queries.
    #[must_use]
    pub fn extent(&self) -> Rect {
        match &self.kind {
            ObjectKind::Ship(Ship { mover, .. }) | ObjectKind::Item(Item { mover, .. }) => {
                let r = Point::new(mover.radius, mover.radius);
                Rect::around(mover.actual().pos, r)
            }
            ObjectKind::Projectile(p) => Rect::new(p.pos, p.pos),
            ObjectKind::Barrier(Barrier { points }) | ObjectKind::GoalZone(GoalZone { points }) => {
                Rect::bounding(points)
            }
        }
    }

    /// Ship state, if this is a ship.
    #[must_use]
    pub const fn as_ship(&self) -> Option<&Ship> {
        match &self.kind {
            ObjectKind::Ship(ship) => Some(ship),
            _ => None,
        }
    }

    /// Mutable ship state, if this is a ship.
    pub fn as_ship_mut(&mut self) -> Option<&mut Ship> {
        match &mut self.kind {
            ObjectKind::Ship(ship) => Some(ship),
            _ => None,
        }
    }

    /// Item state, if this is an item.
    #[must_use]
    pub const fn as_item(&self) -> Option<&Item> {
        match &self.kind {
            ObjectKind::Item(item) => Some(item),
            _ => None,
        }
    }

    /// Mutable item state, if this is an item.
    pub fn as_item_mut(&mut self) -> Option<&mut Item> {
        match &mut self.kind {
            ObjectKind::Item(item) => Some(item),
            _ => None,
        }
    }

    /// Projectile state, if this is a projectile.
    #[must_use]
    pub const fn as_projectile(&self) -> Option<&Projectile> {
        match &self.kind {
            ObjectKind::Projectile(p) => Some(p),
            _ => None,
        }
    }

    /// Mutable projectile state, if this is a projectile.
    pub fn as_projectile_mut(&mut self) -> Option<&mut Projectile> {
        match &mut self.kind {
            ObjectKind::Projectile(p) => Some(p),
            _ => None,
        }
    }
}

/// Capability shared by everything the integrator can move.
pub trait Movable {
    /// Circle state, for kinds simulated by the integrator.
    fn mover(&self) -> Option<&MoveObject>;

    /// Mutable circle state.
    fn mover_mut(&mut self) -> Option<&mut MoveObject>;

    /// Whether this object accepts a collision with `other`. Both sides
    /// must agree for a collision to count.
    fn collide(&self, other: &GameObject) -> bool;
}

impl Movable for GameObject {
    fn mover(&self) -> Option<&MoveObject> {
        match &self.kind {
            ObjectKind::Ship(ship) => Some(&ship.mover),
            ObjectKind::Item(item) => Some(&item.mover),
            _ => None,
        }
    }

    fn mover_mut(&mut self) -> Option<&mut MoveObject> {
        match &mut self.kind {
            ObjectKind::Ship(ship) => Some(&mut ship.mover),
            ObjectKind::Item(item) => Some(&mut item.mover),
            _ => None,
        }
    }

    fn collide(&self, _other: &GameObject) -> bool {
        match &self.kind {
            ObjectKind::Ship(ship) => !ship.exploded,
            ObjectKind::Item(item) => item.collideable && !item.mounted,
            ObjectKind::Barrier(_) => true,
            ObjectKind::Projectile(_) | ObjectKind::GoalZone(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_mask_ops() {
        let mut mask = UpdateMask::POSITION | UpdateMask::MOUNT;
        assert!(mask.contains(UpdateMask::MOUNT));
        assert!(!mask.contains(UpdateMask::ZONE));
        mask = mask.without(UpdateMask::MOUNT);
        assert_eq!(mask, UpdateMask::POSITION);
        mask |= UpdateMask::ZONE;
        assert!(mask.contains(UpdateMask::ZONE));
        assert!(UpdateMask::ALL.contains(UpdateMask::INITIAL));
        assert!(UpdateMask::NONE.is_empty());
    }

    #[test]
    fn test_class_ids_round_trip() {
        for class_id in 0..ObjectKind::CLASS_COUNT {
            let kind = ObjectKind::from_class_id(class_id).unwrap();
            assert_eq!(kind.class_id(), class_id);
        }
        assert!(ObjectKind::from_class_id(ObjectKind::CLASS_COUNT).is_none());
    }

    #[test]
    fn test_collision_disable_nests() {
        let mut obj = GameObject::new(ObjectId(1), ObjectKind::Barrier(Barrier::new(Vec::new())));
        obj.disable_collision();
        obj.disable_collision();
        obj.enable_collision();
        assert!(!obj.is_collision_enabled());
        obj.enable_collision();
        assert!(obj.is_collision_enabled());
    }

    #[test]
    fn test_mounted_item_does_not_collide() {
        let mut item = GameObject::new(ObjectId(2), ObjectKind::Item(Item::new(Point::ZERO, true)));
        let ship = GameObject::new(ObjectId(3), ObjectKind::Ship(Ship::new(Point::ZERO)));
        assert!(item.collide(&ship));
        item.as_item_mut().unwrap().mounted = true;
        assert!(!item.collide(&ship));
    }
}
