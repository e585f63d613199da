//! # World
//!
//! Owns every object of one simulation (the server's authoritative world,
//! or a client's ghost world) and answers spatial queries over them.
//!
//! Objects are stored in a `BTreeMap`, so every pass over the world, and
//! every query result, is in ascending [`ObjectId`] order.

use std::collections::BTreeMap;

use ghostwire_shared::{Point, Rect};
use tracing::trace;

use crate::geometry::{point_in_polygon, ray_circle_intersect, ray_polygon_intersect};
use crate::integrator::StateIndex;
use crate::object::{GameObject, IdleCallPath, Movable, ObjectId, ObjectKind, TypeMask, UpdateMask};

/// Spatial lookups used by the integrator and projectiles.
pub trait SpatialQuery {
    /// Objects of `mask` whose extent overlaps `rect`, in ascending id order.
    fn find_objects(&self, mask: TypeMask, rect: &Rect) -> Vec<ObjectId>;

    /// First collision-enabled object of `mask` crossed by the segment
    /// `start..end`, with the crossing fraction.
    fn find_object_los(
        &self,
        mask: TypeMask,
        state: StateIndex,
        start: Point,
        end: Point,
    ) -> Option<(ObjectId, f32)>;
}

/// One simulation's objects.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct World {
    objects: BTreeMap<ObjectId, GameObject>,
    next_id: u32,
    dirty: BTreeMap<ObjectId, UpdateMask>,
    removed: Vec<ObjectId>,
}

impl World {
    /// Empty world.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 1,
            dirty: BTreeMap::new(),
            removed: Vec::new(),
        }
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when the world holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Inserts a new object and returns its id.
    pub fn add(&mut self, kind: ObjectKind) -> ObjectId {
        let id = ObjectId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        self.objects.insert(id, GameObject::new(id, kind));
        trace!(?id, "object added");
        id
    }

    /// Removes an object. Items carried by a removed ship are dropped.
    pub fn remove(&mut self, id: ObjectId) -> Option<GameObject> {
        let mounted = self
            .get(id)
            .and_then(GameObject::as_ship)
            .map(|s| s.mounted_items.clone())
            .unwrap_or_default();
        for item in mounted {
            self.dismount_item(item);
        }
        if let Some(mount) = self.get(id).and_then(GameObject::as_item).and_then(|i| i.mount) {
            if let Some(ship) = self.get_mut(mount).and_then(GameObject::as_ship_mut) {
                ship.mounted_items.retain(|m| *m != id);
            }
        }

        let removed = self.objects.remove(&id)?;
        self.dirty.remove(&id);
        self.removed.push(id);
        trace!(?id, "object removed");
        Some(removed)
    }

    /// Object by id.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(&id)
    }

    /// Mutable object by id.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(&id)
    }

    /// All ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    /// All objects in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.values()
    }

    /// Marks aspects of `id` as changed.
    pub fn set_mask_bits(&mut self, id: ObjectId, mask: UpdateMask) {
        if self.objects.contains_key(&id) {
            *self.dirty.entry(id).or_default() |= mask;
        }
    }

    /// Drains the dirty masks accumulated since the last call.
    pub fn take_dirty(&mut self) -> BTreeMap<ObjectId, UpdateMask> {
        std::mem::take(&mut self.dirty)
    }

    /// Drains the ids removed since the last call.
    pub fn take_removed(&mut self) -> Vec<ObjectId> {
        std::mem::take(&mut self.removed)
    }

    /// Runs one idle of `id` for `current_move.time` milliseconds.
    pub fn integrate(&mut self, id: ObjectId, path: IdleCallPath) {
        let Some(obj) = self.get(id) else {
            return;
        };
        match obj.kind {
            ObjectKind::Ship(_) => self.idle_ship(id, path),
            ObjectKind::Item(_) => self.idle_item(id, path),
            ObjectKind::Projectile(_) => self.idle_projectile(id, path),
            ObjectKind::Barrier(_) | ObjectKind::GoalZone(_) => {}
        }
    }

    /// Idles every object for `delta_ms`, except `skip` (a control object
    /// driven separately). Objects created during the pass wait for the next one.
    pub fn idle_all(&mut self, delta_ms: u32, path: IdleCallPath, skip: Option<ObjectId>) {
        for id in self.ids() {
            if Some(id) == skip {
                continue;
            }
            if let Some(obj) = self.get_mut(id) {
                obj.current_move.time = delta_ms;
            }
            self.integrate(id, path);
        }
    }

    /// Goal zone containing `pos`, lowest id first.
    #[must_use]
    pub fn zone_containing(&self, pos: Point) -> Option<ObjectId> {
        self.iter().find_map(|obj| match &obj.kind {
            ObjectKind::GoalZone(zone) if point_in_polygon(&zone.points, pos) => Some(obj.id),
            _ => None,
        })
    }
}

impl SpatialQuery for World {
    fn find_objects(&self, mask: TypeMask, rect: &Rect) -> Vec<ObjectId> {
        self.iter()
            .filter(|obj| obj.type_mask().intersects(mask) && obj.extent().intersects(rect))
            .map(|obj| obj.id)
            .collect()
    }

    fn find_object_los(
        &self,
        mask: TypeMask,
        state: StateIndex,
        start: Point,
        end: Point,
    ) -> Option<(ObjectId, f32)> {
        let query = Rect::new(start, end);
        let mut best: Option<(ObjectId, f32)> = None;

        for obj in self.iter() {
            if !obj.type_mask().intersects(mask) || !obj.is_collision_enabled() {
                continue;
            }
            let t = if let Some(poly) = obj.collision_poly() {
                if !obj.extent().intersects(&query) {
                    continue;
                }
                ray_polygon_intersect(poly, start, end)
            } else if let Some(mover) = obj.mover() {
                ray_circle_intersect(mover.state(state).pos, mover.radius, start, end)
            } else {
                None
            };

            if let Some(t) = t {
                if best.map_or(true, |(_, b)| t < b) {
                    best = Some((obj.id, t));
                }
            }
        }
        best
    }
}
