//! Items: free-floating movers that ships can carry.
//!
//! While mounted, an item copies its ship's position and takes no part in
//! collisions. On the server a loose item reports its position whenever it
//! moves and tracks the goal zone it sits in.

use ghostwire_shared::Point;
use tracing::debug;

use crate::integrator::{MoveObject, StateIndex};
use crate::object::{GameObject, IdleCallPath, ObjectId, UpdateMask};
use crate::world::World;

/// Item collision radius.
pub const ITEM_RADIUS: f32 = 10.0;

/// Item state.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    /// Circle body.
    pub mover: MoveObject,
    /// Carried by a ship. May be true with `mount == None` on a client that
    /// has not yet resolved the carrier.
    pub mounted: bool,
    /// Carrying ship.
    pub mount: Option<ObjectId>,
    /// Goal zone containing the item.
    pub zone: Option<ObjectId>,
    /// Whether loose items block movers.
    pub collideable: bool,
}

impl Item {
    /// Loose item at rest.
    #[must_use]
    pub fn new(pos: Point, collideable: bool) -> Self {
        Self {
            mover: MoveObject::new(pos, ITEM_RADIUS, 1.0),
            mounted: false,
            mount: None,
            zone: None,
            collideable,
        }
    }
}

impl World {
    /// Attaches `item` to `ship`, detaching it from any previous carrier.
    /// `None` only detaches.
    pub fn mount_item(&mut self, item: ObjectId, ship: Option<ObjectId>) {
        self.dismount_item(item);
        let Some(ship_id) = ship else {
            return;
        };
        if let Some(s) = self.get_mut(ship_id).and_then(GameObject::as_ship_mut) {
            s.mounted_items.push(item);
        }
        if let Some(it) = self.get_mut(item).and_then(GameObject::as_item_mut) {
            it.mount = Some(ship_id);
            it.mounted = true;
            debug!(?item, ?ship, "item mounted");
        }
        self.set_mask_bits(item, UpdateMask::MOUNT);
    }

    /// Detaches `item` from its carrier.
    pub fn dismount_item(&mut self, item: ObjectId) {
        let Some(it) = self.get_mut(item).and_then(GameObject::as_item_mut) else {
            return;
        };
        let previous = it.mount.take();
        it.mounted = false;
        if let Some(ship) = previous.and_then(|s| self.get_mut(s)).and_then(GameObject::as_ship_mut) {
            ship.mounted_items.retain(|m| *m != item);
        }
        self.set_mask_bits(item, UpdateMask::MOUNT);
    }

    /// Teleports an item. Receivers snap instead of interpolating.
    pub fn set_item_actual_pos(&mut self, item: ObjectId, pos: Point) {
        if let Some(it) = self.get_mut(item).and_then(GameObject::as_item_mut) {
            let actual = it.mover.state_mut(StateIndex::Actual);
            actual.pos = pos;
            actual.vel = Point::ZERO;
            self.set_mask_bits(item, UpdateMask::WARP_POSITION | UpdateMask::POSITION);
        }
    }

    /// Sets an item's velocity as an impulse. Receivers snap.
    pub fn set_item_actual_vel(&mut self, item: ObjectId, vel: Point) {
        if let Some(it) = self.get_mut(item).and_then(GameObject::as_item_mut) {
            it.mover.state_mut(StateIndex::Actual).vel = vel;
            self.set_mask_bits(item, UpdateMask::WARP_POSITION | UpdateMask::POSITION);
        }
    }

    pub(crate) fn idle_item(&mut self, id: ObjectId, path: IdleCallPath) {
        let Some(obj) = self.get(id) else {
            return;
        };
        let time_ms = obj.current_move.time;
        let Some(item) = obj.as_item() else {
            return;
        };

        if item.mounted {
            let carrier = item
                .mount
                .and_then(|m| self.get(m))
                .and_then(GameObject::as_ship)
                .filter(|s| !s.exploded)
                .map(|s| (s.mover.actual().pos, s.mover.render().pos));
            match carrier {
                Some((actual, render)) => {
                    if let Some(it) = self.get_mut(id).and_then(GameObject::as_item_mut) {
                        it.mover.state_mut(StateIndex::Actual).pos = actual;
                        it.mover.state_mut(StateIndex::Render).pos = render;
                    }
                }
                None if path.is_server() => self.dismount_item(id),
                None => {}
            }
            return;
        }

        self.advance(id, time_ms as f32 * 0.001, StateIndex::Actual, false);

        if path == IdleCallPath::ServerIdleMainLoop {
            let Some(it) = self.get_mut(id).and_then(GameObject::as_item_mut) else {
                return;
            };
            let moving = it.mover.actual().vel.len() > 0.001;
            it.mover.snap_render_to_actual();
            let pos = it.mover.actual().pos;
            let old_zone = it.zone;
            if moving {
                self.set_mask_bits(id, UpdateMask::POSITION);
            }

            let zone = self.zone_containing(pos);
            if zone != old_zone {
                if let Some(it) = self.get_mut(id).and_then(GameObject::as_item_mut) {
                    it.zone = zone;
                }
                self.set_mask_bits(id, UpdateMask::ZONE);
            }
        } else if let Some(it) = self.get_mut(id).and_then(GameObject::as_item_mut) {
            it.mover.update_interpolation(time_ms);
        }
    }
}
