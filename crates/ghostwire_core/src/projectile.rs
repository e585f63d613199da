//! Projectiles: fast point objects that travel by line-of-sight checks
//! rather than swept circles.

use ghostwire_shared::Point;
use tracing::trace;

use crate::integrator::StateIndex;
use crate::object::{GameObject, IdleCallPath, Movable, ObjectId, TypeMask, UpdateMask};
use crate::ship::PROJECTILE_DAMAGE;
use crate::world::{SpatialQuery, World};

/// Lifetime of a shot in milliseconds.
pub const PROJECTILE_LIFETIME: u32 = 1000;

/// Projectile state.
#[derive(Clone, Debug, PartialEq)]
pub struct Projectile {
    /// Position.
    pub pos: Point,
    /// Velocity, units per second.
    pub vel: Point,
    /// Remaining lifetime on the server; elapsed lifetime on clients.
    pub live_time: u32,
    /// Hit something and stopped.
    pub collided: bool,
    /// Still scheduled to exist.
    pub alive: bool,
    /// Ship that fired it. Never hit by its own shot.
    pub shooter: Option<ObjectId>,
}

impl Projectile {
    /// Freshly fired shot.
    #[must_use]
    pub const fn new(pos: Point, vel: Point, shooter: Option<ObjectId>) -> Self {
        Self {
            pos,
            vel,
            live_time: PROJECTILE_LIFETIME,
            collided: false,
            alive: true,
            shooter,
        }
    }
}

impl World {
    pub(crate) fn idle_projectile(&mut self, id: ObjectId, path: IdleCallPath) {
        let Some(obj) = self.get(id) else {
            return;
        };
        let delta_ms = obj.current_move.time;
        let Some(shot) = obj.as_projectile() else {
            return;
        };
        let (pos, vel, shooter, collided) = (shot.pos, shot.vel, shot.shooter, shot.collided);

        if !collided {
            let end = pos + vel * (delta_ms as f32 * 0.001);
            let hit = self.projectile_line_of_sight(id, shooter, pos, end);
            match hit {
                Some((hit_id, t)) => {
                    let point = pos + (end - pos) * t;
                    if path.is_server() && self.get(hit_id).is_some_and(|o| o.as_ship().is_some()) {
                        self.damage_ship(hit_id, PROJECTILE_DAMAGE);
                    }
                    if let Some(shot) = self.get_mut(id).and_then(GameObject::as_projectile_mut) {
                        shot.collided = true;
                        shot.live_time = 0;
                        shot.pos = point;
                    }
                    self.set_mask_bits(id, UpdateMask::EXPLOSION);
                    trace!(?id, ?hit_id, "projectile hit");
                }
                None => {
                    if let Some(shot) = self.get_mut(id).and_then(GameObject::as_projectile_mut) {
                        shot.pos = end;
                    }
                }
            }
        }

        let Some(shot) = self.get_mut(id).and_then(GameObject::as_projectile_mut) else {
            return;
        };
        if path == IdleCallPath::ClientIdleMainRemote {
            shot.live_time = shot.live_time.saturating_add(delta_ms);
        } else if shot.alive {
            if shot.live_time <= delta_ms {
                shot.live_time = 0;
                shot.alive = false;
                self.remove(id);
            } else {
                shot.live_time -= delta_ms;
            }
        }
    }

    /// First thing the shot would hit, skipping its shooter and anything
    /// that refuses the hit.
    fn projectile_line_of_sight(
        &mut self,
        id: ObjectId,
        shooter: Option<ObjectId>,
        start: Point,
        end: Point,
    ) -> Option<(ObjectId, f32)> {
        let mut disabled = Vec::new();
        if let Some(shooter) = shooter {
            if let Some(obj) = self.get_mut(shooter) {
                obj.disable_collision();
                disabled.push(shooter);
            }
        }

        let mask = TypeMask::MOVEABLE | TypeMask::BARRIER;
        let hit = loop {
            let Some((hit_id, t)) = self.find_object_los(mask, StateIndex::Render, start, end) else {
                break None;
            };
            let accepts = match (self.get(hit_id), self.get(id)) {
                (Some(target), Some(me)) => target.collide(me),
                _ => false,
            };
            if accepts {
                break Some((hit_id, t));
            }
            if let Some(obj) = self.get_mut(hit_id) {
                obj.disable_collision();
            }
            disabled.push(hit_id);
        };

        for other in disabled {
            if let Some(obj) = self.get_mut(other) {
                obj.enable_collision();
            }
        }
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::Barrier;
    use crate::object::ObjectKind;
    use crate::ship::Ship;

    #[test]
    fn test_projectile_travels_and_expires() {
        let mut world = World::new();
        let shot = world.add(ObjectKind::Projectile(Projectile::new(Point::ZERO, Point::new(100.0, 0.0), None)));
        world.get_mut(shot).unwrap().current_move.time = 100;

        world.integrate(shot, IdleCallPath::ServerIdleMainLoop);
        let p = world.get(shot).unwrap().as_projectile().unwrap();
        assert!((p.pos.x - 10.0).abs() < 1e-4);
        assert_eq!(p.live_time, PROJECTILE_LIFETIME - 100);

        for _ in 0..9 {
            world.integrate(shot, IdleCallPath::ServerIdleMainLoop);
        }
        assert!(world.get(shot).is_none());
    }

    #[test]
    fn test_projectile_skips_shooter_and_hits_barrier() {
        let mut world = World::new();
        let shooter = world.add(ObjectKind::Ship(Ship::new(Point::ZERO)));
        world.add(ObjectKind::Barrier(Barrier::new(vec![
            Point::new(50.0, -10.0),
            Point::new(60.0, -10.0),
            Point::new(60.0, 10.0),
            Point::new(50.0, 10.0),
        ])));
        let shot = world.add(ObjectKind::Projectile(Projectile::new(
            Point::ZERO,
            Point::new(1000.0, 0.0),
            Some(shooter),
        )));
        world.get_mut(shot).unwrap().current_move.time = 100;

        world.integrate(shot, IdleCallPath::ServerIdleMainLoop);
        let p = world.get(shot).unwrap().as_projectile().unwrap();
        assert!(p.collided);
        assert!((p.pos.x - 50.0).abs() < 1e-3);
        assert!(world.get(shooter).unwrap().is_collision_enabled());
    }

    #[test]
    fn test_projectile_damages_ship() {
        let mut world = World::new();
        let target = world.add(ObjectKind::Ship(Ship::new(Point::new(80.0, 0.0))));
        let shot = world.add(ObjectKind::Projectile(Projectile::new(Point::ZERO, Point::new(1000.0, 0.0), None)));
        world.get_mut(shot).unwrap().current_move.time = 100;

        world.integrate(shot, IdleCallPath::ServerIdleMainLoop);
        let ship = world.get(target).unwrap().as_ship().unwrap();
        assert!((ship.health - (1.0 - PROJECTILE_DAMAGE)).abs() < 1e-6);
        assert!(world.take_dirty()[&target].contains(UpdateMask::HEALTH));
    }
}
