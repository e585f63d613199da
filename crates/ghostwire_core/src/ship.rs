//! # Ships
//!
//! The controllable object. A ship turns each [`Move`] into thrust, spends
//! energy on boost and shield, and fires projectiles on the server.
//!
//! ## Control state
//!
//! The part of a ship that prediction must reproduce exactly. It is
//! serialized raw (no quantization) so a corrected client restarts from the
//! server's bits:
//!
//! ```text
//! [pos.x:32][pos.y:32][vel.x:32][vel.y:32][energy: ranged][cooldown:1][fire_timer: ranged]
//! ```

use ghostwire_shared::{BitStream, Point, StreamResult};
use tracing::debug;

use crate::integrator::{MoveObject, StateIndex};
use crate::moves::Move;
use crate::object::{GameObject, IdleCallPath, ObjectId, ObjectKind, UpdateMask};
use crate::projectile::Projectile;
use crate::world::World;

/// Top speed without boost, units per second.
pub const MAX_VELOCITY: f32 = 450.0;
/// Acceleration without boost, units per second squared.
pub const ACCELERATION: f32 = 2500.0;
/// Top speed with boost.
pub const BOOST_MAX_VELOCITY: f32 = 700.0;
/// Acceleration with boost.
pub const BOOST_ACCELERATION: f32 = 5000.0;
/// Collision radius.
pub const COLLISION_RADIUS: f32 = 24.0;
/// Milliseconds between shots.
pub const FIRE_DELAY: u32 = 100;
/// Past this gap a corrected control object snaps instead of interpolating.
pub const MAX_CONTROL_INTERP_DISTANCE: f32 = 200.0;

/// Full energy.
pub const ENERGY_MAX: u32 = 100_000;
/// Recharge per second while idle.
pub const ENERGY_RECHARGE_RATE: u32 = 6_000;
/// Drain per second while boosting.
pub const ENERGY_BOOST_DRAIN: u32 = 15_000;
/// Drain per second while shielded.
pub const ENERGY_SHIELD_DRAIN: u32 = 15_000;
/// Cost of a projectile hit absorbed by the shield.
pub const ENERGY_SHIELD_HIT_DRAIN: u32 = 20_000;
/// Cost of one shot.
pub const ENERGY_SHOOT_DRAIN: u32 = 500;
/// Energy needed to leave cooldown after running dry.
pub const ENERGY_COOLDOWN_THRESHOLD: u32 = 15_000;

/// Muzzle speed added to the ship's velocity.
pub const PROJECTILE_SPEED: f32 = 600.0;
/// Health removed by one projectile.
pub const PROJECTILE_DAMAGE: f32 = 0.21;

/// Ship state.
#[derive(Clone, Debug, PartialEq)]
pub struct Ship {
    /// Circle body.
    pub mover: MoveObject,
    /// `0.0..=1.0`; the ship explodes at zero.
    pub health: f32,
    /// Energy pool for boost, shield and firing.
    pub energy: u32,
    /// Set when energy runs dry; cleared at [`ENERGY_COOLDOWN_THRESHOLD`].
    pub cooldown: bool,
    /// Milliseconds until the next shot.
    pub fire_timer: u32,
    /// Boost applied on the last processed move.
    pub boost_active: bool,
    /// Shield applied on the last processed move.
    pub shield_active: bool,
    /// Destroyed ships neither move nor collide.
    pub exploded: bool,
    /// A connection drives this ship with moves.
    pub controlled: bool,
    /// Items carried by this ship.
    pub mounted_items: Vec<ObjectId>,
    last_move: Move,
}

impl Ship {
    /// Fresh ship at rest.
    #[must_use]
    pub fn new(pos: Point) -> Self {
        Self {
            mover: MoveObject::new(pos, COLLISION_RADIUS, 1.0),
            health: 1.0,
            energy: ENERGY_MAX,
            cooldown: false,
            fire_timer: 0,
            boost_active: false,
            shield_active: false,
            exploded: false,
            controlled: false,
            mounted_items: Vec::new(),
            last_move: Move::new(),
        }
    }

    /// Updates powers and energy for one move. Returns true when the set of
    /// active powers changed.
    pub fn process_energy(&mut self, m: &Move) -> bool {
        let was = (self.boost_active, self.shield_active);
        let can_use = !self.cooldown && self.energy > 0;
        self.boost_active = m.boost && can_use;
        self.shield_active = m.shield && can_use;

        let mut drain = 0;
        if self.boost_active {
            drain += ENERGY_BOOST_DRAIN;
        }
        if self.shield_active {
            drain += ENERGY_SHIELD_DRAIN;
        }

        if drain > 0 {
            self.energy = self.energy.saturating_sub(drain * m.time / 1000);
        } else {
            self.energy = (self.energy + ENERGY_RECHARGE_RATE * m.time / 1000).min(ENERGY_MAX);
        }

        if self.energy == 0 {
            self.cooldown = true;
        } else if self.energy >= ENERGY_COOLDOWN_THRESHOLD {
            self.cooldown = false;
        }

        was != (self.boost_active, self.shield_active)
    }

    /// Sets the velocity of `state` from the move's thrust, limited by the
    /// current top speed and acceleration, and faces the move's angle.
    pub fn apply_thrust(&mut self, m: &Move, state: StateIndex) {
        let (max_vel, accel) = if self.boost_active {
            (BOOST_MAX_VELOCITY, BOOST_ACCELERATION)
        } else {
            (MAX_VELOCITY, ACCELERATION)
        };
        let time = m.time as f32 * 0.001;

        let mut request = Point::new(m.right - m.left, m.down - m.up) * max_vel;
        let len = request.len();
        if len > max_vel {
            request *= max_vel / len;
        }

        let s = self.mover.state_mut(state);
        let mut vel_delta = request - s.vel;
        let requested = vel_delta.len();
        let max_accel = accel * time;
        if requested > max_accel {
            vel_delta *= max_accel / requested;
            s.vel += vel_delta;
        } else {
            s.vel = request;
        }
        s.angle = m.angle;
    }

    /// Serializes the predicted state.
    pub fn write_control_state(&self, stream: &mut BitStream) {
        let actual = self.mover.actual();
        stream.write_f32(actual.pos.x);
        stream.write_f32(actual.pos.y);
        stream.write_f32(actual.vel.x);
        stream.write_f32(actual.vel.y);
        stream.write_ranged_u32(self.energy.min(ENERGY_MAX), 0, ENERGY_MAX);
        stream.write_flag(self.cooldown);
        stream.write_ranged_u32(self.fire_timer.min(FIRE_DELAY), 0, FIRE_DELAY);
    }

    /// Restores state written by [`Ship::write_control_state`] into the actual state.
    ///
    /// # Errors
    ///
    /// Propagates stream underruns.
    pub fn read_control_state(&mut self, stream: &mut BitStream) -> StreamResult<()> {
        let pos = Point::new(stream.read_f32()?, stream.read_f32()?);
        let vel = Point::new(stream.read_f32()?, stream.read_f32()?);
        let energy = stream.read_ranged_u32(0, ENERGY_MAX)?;
        let cooldown = stream.read_flag()?;
        let fire_timer = stream.read_ranged_u32(0, FIRE_DELAY)?;

        let actual = self.mover.state_mut(StateIndex::Actual);
        actual.pos = pos;
        actual.vel = vel;
        self.energy = energy;
        self.cooldown = cooldown;
        self.fire_timer = fire_timer;
        Ok(())
    }

    /// Called once replay has re-run every pending move. Small or huge gaps
    /// between what was rendered and the corrected state snap; anything in
    /// between is interpolated.
    pub fn control_move_replay_complete(&mut self) {
        let actual = *self.mover.actual();
        let gap = (actual.pos - self.mover.render().pos).len();
        if gap <= 0.5 || gap > MAX_CONTROL_INTERP_DISTANCE {
            let render = self.mover.state_mut(StateIndex::Render);
            render.pos = actual.pos;
            render.vel = actual.vel;
            self.mover.interpolating = false;
        } else {
            self.mover.interpolating = true;
        }
    }
}

impl World {
    pub(crate) fn idle_ship(&mut self, id: ObjectId, path: IdleCallPath) {
        let Some(obj) = self.get_mut(id) else {
            return;
        };
        let current_move = obj.current_move;
        let Some(ship) = obj.as_ship_mut() else {
            return;
        };
        if ship.exploded {
            return;
        }

        if path == IdleCallPath::ServerIdleMainLoop && ship.controlled {
            // Controlled ships only move when their client's moves arrive.
            ship.mover.snap_render_to_actual();
            return;
        }

        let powers_changed = ship.process_energy(&current_move);
        ship.apply_thrust(&current_move, StateIndex::Actual);
        let move_changed = !current_move.is_equal_move(&ship.last_move);
        ship.last_move = current_move;

        self.advance(id, current_move.time as f32 * 0.001, StateIndex::Actual, false);
        self.process_weapon_fire(id, path);

        let Some(ship) = self.get_mut(id).and_then(GameObject::as_ship_mut) else {
            return;
        };
        match path {
            IdleCallPath::ServerIdleMainLoop | IdleCallPath::ServerIdleControlFromClient => {
                ship.mover.snap_render_to_actual();
            }
            IdleCallPath::ClientIdleControlMain | IdleCallPath::ClientIdleMainRemote => {
                ship.mover.update_interpolation(current_move.time);
            }
            IdleCallPath::ClientIdleControlReplay => {}
        }

        if path.is_server() {
            let mut mask = UpdateMask::POSITION;
            if move_changed {
                mask |= UpdateMask::MOVE;
            }
            if powers_changed {
                mask |= UpdateMask::POWERS;
            }
            self.set_mask_bits(id, mask);
        }
    }

    fn process_weapon_fire(&mut self, id: ObjectId, path: IdleCallPath) {
        let Some(obj) = self.get_mut(id) else {
            return;
        };
        let current_move = obj.current_move;
        let Some(ship) = obj.as_ship_mut() else {
            return;
        };

        ship.fire_timer = ship.fire_timer.saturating_sub(current_move.time);
        if !current_move.fire || ship.fire_timer > 0 || ship.energy < ENERGY_SHOOT_DRAIN {
            return;
        }
        ship.energy -= ENERGY_SHOOT_DRAIN;
        ship.fire_timer = FIRE_DELAY;

        if path.is_server() {
            let actual = *ship.mover.actual();
            let dir = Point::from_angle(actual.angle);
            let muzzle = actual.pos + dir * (COLLISION_RADIUS + 2.0);
            let vel = actual.vel + dir * PROJECTILE_SPEED;
            let projectile = self.add(ObjectKind::Projectile(Projectile::new(muzzle, vel, Some(id))));
            debug!(?id, ?projectile, "ship fired");
        }
    }

    /// Applies projectile damage to a ship. Shields absorb the hit with energy.
    pub fn damage_ship(&mut self, id: ObjectId, amount: f32) {
        let Some(ship) = self.get_mut(id).and_then(GameObject::as_ship_mut) else {
            return;
        };
        if ship.exploded {
            return;
        }
        if ship.shield_active {
            ship.energy = ship.energy.saturating_sub(ENERGY_SHIELD_HIT_DRAIN);
            return;
        }

        ship.health = (ship.health - amount).max(0.0);
        let mut mask = UpdateMask::HEALTH;
        if ship.health <= 0.0 {
            ship.exploded = true;
            ship.mover.state_mut(StateIndex::Actual).vel = Point::ZERO;
            ship.mover.snap_render_to_actual();
            mask |= UpdateMask::EXPLOSION;
            let mounted = std::mem::take(&mut ship.mounted_items);
            for item in mounted {
                self.dismount_item(item);
            }
            debug!(?id, "ship exploded");
        }
        self.set_mask_bits(id, mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thrust_right(time: u32) -> Move {
        Move { right: 1.0, time, ..Move::new() }
    }

    #[test]
    fn test_thrust_is_acceleration_limited() {
        let mut ship = Ship::new(Point::ZERO);
        ship.apply_thrust(&thrust_right(32), StateIndex::Actual);
        let vel = ship.mover.actual().vel;
        assert!((vel.x - ACCELERATION * 0.032).abs() < 1e-3);
        assert_eq!(vel.y, 0.0);
    }

    #[test]
    fn test_thrust_caps_at_max_velocity() {
        let mut ship = Ship::new(Point::ZERO);
        for _ in 0..50 {
            ship.apply_thrust(&thrust_right(32), StateIndex::Actual);
        }
        assert!((ship.mover.actual().vel.x - MAX_VELOCITY).abs() < 1e-3);

        let diagonal = Move { right: 1.0, down: 1.0, time: 127, ..Move::new() };
        for _ in 0..50 {
            ship.apply_thrust(&diagonal, StateIndex::Actual);
        }
        assert!((ship.mover.actual().vel.len() - MAX_VELOCITY).abs() < 1e-2);
    }

    #[test]
    fn test_energy_drains_and_cools_down() {
        let mut ship = Ship::new(Point::ZERO);
        ship.energy = 1_000;
        let boost = Move { boost: true, time: 100, ..Move::new() };

        assert!(ship.process_energy(&boost));
        assert_eq!(ship.energy, 0);
        assert!(ship.cooldown);

        // cooled down: boost refused, energy recharges
        assert!(ship.process_energy(&boost));
        assert!(!ship.boost_active);
        assert_eq!(ship.energy, ENERGY_RECHARGE_RATE / 10);
    }

    #[test]
    fn test_control_state_round_trip() {
        let mut ship = Ship::new(Point::new(12.25, -3.5));
        ship.mover.state_mut(StateIndex::Actual).vel = Point::new(101.5, 0.125);
        ship.energy = 42_000;
        ship.fire_timer = 64;

        let mut stream = BitStream::new();
        ship.write_control_state(&mut stream);
        stream.set_bit_position(0);

        let mut copy = Ship::new(Point::ZERO);
        copy.read_control_state(&mut stream).unwrap();
        assert_eq!(copy.mover.actual().pos, ship.mover.actual().pos);
        assert_eq!(copy.mover.actual().vel, ship.mover.actual().vel);
        assert_eq!(copy.energy, 42_000);
        assert_eq!(copy.fire_timer, 64);
    }

    #[test]
    fn test_replay_complete_interpolates_medium_gaps() {
        let mut ship = Ship::new(Point::ZERO);
        ship.mover.state_mut(StateIndex::Actual).pos = Point::new(50.0, 0.0);
        ship.control_move_replay_complete();
        assert!(ship.mover.interpolating);

        ship.mover.state_mut(StateIndex::Actual).pos = Point::new(500.0, 0.0);
        ship.control_move_replay_complete();
        assert!(!ship.mover.interpolating);
        assert_eq!(ship.mover.render().pos, Point::new(500.0, 0.0));
    }
}
