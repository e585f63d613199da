//! # Movable-Object Integrator
//!
//! Continuous-time movement for circular objects.
//!
//! ## Sub-stepping
//!
//! ```text
//! advance(dt):
//!   repeat (at most 8 times, while dt remains):
//!     find earliest contact along vel * dt
//!       - swept circle vs barrier polygons
//!       - earliest root of |p + v t| = r1 + r2 vs other movers
//!     none  -> move the full remainder, done
//!     hit   -> move to contact, then
//!       mover, closing  -> elastic impulse along the centre line
//!       mover, opening  -> push the obstructing mover out of the way
//!       barrier         -> reflect velocity across the contact normal
//!     dt -= time to contact
//! ```
//!
//! Each object keeps two [`MoveState`]s. `Actual` is the simulated truth;
//! `Render` chases it smoothly on clients (see [`MoveObject::update_interpolation`]).

use ghostwire_shared::{Point, Rect};
use tracing::trace;

use crate::geometry::{find_lowest_root_in_interval, polygon_swept_circle_intersect};
use crate::object::{Movable, ObjectId, TypeMask};
use crate::world::{SpatialQuery, World};

/// Velocity scale applied along the normal when bouncing off a barrier.
/// Values above 1 reflect; 2 would be a perfect mirror.
pub const BARRIER_ELASTICITY: f32 = 1.7;

/// Restitution between two movers.
pub const MOVER_RESTITUTION: f32 = 0.9;

/// Remaining move time below which a call stops.
pub const MOVE_TIME_EPSILON: f32 = 0.000_001;

/// Speed below which an object is considered at rest.
pub const VELOCITY_EPSILON: f32 = 0.000_01;

/// Extra time added when pushing an obstructing mover aside.
pub const DISPLACE_EPSILON: f32 = 0.002;

/// Sub-steps per call before residual motion is dropped.
pub const MAX_MOVE_ITERATIONS: u32 = 8;

/// Nesting limit for chained displacement pushes.
pub const MAX_DISPLACE_DEPTH: u32 = 8;

/// Render-state chase speed floor, units per second.
pub const INTERP_MAX_VELOCITY: f32 = 900.0;

/// Render-state chase acceleration, units per second squared.
pub const INTERP_ACCELERATION: f32 = 1800.0;

/// Which of an object's two states an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateIndex {
    /// Simulated, authoritative state.
    Actual = 0,
    /// Smoothed state used for display.
    Render = 1,
}

/// Position, velocity and facing of one state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MoveState {
    /// Position.
    pub pos: Point,
    /// Velocity, units per second.
    pub vel: Point,
    /// Facing, radians.
    pub angle: f32,
}

/// Circle body simulated by the integrator.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveObject {
    /// `[Actual, Render]`.
    pub states: [MoveState; 2],
    /// Collision radius.
    pub radius: f32,
    /// Mass for mover-vs-mover impulses.
    pub mass: f32,
    /// True while the render state is still chasing the actual state.
    pub interpolating: bool,
}

impl MoveObject {
    /// Body at rest at `pos`.
    #[must_use]
    pub fn new(pos: Point, radius: f32, mass: f32) -> Self {
        let state = MoveState { pos, ..MoveState::default() };
        Self {
            states: [state; 2],
            radius,
            mass,
            interpolating: false,
        }
    }

    /// State at `index`.
    #[must_use]
    #[inline]
    pub const fn state(&self, index: StateIndex) -> &MoveState {
        &self.states[index as usize]
    }

    /// Mutable state at `index`.
    #[inline]
    pub fn state_mut(&mut self, index: StateIndex) -> &mut MoveState {
        &mut self.states[index as usize]
    }

    /// Actual state.
    #[must_use]
    pub const fn actual(&self) -> &MoveState {
        self.state(StateIndex::Actual)
    }

    /// Render state.
    #[must_use]
    pub const fn render(&self) -> &MoveState {
        self.state(StateIndex::Render)
    }

    /// Copies the actual state into the render state and stops interpolating.
    pub fn snap_render_to_actual(&mut self) {
        self.interpolating = false;
        self.states[StateIndex::Render as usize] = self.states[StateIndex::Actual as usize];
    }

    /// Moves the render state toward the actual state over `delta_ms`.
    ///
    /// The render velocity accelerates toward whatever speed closes the gap
    /// within this step, limited by [`INTERP_MAX_VELOCITY`] (or the actual
    /// speed, if higher) and [`INTERP_ACCELERATION`]. When the gap can be
    /// closed without hitting either limit, or is already zero, the render
    /// state snaps to the actual state.
    pub fn update_interpolation(&mut self, delta_ms: u32) {
        let actual = *self.actual();
        self.state_mut(StateIndex::Render).angle = actual.angle;

        if !self.interpolating || delta_ms == 0 {
            self.snap_render_to_actual();
            return;
        }

        let render = *self.render();
        let delta_p = actual.pos - render.pos;
        let distance = delta_p.len();
        if distance == 0.0 {
            self.snap_render_to_actual();
            return;
        }

        let dir = delta_p * (1.0 / distance);
        let vel = dir.dot(render.vel).max(dir.dot(actual.vel)).max(0.0);

        let time = delta_ms as f32 * 0.001;
        if vel * time > distance {
            self.snap_render_to_actual();
            return;
        }

        let mut hit = true;
        let mut request_vel = distance / time;
        let max_vel = INTERP_MAX_VELOCITY.max(actual.vel.len());
        if request_vel > max_vel {
            hit = false;
            request_vel = max_vel;
        }

        let mut accel = (request_vel - vel) / time;
        if accel > INTERP_ACCELERATION {
            accel = INTERP_ACCELERATION;
            hit = false;
        }

        if hit {
            self.snap_render_to_actual();
            return;
        }

        let new_vel = vel + accel * time;
        let render = self.state_mut(StateIndex::Render);
        render.vel = dir * new_vel;
        render.pos += render.vel * time;
    }
}

/// Time the obstructing body needs to move along its own velocity so that
/// a body arriving at `intended_pos` no longer overlaps it.
#[must_use]
pub fn compute_min_separation_time(
    intended_pos: Point,
    my_radius: f32,
    other_pos: Point,
    other_vel: Point,
    other_radius: f32,
) -> Option<f32> {
    let pos_delta = other_pos - intended_pos;
    let r = my_radius + other_radius;
    let a = other_vel.dot(other_vel);
    let b = 2.0 * other_vel.dot(pos_delta);
    let c = pos_delta.dot(pos_delta) - r * r;
    find_lowest_root_in_interval(a, b, c, 100_000.0)
}

/// Velocities along the centre line after an impact between masses `m1` and
/// `m2` travelling at `v1` and `v2`, with restitution `e`.
#[must_use]
pub fn elastic_response(m1: f32, v1: f32, m2: f32, v2: f32, e: f32) -> (f32, f32) {
    let total = m1 + m2;
    if total <= 0.0 {
        let v2f = (e * (v1 - v2) + v1 + v2) * 0.5;
        return (v1 + v2 - v2f, v2f);
    }
    let momentum = m1 * v1 + m2 * v2;
    let v1f = (momentum + m2 * e * (v2 - v1)) / total;
    let v2f = (momentum + m1 * e * (v1 - v2)) / total;
    (v1f, v2f)
}

/// Earliest contact found by [`World::find_first_collision`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    /// Object hit.
    pub object: ObjectId,
    /// Contact point (barrier hits only; movers report the origin).
    pub point: Point,
}

#[derive(Clone, Copy)]
struct Body {
    pos: Point,
    vel: Point,
    radius: f32,
}

impl World {
    fn body(&self, id: ObjectId, state: StateIndex) -> Option<Body> {
        let mover = self.get(id)?.mover()?;
        let s = mover.state(state);
        Some(Body {
            pos: s.pos,
            vel: s.vel,
            radius: mover.radius,
        })
    }

    fn set_pos(&mut self, id: ObjectId, state: StateIndex, pos: Point) {
        if let Some(mover) = self.get_mut(id).and_then(Movable::mover_mut) {
            mover.state_mut(state).pos = pos;
        }
    }

    /// Advances `id` by `move_time` seconds in `state`, resolving collisions.
    ///
    /// `displacing` marks a push from another mover: the call then runs even
    /// at rest and ends on the first mover impact.
    pub fn advance(&mut self, id: ObjectId, move_time: f32, state: StateIndex, displacing: bool) {
        self.advance_inner(id, move_time, state, displacing, 0);
    }

    fn advance_inner(
        &mut self,
        id: ObjectId,
        mut move_time: f32,
        state: StateIndex,
        displacing: bool,
        depth: u32,
    ) {
        let mut try_count = 0;
        while move_time > MOVE_TIME_EPSILON && try_count < MAX_MOVE_ITERATIONS {
            try_count += 1;

            let Some(me) = self.body(id, state) else {
                return;
            };
            if !displacing && me.vel.len() < VELOCITY_EPSILON {
                return;
            }

            let mut collision_time = move_time;
            let Some(contact) = self.find_first_collision(id, state, &mut collision_time) else {
                self.set_pos(id, state, me.pos + me.vel * move_time);
                return;
            };

            let pos = me.pos + me.vel * collision_time;
            self.set_pos(id, state, pos);

            if let Some(other) = self.body(contact.object, state) {
                let vel_delta = other.vel - me.vel;
                let pos_delta = other.pos - pos;

                if pos_delta.dot(vel_delta) < 0.0 {
                    self.resolve_mover_collision(id, contact.object, state);
                    if displacing {
                        return;
                    }
                } else {
                    let intended = pos + me.vel * move_time;
                    let t = compute_min_separation_time(intended, me.radius, other.pos, other.vel, other.radius)
                        .unwrap_or(0.0);
                    if t <= 0.0 || depth >= MAX_DISPLACE_DEPTH {
                        trace!(?id, depth, "no separation solution, stopping sub-step");
                        return;
                    }
                    self.advance_inner(contact.object, t + DISPLACE_EPSILON, state, true, depth + 1);
                }
            } else {
                self.resolve_barrier_collision(id, state, contact.point);
            }

            move_time -= collision_time;
        }
    }

    /// Finds the earliest contact for `id` within `collision_time` seconds.
    ///
    /// On a hit, `collision_time` is reduced to the time of contact.
    /// Candidates are visited in ascending id order.
    pub fn find_first_collision(
        &self,
        id: ObjectId,
        state: StateIndex,
        collision_time: &mut f32,
    ) -> Option<Contact> {
        let me_obj = self.get(id)?;
        let me = self.body(id, state)?;

        let mut delta = me.vel * *collision_time;
        let query = Rect::new(me.pos, me.pos + delta).expand(Point::new(me.radius, me.radius));

        let mut result = None;
        for candidate in self.find_objects(TypeMask::ALL, &query) {
            if candidate == id {
                continue;
            }
            let Some(other_obj) = self.get(candidate) else {
                continue;
            };
            if !other_obj.is_collision_enabled() {
                continue;
            }

            if let Some(poly) = other_obj.collision_poly() {
                let Some(hit) = polygon_swept_circle_intersect(poly, me.pos, delta, me.radius) else {
                    continue;
                };
                if (hit.point - me.pos).dot(me.vel) <= VELOCITY_EPSILON {
                    continue;
                }
                if !(me_obj.collide(other_obj) && other_obj.collide(me_obj)) {
                    continue;
                }
                delta *= hit.fraction;
                *collision_time *= hit.fraction;
                result = Some(Contact { object: candidate, point: hit.point });
                if *collision_time == 0.0 {
                    break;
                }
            } else if let Some(other) = self.body(candidate, state) {
                let p = me.pos - other.pos;
                if me.vel.dot(p) >= 0.0 {
                    continue;
                }
                let r = me.radius + other.radius;
                if p.len() <= r {
                    if !(me_obj.collide(other_obj) && other_obj.collide(me_obj)) {
                        continue;
                    }
                    *collision_time = 0.0;
                    delta = Point::ZERO;
                    result = Some(Contact { object: candidate, point: me.pos });
                } else {
                    let a = me.vel.dot(me.vel);
                    let b = 2.0 * p.dot(me.vel);
                    let c = p.dot(p) - r * r;
                    let Some(t) = find_lowest_root_in_interval(a, b, c, *collision_time) else {
                        continue;
                    };
                    if !(me_obj.collide(other_obj) && other_obj.collide(me_obj)) {
                        continue;
                    }
                    *collision_time = t;
                    delta = me.vel * t;
                    result = Some(Contact { object: candidate, point: me.pos + delta });
                }
            }
        }
        result
    }

    /// Reflects the velocity of `id` off a barrier touched at `contact`.
    pub fn resolve_barrier_collision(&mut self, id: ObjectId, state: StateIndex, contact: Point) {
        if let Some(mover) = self.get_mut(id).and_then(Movable::mover_mut) {
            let s = mover.state_mut(state);
            let normal = (s.pos - contact).normalize();
            s.vel -= normal * (BARRIER_ELASTICITY * normal.dot(s.vel));
        }
    }

    /// Applies the mass-weighted elastic impulse between two movers.
    pub fn resolve_mover_collision(&mut self, a: ObjectId, b: ObjectId, state: StateIndex) {
        let (Some(first), Some(second)) = (self.get(a).and_then(Movable::mover), self.get(b).and_then(Movable::mover))
        else {
            return;
        };
        let (s1, m1) = (*first.state(state), first.mass);
        let (s2, m2) = (*second.state(state), second.mass);

        let normal = (s2.pos - s1.pos).normalize();
        let v1i = s1.vel.dot(normal);
        let v2i = s2.vel.dot(normal);
        let (v1f, v2f) = elastic_response(m1, v1i, m2, v2i, MOVER_RESTITUTION);

        if let Some(mover) = self.get_mut(a).and_then(Movable::mover_mut) {
            mover.state_mut(state).vel += normal * (v1f - v1i);
        }
        if let Some(mover) = self.get_mut(b).and_then(Movable::mover_mut) {
            mover.state_mut(state).vel += normal * (v2f - v2i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elastic_response_heavier_moves_slower() {
        let (v1f, v2f) = elastic_response(1.0, 100.0, 2.0, -50.0, 0.9);
        assert!((v1f - -90.0).abs() < 1e-3);
        assert!((v2f - 45.0).abs() < 1e-3);
        assert!(v2f.abs() < v1f.abs());
        // momentum conserved
        assert!((1.0 * v1f + 2.0 * v2f).abs() < 1e-3);
    }

    #[test]
    fn test_elastic_response_equal_masses() {
        let (v1f, v2f) = elastic_response(1.0, 100.0, 1.0, 0.0, 0.9);
        assert!((v1f - 5.0).abs() < 1e-3);
        assert!((v2f - 95.0).abs() < 1e-3);
    }

    #[test]
    fn test_min_separation_time() {
        let t = compute_min_separation_time(
            Point::new(15.0, 0.0),
            10.0,
            Point::new(25.0, 0.0),
            Point::new(150.0, 0.0),
            10.0,
        )
        .unwrap();
        assert!((t - 1.0 / 15.0).abs() < 1e-4);

        assert!(compute_min_separation_time(Point::ZERO, 10.0, Point::new(5.0, 0.0), Point::ZERO, 10.0).is_none());
    }

    #[test]
    fn test_interpolation_snaps_when_idle() {
        let mut body = MoveObject::new(Point::ZERO, 10.0, 1.0);
        body.state_mut(StateIndex::Actual).pos = Point::new(50.0, 0.0);
        body.update_interpolation(32);
        assert_eq!(body.render().pos, Point::new(50.0, 0.0));
    }

    #[test]
    fn test_interpolation_chases_large_gap() {
        let mut body = MoveObject::new(Point::ZERO, 10.0, 1.0);
        body.state_mut(StateIndex::Actual).pos = Point::new(100.0, 0.0);
        body.interpolating = true;

        body.update_interpolation(32);
        let render = *body.render();
        // accel-limited: 1800 * 0.032 = 57.6 u/s, moved 57.6 * 0.032
        assert!((render.vel.x - 57.6).abs() < 1e-3);
        assert!((render.pos.x - 57.6 * 0.032).abs() < 1e-3);
        assert!(body.interpolating);

        for _ in 0..200 {
            body.update_interpolation(32);
        }
        assert!(!body.interpolating);
        assert_eq!(body.render().pos, body.actual().pos);
    }
}
