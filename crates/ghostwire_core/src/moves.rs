//! # Moves
//!
//! A [`Move`] is one tick of player input. Moves are the only thing the
//! controlled side sends to the controller, and the only thing prediction
//! replay feeds back through the simulation.
//!
//! ## Wire format
//!
//! ```text
//! [same-as-prev:1]
//!   if 0: [left:4][right:4][up:4][down:4][angle:12][fire:1][boost:1][shield:1]
//! [time: ranged 0..=127]   (only when packing time)
//! ```
//!
//! Directional inputs and the angle are quantized on the wire. Call
//! [`Move::prepare`] before simulating a locally generated move so both
//! endpoints simulate exactly the same values.

use std::f32::consts::TAU;

use ghostwire_shared::{BitStream, StreamResult};

/// Largest duration a single move may cover, in milliseconds.
pub const MAX_MOVE_TIME: u32 = 127;

/// Default move duration in milliseconds.
pub const DEFAULT_MOVE_TIME: u32 = 32;

const DIRECTION_BITS: u32 = 4;
const ANGLE_BITS: u32 = 12;
const ANGLE_MAX: u32 = (1 << ANGLE_BITS) - 1;

/// One sampled input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Move {
    /// Leftward thrust, `0.0..=1.0`.
    pub left: f32,
    /// Rightward thrust, `0.0..=1.0`.
    pub right: f32,
    /// Upward thrust, `0.0..=1.0`.
    pub up: f32,
    /// Downward thrust, `0.0..=1.0`.
    pub down: f32,
    /// Facing angle in radians.
    pub angle: f32,
    /// Fire held.
    pub fire: bool,
    /// Boost held.
    pub boost: bool,
    /// Shield held.
    pub shield: bool,
    /// Duration covered, in milliseconds (`<= MAX_MOVE_TIME`).
    pub time: u32,
}

impl Move {
    /// An idle move of the default duration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            left: 0.0,
            right: 0.0,
            up: 0.0,
            down: 0.0,
            angle: 0.0,
            fire: false,
            boost: false,
            shield: false,
            time: DEFAULT_MOVE_TIME,
        }
    }

    /// True when every input matches `other`. Duration is ignored.
    #[must_use]
    pub fn is_equal_move(&self, other: &Self) -> bool {
        self.left == other.left
            && self.right == other.right
            && self.up == other.up
            && self.down == other.down
            && self.angle == other.angle
            && self.fire == other.fire
            && self.boost == other.boost
            && self.shield == other.shield
    }

    /// Writes the move, omitting the inputs when they equal `prev`.
    pub fn pack(&self, stream: &mut BitStream, prev: Option<&Self>, pack_time: bool) {
        let same = prev.is_some_and(|p| self.is_equal_move(p));
        if !stream.write_flag(same) {
            stream.write_float(self.left, DIRECTION_BITS);
            stream.write_float(self.right, DIRECTION_BITS);
            stream.write_float(self.up, DIRECTION_BITS);
            stream.write_float(self.down, DIRECTION_BITS);
            stream.write_int(angle_to_wire(self.angle), ANGLE_BITS);
            stream.write_flag(self.fire);
            stream.write_flag(self.boost);
            stream.write_flag(self.shield);
        }
        if pack_time {
            stream.write_ranged_u32(self.time.min(MAX_MOVE_TIME), 0, MAX_MOVE_TIME);
        }
    }

    /// Reads a move written by [`Move::pack`] against the same `prev`.
    ///
    /// Without `unpack_time` the duration is inherited from `prev`.
    ///
    /// # Errors
    ///
    /// Propagates stream underruns.
    pub fn unpack(stream: &mut BitStream, prev: &Self, unpack_time: bool) -> StreamResult<Self> {
        let mut m = *prev;
        if !stream.read_flag()? {
            m.left = stream.read_float(DIRECTION_BITS)?;
            m.right = stream.read_float(DIRECTION_BITS)?;
            m.up = stream.read_float(DIRECTION_BITS)?;
            m.down = stream.read_float(DIRECTION_BITS)?;
            m.angle = wire_to_angle(stream.read_int(ANGLE_BITS)?);
            m.fire = stream.read_flag()?;
            m.boost = stream.read_flag()?;
            m.shield = stream.read_flag()?;
        }
        if unpack_time {
            m.time = stream.read_ranged_u32(0, MAX_MOVE_TIME)?;
        }
        Ok(m)
    }

    /// Quantizes the move to exactly what the other endpoint will decode.
    pub fn prepare(&mut self) {
        let mut stream = BitStream::new();
        self.pack(&mut stream, None, true);
        stream.set_bit_position(0);
        if let Ok(quantized) = Self::unpack(&mut stream, self, true) {
            *self = quantized;
        }
    }
}

impl Default for Move {
    fn default() -> Self {
        Self::new()
    }
}

fn angle_to_wire(angle: f32) -> u32 {
    let mut unit = angle / TAU;
    if !(0.0..=1.0).contains(&unit) {
        unit = unit.rem_euclid(1.0);
    }
    ((unit * ANGLE_MAX as f32).round() as u32).min(ANGLE_MAX)
}

fn wire_to_angle(value: u32) -> f32 {
    value as f32 / ANGLE_MAX as f32 * TAU
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_move() -> Move {
        Move {
            left: 0.0,
            right: 0.73,
            up: 1.0,
            down: 0.2,
            angle: 2.5,
            fire: true,
            boost: false,
            shield: true,
            time: 45,
        }
    }

    #[test]
    fn test_prepared_move_round_trips() {
        let mut m = sample_move();
        m.prepare();

        let mut stream = BitStream::new();
        m.pack(&mut stream, None, true);
        stream.set_bit_position(0);
        let decoded = Move::unpack(&mut stream, &Move::new(), true).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let mut once = sample_move();
        once.prepare();
        let mut twice = once;
        twice.prepare();
        assert_eq!(once, twice);
        assert!((once.right - 0.73).abs() < 1.0 / 15.0);
    }

    #[test]
    fn test_equal_move_is_one_bit_plus_time() {
        let mut a = sample_move();
        a.prepare();
        let mut b = a;
        b.time = 12;

        let mut stream = BitStream::new();
        b.pack(&mut stream, Some(&a), true);
        assert_eq!(stream.bit_position(), 1 + 7);

        stream.set_bit_position(0);
        let decoded = Move::unpack(&mut stream, &a, true).unwrap();
        assert_eq!(decoded, b);
    }

    #[test]
    fn test_time_excluded_without_pack_time() {
        let mut m = sample_move();
        m.prepare();

        let mut stream = BitStream::new();
        m.pack(&mut stream, None, false);
        stream.set_bit_position(0);
        let prev = Move::new();
        let decoded = Move::unpack(&mut stream, &prev, false).unwrap();
        assert_eq!(decoded.time, prev.time);
        assert!(decoded.is_equal_move(&m));
    }

    #[test]
    fn test_negative_angle_wraps() {
        let mut m = Move { angle: -std::f32::consts::FRAC_PI_2, ..Move::new() };
        m.prepare();
        assert!((m.angle - 1.5 * std::f32::consts::PI).abs() < 0.01);
    }

    #[test]
    fn test_time_is_capped() {
        let mut m = Move { time: 500, ..Move::new() };
        m.prepare();
        assert_eq!(m.time, MAX_MOVE_TIME);
    }
}
