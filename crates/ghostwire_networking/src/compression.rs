//! # Compressed Points and Velocities
//!
//! Positions near the control object are sent as integer offsets from a
//! reference point both ends agree on. Anything outside the visibility
//! window, or any packet without an agreed reference, falls back to raw
//! floats.
//!
//! ```text
//! relative:  [1] [dx + W : ranged 0..2W] [dy + H : ranged 0..2H]
//! absolute:  [0] [x : f32] [y : f32]
//! no frame:      [x : f32] [y : f32]
//!
//! velocity:  [zero?] ─ 1 ─► done
//!              0
//!            [overflow?] ─ 1 ─► [vx : f32] [vy : f32]
//!              0
//!            [angle : 10 bits] [speed : ranged 0..max]
//! ```

use std::f32::consts::TAU;

use ghostwire_shared::{BitStream, Point, StreamResult};

/// Horizontal half-extent of what a player can see.
pub const PLAYER_VISUAL_DISTANCE_HORIZONTAL: u32 = 600;

/// Vertical half-extent of what a player can see.
pub const PLAYER_VISUAL_DISTANCE_VERTICAL: u32 = 450;

/// Extra margin around the visible area that is still scoped.
pub const PLAYER_SCOPE_MARGIN: u32 = 150;

/// Half-width of the relative encoding window.
pub const COMPRESS_WINDOW_X: u32 = PLAYER_VISUAL_DISTANCE_HORIZONTAL + PLAYER_SCOPE_MARGIN;

/// Half-height of the relative encoding window.
pub const COMPRESS_WINDOW_Y: u32 = PLAYER_VISUAL_DISTANCE_VERTICAL + PLAYER_SCOPE_MARGIN;

/// Bits used for the direction of a compressed velocity.
pub const VELOCITY_ANGLE_BITS: u32 = 10;

/// Writes `p`, relative to `reference` when one is agreed and `p` is close enough.
pub fn write_compressed_point(stream: &mut BitStream, p: Point, reference: Option<Point>) {
    let Some(reference) = reference else {
        stream.write_f32(p.x);
        stream.write_f32(p.y);
        return;
    };

    let delta = p - reference;
    let in_window =
        delta.x.abs() <= COMPRESS_WINDOW_X as f32 && delta.y.abs() <= COMPRESS_WINDOW_Y as f32;
    if stream.write_flag(in_window) {
        stream.write_ranged_u32(to_window(delta.x, COMPRESS_WINDOW_X), 0, 2 * COMPRESS_WINDOW_X);
        stream.write_ranged_u32(to_window(delta.y, COMPRESS_WINDOW_Y), 0, 2 * COMPRESS_WINDOW_Y);
    } else {
        stream.write_f32(p.x);
        stream.write_f32(p.y);
    }
}

/// Reads a point written by [`write_compressed_point`] with the same `reference`.
///
/// # Errors
///
/// Propagates stream underruns.
pub fn read_compressed_point(stream: &mut BitStream, reference: Option<Point>) -> StreamResult<Point> {
    let Some(reference) = reference else {
        return Ok(Point::new(stream.read_f32()?, stream.read_f32()?));
    };

    if stream.read_flag()? {
        let dx = stream.read_ranged_u32(0, 2 * COMPRESS_WINDOW_X)? as f32 - COMPRESS_WINDOW_X as f32;
        let dy = stream.read_ranged_u32(0, 2 * COMPRESS_WINDOW_Y)? as f32 - COMPRESS_WINDOW_Y as f32;
        Ok(reference + Point::new(dx, dy))
    } else {
        Ok(Point::new(stream.read_f32()?, stream.read_f32()?))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_window(offset: f32, half: u32) -> u32 {
    let shifted = (offset + half as f32).round();
    (shifted.max(0.0) as u32).min(2 * half)
}

/// Writes `vel` as direction plus speed, or raw floats above `max_speed`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn write_compressed_velocity(stream: &mut BitStream, vel: Point, max_speed: u32) {
    let speed = vel.len();
    if stream.write_flag(speed < 0.5) {
        return;
    }
    if stream.write_flag(speed > max_speed as f32) {
        stream.write_f32(vel.x);
        stream.write_f32(vel.y);
        return;
    }
    let theta = vel.angle().rem_euclid(TAU);
    stream.write_float(theta / TAU, VELOCITY_ANGLE_BITS);
    stream.write_ranged_u32((speed.round() as u32).min(max_speed), 0, max_speed);
}

/// Reads a velocity written by [`write_compressed_velocity`] with the same `max_speed`.
///
/// # Errors
///
/// Propagates stream underruns.
pub fn read_compressed_velocity(stream: &mut BitStream, max_speed: u32) -> StreamResult<Point> {
    if stream.read_flag()? {
        return Ok(Point::ZERO);
    }
    if stream.read_flag()? {
        return Ok(Point::new(stream.read_f32()?, stream.read_f32()?));
    }
    let theta = stream.read_float(VELOCITY_ANGLE_BITS)? * TAU;
    let speed = stream.read_ranged_u32(0, max_speed)? as f32;
    Ok(Point::from_angle(theta) * speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewind(mut stream: BitStream) -> BitStream {
        stream.set_bit_position(0);
        stream
    }

    #[test]
    fn test_relative_point_is_rounded_offset() {
        let reference = Point::new(1000.0, -200.0);
        let mut stream = BitStream::new();
        write_compressed_point(&mut stream, Point::new(1100.4, -250.6), Some(reference));
        let bits = stream.bit_len();
        let mut stream = rewind(stream);
        let p = read_compressed_point(&mut stream, Some(reference)).unwrap();
        assert_eq!(p, Point::new(1100.0, -251.0));
        // flag plus two ranged offsets, far below two raw floats
        assert!(bits < 64);
    }

    #[test]
    fn test_point_outside_window_is_raw() {
        let reference = Point::ZERO;
        let far = Point::new(5000.25, 3.5);
        let mut stream = BitStream::new();
        write_compressed_point(&mut stream, far, Some(reference));
        assert_eq!(stream.bit_len(), 65);
        let mut stream = rewind(stream);
        assert_eq!(read_compressed_point(&mut stream, Some(reference)).unwrap(), far);
    }

    #[test]
    fn test_point_without_frame_has_no_mode_flag() {
        let p = Point::new(12.5, -7.25);
        let mut stream = BitStream::new();
        write_compressed_point(&mut stream, p, None);
        assert_eq!(stream.bit_len(), 64);
        let mut stream = rewind(stream);
        assert_eq!(read_compressed_point(&mut stream, None).unwrap(), p);
    }

    #[test]
    fn test_zero_velocity_is_one_bit() {
        let mut stream = BitStream::new();
        write_compressed_velocity(&mut stream, Point::ZERO, 511);
        assert_eq!(stream.bit_len(), 1);
        let mut stream = rewind(stream);
        assert_eq!(read_compressed_velocity(&mut stream, 511).unwrap(), Point::ZERO);
    }

    #[test]
    fn test_polar_velocity_is_close() {
        let vel = Point::new(-120.0, 90.0);
        let mut stream = BitStream::new();
        write_compressed_velocity(&mut stream, vel, 511);
        let mut stream = rewind(stream);
        let decoded = read_compressed_velocity(&mut stream, 511).unwrap();
        assert!((decoded.len() - 150.0).abs() < 1e-3);
        // 10-bit angle: within one step of 2*pi/1024 radians
        assert!((decoded.angle() - vel.angle()).abs() < TAU / 1024.0);
    }

    #[test]
    fn test_overflow_velocity_is_exact() {
        let vel = Point::new(900.0, -10.5);
        let mut stream = BitStream::new();
        write_compressed_velocity(&mut stream, vel, 511);
        let mut stream = rewind(stream);
        assert_eq!(read_compressed_velocity(&mut stream, 511).unwrap(), vel);
    }
}
