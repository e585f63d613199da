//! Ship updates.

use std::f32::consts::TAU;

use ghostwire_core::ship::BOOST_MAX_VELOCITY;
use ghostwire_core::{Move, ObjectId, Ship, StateIndex, UpdateMask};
use ghostwire_shared::{BitStream, Point};

use super::{GhostContext, PositionUpdate, UnpackOutcome};
use crate::compression::{
    read_compressed_point, read_compressed_velocity, write_compressed_point, write_compressed_velocity,
};
use crate::error::NetResult;

const HEALTH_BITS: u32 = 6;
const ANGLE_BITS: u32 = 8;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
const SHIP_MAX_SPEED: u32 = BOOST_MAX_VELOCITY as u32 + 1;

pub(super) fn pack(
    id: ObjectId,
    ship: &Ship,
    current_move: &Move,
    ctx: &dyn GhostContext,
    mask: UpdateMask,
    stream: &mut BitStream,
) -> UpdateMask {
    let initial = stream.write_flag(mask.contains(UpdateMask::INITIAL));

    if stream.write_flag(mask.contains(UpdateMask::EXPLOSION)) {
        stream.write_flag(ship.exploded);
    }
    if stream.write_flag(mask.contains(UpdateMask::HEALTH)) {
        stream.write_float(ship.health, HEALTH_BITS);
    }
    if stream.write_flag(mask.contains(UpdateMask::POWERS)) {
        stream.write_flag(ship.boost_active);
        stream.write_flag(ship.shield_active);
    }

    // The controlling client predicts its own ship; it gets corrections
    // through the control state instead.
    if stream.write_flag(!initial && ctx.is_controlling(id)) {
        return UpdateMask::NONE;
    }

    if stream.write_flag(mask.contains(UpdateMask::POSITION)) {
        let actual = ship.mover.actual();
        stream.write_flag(mask.contains(UpdateMask::WARP_POSITION));
        write_compressed_point(stream, actual.pos, ctx.compression_reference());
        write_compressed_velocity(stream, actual.vel, SHIP_MAX_SPEED);
        stream.write_float(actual.angle.rem_euclid(TAU) / TAU, ANGLE_BITS);
    }
    if stream.write_flag(mask.contains(UpdateMask::MOVE)) {
        current_move.pack(stream, None, false);
    }
    UpdateMask::NONE
}

pub(super) fn unpack(
    ship: &mut Ship,
    current_move: &mut Move,
    ctx: &dyn GhostContext,
    stream: &mut BitStream,
) -> NetResult<UnpackOutcome> {
    let mut outcome = UnpackOutcome {
        initial: stream.read_flag()?,
        ..UnpackOutcome::default()
    };

    if stream.read_flag()? {
        ship.exploded = stream.read_flag()?;
        if ship.exploded {
            ship.mover.state_mut(StateIndex::Actual).vel = Point::ZERO;
            outcome.position = Some(PositionUpdate::Snap);
        }
    }
    if stream.read_flag()? {
        ship.health = stream.read_float(HEALTH_BITS)?;
    }
    if stream.read_flag()? {
        ship.boost_active = stream.read_flag()?;
        ship.shield_active = stream.read_flag()?;
    }

    if stream.read_flag()? {
        return Ok(outcome);
    }

    if stream.read_flag()? {
        let warp = stream.read_flag()?;
        let pos = read_compressed_point(stream, ctx.compression_reference())?;
        let vel = read_compressed_velocity(stream, SHIP_MAX_SPEED)?;
        let angle = stream.read_float(ANGLE_BITS)? * TAU;

        let actual = ship.mover.state_mut(StateIndex::Actual);
        actual.pos = pos;
        actual.vel = vel;
        actual.angle = angle;

        outcome.position = Some(if outcome.initial || warp || ship.exploded {
            PositionUpdate::Snap
        } else {
            PositionUpdate::Interpolate
        });
    }
    if stream.read_flag()? {
        *current_move = Move::unpack(stream, current_move, false)?;
    }
    Ok(outcome)
}
