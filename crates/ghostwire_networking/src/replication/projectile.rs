//! Projectile updates: the whole flight is described by the initial update.

use ghostwire_core::{Projectile, UpdateMask};
use ghostwire_shared::{BitStream, Point};

use super::{read_ghost_ref, write_ghost_ref, GhostContext, UnpackOutcome};
use crate::compression::{
    read_compressed_point, read_compressed_velocity, write_compressed_point, write_compressed_velocity,
};
use crate::error::NetResult;

const PROJECTILE_MAX_SPEED: u32 = 2047;

pub(super) fn pack(
    projectile: &Projectile,
    ctx: &dyn GhostContext,
    mask: UpdateMask,
    stream: &mut BitStream,
) -> UpdateMask {
    if stream.write_flag(mask.contains(UpdateMask::INITIAL)) {
        write_compressed_point(stream, projectile.pos, ctx.compression_reference());
        write_compressed_velocity(stream, projectile.vel, PROJECTILE_MAX_SPEED);
        // the shooter is only needed to skip it in line-of-sight tests, so an
        // unghosted shooter goes out as none and is not retried
        write_ghost_ref(stream, ctx, projectile.shooter);
    }
    stream.write_flag(projectile.collided);
    UpdateMask::NONE
}

pub(super) fn unpack(
    projectile: &mut Projectile,
    ctx: &dyn GhostContext,
    stream: &mut BitStream,
) -> NetResult<UnpackOutcome> {
    let initial = stream.read_flag()?;
    if initial {
        projectile.pos = read_compressed_point(stream, ctx.compression_reference())?;
        projectile.vel = read_compressed_velocity(stream, PROJECTILE_MAX_SPEED)?;
        projectile.shooter = read_ghost_ref(stream, ctx)?;
    }
    let collided = stream.read_flag()?;
    if collided && !projectile.collided {
        projectile.collided = true;
        projectile.vel = Point::ZERO;
    }
    Ok(UnpackOutcome {
        initial,
        ..UnpackOutcome::default()
    })
}
