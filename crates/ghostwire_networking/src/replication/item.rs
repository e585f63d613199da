//! Item updates. Mount and zone refer to other ghosts and are re-armed
//! until the remote end can resolve them.

use ghostwire_core::{Item, StateIndex, UpdateMask};
use ghostwire_shared::BitStream;

use super::{read_ghost_ref, write_ghost_ref, GhostContext, PositionUpdate, UnpackOutcome};
use crate::compression::{
    read_compressed_point, read_compressed_velocity, write_compressed_point, write_compressed_velocity,
};
use crate::error::NetResult;

const ITEM_MAX_SPEED: u32 = 511;

pub(super) fn pack(item: &Item, ctx: &dyn GhostContext, mask: UpdateMask, stream: &mut BitStream) -> UpdateMask {
    let mut residual = UpdateMask::NONE;

    if stream.write_flag(mask.contains(UpdateMask::INITIAL)) {
        stream.write_flag(item.collideable);
    }

    if stream.write_flag(mask.contains(UpdateMask::POSITION)) {
        let actual = item.mover.actual();
        stream.write_flag(mask.contains(UpdateMask::WARP_POSITION));
        write_compressed_point(stream, actual.pos, ctx.compression_reference());
        write_compressed_velocity(stream, actual.vel, ITEM_MAX_SPEED);
    }

    if stream.write_flag(mask.contains(UpdateMask::MOUNT))
        && stream.write_flag(item.mounted)
        && !write_ghost_ref(stream, ctx, item.mount)
    {
        residual |= UpdateMask::MOUNT;
    }

    if stream.write_flag(mask.contains(UpdateMask::ZONE))
        && stream.write_flag(item.zone.is_some())
        && !write_ghost_ref(stream, ctx, item.zone)
    {
        residual |= UpdateMask::ZONE;
    }

    residual
}

pub(super) fn unpack(item: &mut Item, ctx: &dyn GhostContext, stream: &mut BitStream) -> NetResult<UnpackOutcome> {
    let mut outcome = UnpackOutcome {
        initial: stream.read_flag()?,
        ..UnpackOutcome::default()
    };
    if outcome.initial {
        item.collideable = stream.read_flag()?;
    }

    if stream.read_flag()? {
        let warp = stream.read_flag()?;
        let pos = read_compressed_point(stream, ctx.compression_reference())?;
        let vel = read_compressed_velocity(stream, ITEM_MAX_SPEED)?;
        let actual = item.mover.state_mut(StateIndex::Actual);
        actual.pos = pos;
        actual.vel = vel;
        outcome.position = Some(if outcome.initial || warp {
            PositionUpdate::Snap
        } else {
            PositionUpdate::Interpolate
        });
    }

    if stream.read_flag()? {
        if stream.read_flag()? {
            if let Some(carrier) = read_ghost_ref(stream, ctx)? {
                outcome.mount = Some(Some(carrier));
            }
        } else {
            outcome.mount = Some(None);
        }
    }

    if stream.read_flag()? {
        if stream.read_flag()? {
            if let Some(zone) = read_ghost_ref(stream, ctx)? {
                outcome.zone = Some(Some(zone));
            }
        } else {
            outcome.zone = Some(None);
        }
    }

    Ok(outcome)
}
