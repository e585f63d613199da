//! Barrier and goal zone updates: the outline is sent once.

use ghostwire_core::UpdateMask;
use ghostwire_shared::{BitStream, Point};

use super::UnpackOutcome;
use crate::error::NetResult;

/// Most vertices a replicated outline may have.
pub const MAX_POLYGON_POINTS: u32 = 64;

pub(super) fn pack(points: &[Point], mask: UpdateMask, stream: &mut BitStream) -> UpdateMask {
    if stream.write_flag(mask.contains(UpdateMask::INITIAL)) {
        let count = points.len().min(MAX_POLYGON_POINTS as usize);
        stream.write_ranged_u32(count as u32, 0, MAX_POLYGON_POINTS);
        for p in &points[..count] {
            stream.write_f32(p.x);
            stream.write_f32(p.y);
        }
    }
    UpdateMask::NONE
}

pub(super) fn unpack(points: &mut Vec<Point>, stream: &mut BitStream) -> NetResult<UnpackOutcome> {
    let initial = stream.read_flag()?;
    if initial {
        let count = stream.read_ranged_u32(0, MAX_POLYGON_POINTS)?;
        points.clear();
        for _ in 0..count {
            points.push(Point::new(stream.read_f32()?, stream.read_f32()?));
        }
    }
    Ok(UnpackOutcome {
        initial,
        ..UnpackOutcome::default()
    })
}
