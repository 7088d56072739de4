//! Padded-prolongation message assembly (spec §4.4).
//!
//! When a prolong operator's padding is positive, the coarse-side source
//! region for a fine receiver's ghost needs cells beyond the direct sender's
//! own half of the interface — cells that would ordinarily come from the
//! sender's same-level tangential neighbors. Those neighbors already keep
//! the sender's own ghost zone current (every ordinary same-level refresh
//! mirrors their interior data into it), so as long as the padding does not
//! exceed the sender's own ghost depth, the direct sender can source its
//! entire padded footprint from its own array without a second message. This
//! module implements the two-sided accounting spec §4.4 step 3 describes:
//! which same-level tangential neighbors the protocol counts as "extra"
//! contributors (`count_extra_messages`), the precondition that makes
//! self-sourcing valid (`padding_fits_ghost_depth`), and the bundle of
//! per-field contributions one padded message carries
//! (`send_extra_contributions`). `prolong_and_crop` undoes the widening on
//! the receiving side once a padded stage is complete.

use crate::error::{RefreshError, Result};
use crate::field::{pack_fields, pack_region, FieldStore};
use crate::geometry::{Face, Region};
use crate::iter::extra_candidates;
use crate::mesh::NeighborInfo;
use crate::prolong_restrict::ProlongRestrict;
use crate::refresh::message::PaddedFaceMsg;

/// Validates that `padding` fits inside the sender's own ghost depth along
/// every axis tangential to `face` — the precondition under which the
/// direct sender's own (ghost-mirrored) array already covers its whole
/// padded footprint, so no genuinely separate message from an "extra"
/// contributor is needed.
pub fn padding_fits_ghost_depth(padding: i32, face: Face, g3: [i32; 3]) -> Result<()> {
    for axis in 0..3 {
        if face[axis] == 0 && padding > g3[axis] {
            return Err(RefreshError::PaddingExceedsGhostDepth { padding, ghost_depth: g3 });
        }
    }
    Ok(())
}

/// Same-level tangential neighbors of `direct` that the two-sided protocol
/// counts as "extra" contributors to `direct`'s padded footprint (spec §4.4
/// step 3). Their data is never fetched separately:
/// `padding_fits_ghost_depth` guarantees it is already mirrored into the
/// direct sender's own ghost zone by ordinary same-level refreshes.
pub fn count_extra_messages(neighbors: &[NeighborInfo], direct: &NeighborInfo) -> usize {
    extra_candidates(neighbors, direct).len()
}

/// Builds one padded-prolongation message's field-pair contributions: packs
/// `pairs` over `send_region` (the widened coarse source region
/// `BoxRegion::padded_send_limits` computed), one [`PaddedFaceMsg`] per
/// pair, each filling the whole staging array (`region` spans `send_region`'s
/// own size) since the direct sender's widened array already folds in every
/// extra contributor counted by `count_extra_messages`.
pub fn send_extra_contributions(
    store: &dyn FieldStore,
    pairs: &[(usize, usize)],
    accumulate: bool,
    relative_level: i32,
    prolong_restrict: &dyn ProlongRestrict,
    send_region: Region,
) -> Result<Vec<PaddedFaceMsg>> {
    let field_msgs = pack_fields(store, pairs, accumulate, relative_level, prolong_restrict, send_region)?;
    let region = Region {
        lo: [0, 0, 0],
        hi: send_region.size(),
    };
    Ok(field_msgs.into_iter().map(|field| PaddedFaceMsg { field, region }).collect())
}

fn axis_ratio(num: i32, den: i32) -> Result<i32> {
    if den <= 0 || num % den != 0 {
        return Err(RefreshError::PaddedGeometryMismatch {
            incoming: [num, 0, 0],
            staged: [den, 0, 0],
        });
    }
    Ok(num / den)
}

/// Converts a fully-staged padded array into the exact `recv_shape`-sized
/// buffer ready to unpack at the receiver's real ghost region.
/// `ProlongRestrict::prolong_apply` only ever relates two buffers by an
/// exact integer ratio per axis, and the padded array's widened size is not
/// itself an integer multiple of the receiver's ghost-strip size — so this
/// prolongs at the same ratio an unpadded transfer would use (inferred from
/// the unpadded source size, `stage_shape` minus the padding on each
/// tangential axis), then crops the widened result back down to
/// `recv_shape`, dropping exactly the padded margin.
pub fn prolong_and_crop(
    prolong_restrict: &dyn ProlongRestrict,
    staged: &[f64],
    stage_shape: [i32; 3],
    recv_shape: [i32; 3],
    face: Face,
    rank: usize,
    padding: i32,
) -> Result<Vec<f64>> {
    let mut widened = [1i32; 3];
    let mut crop_lo = [0i32; 3];
    for axis in 0..3 {
        if axis >= rank || face[axis] != 0 {
            widened[axis] = recv_shape[axis];
            crop_lo[axis] = 0;
        } else {
            let unpadded = stage_shape[axis] - 2 * padding;
            let ratio = axis_ratio(recv_shape[axis], unpadded)?;
            widened[axis] = stage_shape[axis] * ratio;
            crop_lo[axis] = padding * ratio;
        }
    }
    let prolonged = prolong_restrict.prolong_apply(staged, stage_shape, widened)?;
    let region = Region {
        lo: crop_lo,
        hi: [
            crop_lo[0] + recv_shape[0],
            crop_lo[1] + recv_shape[1],
            crop_lo[2] + recv_shape[2],
        ],
    };
    Ok(pack_region(&prolonged, widened, region))
}
