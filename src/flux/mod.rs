//! # Flux store
//!
//! Per-axis, per-face face-flux arrays: the conservation correction shipped
//! to coarser neighbors whenever a same/fine-level interface also carries
//! flux data.

use crate::error::{RefreshError, Result};

pub type FluxFieldId = usize;

/// One face's flux array for one field: a `rank-1`-dimensional array of
/// values, row-major with the first tangential axis fastest-varying.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FaceFlux {
    /// Tangential shape of this face (degenerate axes as `1`).
    pub shape: [i32; 2],
    pub values: Vec<f64>,
}

impl FaceFlux {
    pub fn zeros(shape: [i32; 2]) -> Self {
        FaceFlux {
            shape,
            values: vec![0.0; (shape[0] * shape[1]) as usize],
        }
    }
}

/// The flux storage interface the refresh subsystem is handed by a host
/// block: per-axis, per-face arrays that accumulate correction fluxes from
/// finer neighbors.
pub trait FluxStore {
    fn flux_field_ids(&self) -> Vec<FluxFieldId>;
    /// The face-flux array for `field` on the face in direction `face`
    /// (only `face`'s nonzero axis and sign matter — this is a face, not an
    /// edge or corner quantity).
    fn face_flux(&self, field: FluxFieldId, face: [i32; 3]) -> Result<&FaceFlux>;
    fn face_flux_mut(&mut self, field: FluxFieldId, face: [i32; 3]) -> Result<&mut FaceFlux>;
}

/// In-memory reference [`FluxStore`]: one [`FaceFlux`] per `(field, face)`
/// pair, keyed by the face vector directly (sufficient for a store that
/// never needs edge/corner fluxes).
#[derive(Default)]
pub struct FaceFluxStore {
    faces: std::collections::BTreeMap<(FluxFieldId, [i32; 3]), FaceFlux>,
}

impl FaceFluxStore {
    pub fn new() -> Self {
        FaceFluxStore {
            faces: std::collections::BTreeMap::new(),
        }
    }

    pub fn set_face(&mut self, field: FluxFieldId, face: [i32; 3], flux: FaceFlux) {
        self.faces.insert((field, face), flux);
    }
}

impl FluxStore for FaceFluxStore {
    fn flux_field_ids(&self) -> Vec<FluxFieldId> {
        let mut ids: Vec<_> = self.faces.keys().map(|(f, _)| *f).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn face_flux(&self, field: FluxFieldId, face: [i32; 3]) -> Result<&FaceFlux> {
        self.faces
            .get(&(field, face))
            .ok_or(RefreshError::UnknownStoreId(field))
    }

    fn face_flux_mut(&mut self, field: FluxFieldId, face: [i32; 3]) -> Result<&mut FaceFlux> {
        self.faces
            .get_mut(&(field, face))
            .ok_or(RefreshError::UnknownStoreId(field))
    }
}

/// Halves each non-degenerate axis of a fine face's tangential shape to get
/// the coarse shape it reduces into (an axis already `1` — a rank below 3
/// collapsing a tangential direction — stays `1`).
pub fn coarse_tangential_shape(fine_shape: [i32; 2]) -> [i32; 2] {
    [
        if fine_shape[0] > 1 { fine_shape[0] / 2 } else { 1 },
        if fine_shape[1] > 1 { fine_shape[1] / 2 } else { 1 },
    ]
}

/// Coarsens a fine-side face-flux array into `coarse_shape` (this sender's
/// own reduced contribution, from [`coarse_tangential_shape`]), averaging
/// each `2x2` (or `2x1`/`1x1` in lower rank) sub-face block. Where this
/// contribution lands within a coarse face shared by several fine children
/// is not decided here — see [`accumulate_face_flux`]'s `child` parameter.
pub fn coarsen_face_flux(fine: &FaceFlux, coarse_shape: [i32; 2]) -> Result<FaceFlux> {
    let rx = if coarse_shape[0] > 0 { fine.shape[0] / coarse_shape[0].max(1) } else { 1 };
    let ry = if coarse_shape[1] > 0 { fine.shape[1] / coarse_shape[1].max(1) } else { 1 };
    if rx == 0 || ry == 0 || fine.shape[0] != coarse_shape[0] * rx || fine.shape[1] != coarse_shape[1] * ry {
        return Err(RefreshError::PaddedGeometryMismatch {
            incoming: [fine.shape[0], fine.shape[1], 0],
            staged: [coarse_shape[0], coarse_shape[1], 0],
        });
    }
    let mut out = FaceFlux::zeros(coarse_shape);
    let count = (rx * ry) as f64;
    for cy in 0..coarse_shape[1] {
        for cx in 0..coarse_shape[0] {
            let mut sum = 0.0;
            for oy in 0..ry {
                for ox in 0..rx {
                    let fx = cx * rx + ox;
                    let fy = cy * ry + oy;
                    sum += fine.values[(fx + fine.shape[0] * fy) as usize];
                }
            }
            out.values[(cx + coarse_shape[0] * cy) as usize] = sum / count;
        }
    }
    Ok(out)
}

/// Accumulates `incoming` (one fine child's coarsened contribution) into
/// `dst` (the full coarse face, shared by every child tiling it — several
/// fine children at a resolution jump coarsen into disjoint sub-regions of
/// the same coarse face, per spec.md's multi-child interface case) by
/// addition, per §4.6's "receiver accumulates" rule. `dst` and `incoming`
/// may differ in shape along axes the coarse face tiles more than one
/// child across; `child`'s components select which tile `incoming` lands
/// at along those axes, and must be `0` along any axis where `dst` and
/// `incoming` already match.
pub fn accumulate_face_flux(dst: &mut FaceFlux, incoming: &FaceFlux, child: [i32; 2]) -> Result<()> {
    let mut offset = [0i32; 2];
    for axis in 0..2 {
        let fine_len = incoming.shape[axis];
        let coarse_len = dst.shape[axis];
        if fine_len <= 0 || coarse_len % fine_len != 0 {
            return Err(RefreshError::PaddedGeometryMismatch {
                incoming: [incoming.shape[0], incoming.shape[1], 0],
                staged: [dst.shape[0], dst.shape[1], 0],
            });
        }
        let tiles = coarse_len / fine_len;
        if child[axis] < 0 || child[axis] >= tiles {
            return Err(RefreshError::InvalidChild([child[0], child[1], 0]));
        }
        offset[axis] = child[axis] * fine_len;
    }
    for fy in 0..incoming.shape[1] {
        for fx in 0..incoming.shape[0] {
            let dx = offset[0] + fx;
            let dy = offset[1] + fy;
            let d_idx = (dx + dst.shape[0] * dy) as usize;
            let s_idx = (fx + incoming.shape[0] * fy) as usize;
            dst.values[d_idx] += incoming.values[s_idx];
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarse_tangential_shape_halves_non_degenerate_axes() {
        assert_eq!(coarse_tangential_shape([8, 8]), [4, 4]);
        assert_eq!(coarse_tangential_shape([8, 1]), [4, 1]);
        assert_eq!(coarse_tangential_shape([1, 1]), [1, 1]);
    }

    #[test]
    fn coarsen_averages_each_2x2_block() {
        let fine = FaceFlux {
            shape: [4, 4],
            values: vec![1.0; 16],
        };
        let coarse = coarsen_face_flux(&fine, [2, 2]).unwrap();
        assert_eq!(coarse.values, vec![1.0; 4]);
    }

    #[test]
    fn coarsen_is_conservative_in_sum() {
        let fine = FaceFlux {
            shape: [2, 2],
            values: vec![1.0, 2.0, 3.0, 4.0],
        };
        let coarse = coarsen_face_flux(&fine, [1, 1]).unwrap();
        let fine_sum: f64 = fine.values.iter().sum::<f64>() / 4.0;
        assert_eq!(coarse.values[0], fine_sum);
    }

    #[test]
    fn accumulate_adds_in_place_when_shapes_already_match() {
        let mut dst = FaceFlux::zeros([2, 2]);
        dst.values = vec![1.0, 1.0, 1.0, 1.0];
        let incoming = FaceFlux {
            shape: [2, 2],
            values: vec![2.0, 2.0, 2.0, 2.0],
        };
        accumulate_face_flux(&mut dst, &incoming, [0, 0]).unwrap();
        assert_eq!(dst.values, vec![3.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn mismatched_shapes_reject_accumulate_when_not_a_clean_tiling() {
        let mut dst = FaceFlux::zeros([2, 2]);
        let incoming = FaceFlux::zeros([3, 1]);
        assert!(accumulate_face_flux(&mut dst, &incoming, [0, 0]).is_err());
    }

    #[test]
    fn accumulate_rejects_a_child_index_outside_the_tiling() {
        let mut dst = FaceFlux::zeros([2, 1]);
        let incoming = FaceFlux::zeros([1, 1]);
        assert!(accumulate_face_flux(&mut dst, &incoming, [2, 0]).is_err());
    }

    /// Two fine children sharing one coarse face (spec.md's "8 children on
    /// A's +x face" case, reduced to 2 along one tangential axis here) must
    /// land at distinct, non-colliding halves of the coarse array, not be
    /// summed on top of each other.
    #[test]
    fn accumulate_places_each_child_at_its_own_offset() {
        let mut dst = FaceFlux::zeros([2, 1]);
        let child0 = FaceFlux {
            shape: [1, 1],
            values: vec![5.0],
        };
        let child1 = FaceFlux {
            shape: [1, 1],
            values: vec![9.0],
        };
        accumulate_face_flux(&mut dst, &child0, [0, 0]).unwrap();
        accumulate_face_flux(&mut dst, &child1, [1, 0]).unwrap();
        assert_eq!(dst.values, vec![5.0, 9.0]);
    }

    #[test]
    fn accumulating_both_coarsened_children_of_a_shared_face_matches_direct_coarsening() {
        // A [4,1]-shaped fine face split into two [2,1] children, coarsened
        // and accumulated into a [2,1] coarse face, must equal coarsening
        // the whole fine face directly in one shot.
        let fine = FaceFlux {
            shape: [4, 1],
            values: vec![1.0, 2.0, 3.0, 4.0],
        };
        let whole = coarsen_face_flux(&fine, [2, 1]).unwrap();

        let left = FaceFlux {
            shape: [2, 1],
            values: fine.values[0..2].to_vec(),
        };
        let right = FaceFlux {
            shape: [2, 1],
            values: fine.values[2..4].to_vec(),
        };
        let coarse_left = coarsen_face_flux(&left, [1, 1]).unwrap();
        let coarse_right = coarsen_face_flux(&right, [1, 1]).unwrap();

        let mut dst = FaceFlux::zeros([2, 1]);
        accumulate_face_flux(&mut dst, &coarse_left, [0, 0]).unwrap();
        accumulate_face_flux(&mut dst, &coarse_right, [1, 0]).unwrap();
        assert_eq!(dst.values, whole.values);
    }
}
