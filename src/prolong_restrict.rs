//! # Prolongation and restriction operators
//!
//! The refresh subsystem needs to resample field data across a resolution
//! jump but owns no particular numerical scheme for doing so — a host
//! application supplies one through [`ProlongRestrict`]. [`PiecewiseConstant`]
//! is the reference operator this crate tests against: volume-weighted
//! averaging for restriction, nearest-neighbor replication for prolongation.
//! Both are exact for the conservation property (L2/L3) a volume-weighted
//! scheme is required to satisfy, at the cost of first-order accuracy a
//! production solver would not accept for smooth fields.

use crate::error::{RefreshError, Result};

/// A matched pair of resampling operators used at coarse/fine interfaces.
/// `padding()` is the stencil's footprint beyond the coarse region it reads,
/// driving the padded-prolongation protocol (spec §4.4) whenever it is
/// nonzero.
pub trait ProlongRestrict: Sync {
    /// Cells of padding this operator's stencil needs beyond the receiver's
    /// own coarse-side footprint. `0` for the piecewise-constant reference
    /// operator; nonzero for any operator wide enough to need neighboring
    /// coarse blocks' data (triggering the extra-block gather protocol).
    fn padding(&self) -> usize;

    /// Expands `src`, packed row-major and shaped `src_n3`, into a buffer
    /// shaped `dst_n3`. Each axis of `dst_n3` must be an integer multiple of
    /// the corresponding axis of `src_n3` (or equal, for degenerate axes).
    fn prolong_apply(&self, src: &[f64], src_n3: [i32; 3], dst_n3: [i32; 3]) -> Result<Vec<f64>>;

    /// Reduces `src`, packed row-major and shaped `src_n3`, into a buffer
    /// shaped `dst_n3`. Each axis of `src_n3` must be an integer multiple of
    /// the corresponding axis of `dst_n3` (or equal, for degenerate axes).
    fn restrict_apply(&self, src: &[f64], src_n3: [i32; 3], dst_n3: [i32; 3]) -> Result<Vec<f64>>;
}

/// Piecewise-constant prolongation (nearest-neighbor replication) paired
/// with volume-weighted-average restriction. Zero padding: its stencil
/// never reads beyond the coarse cell it is expanding.
pub struct PiecewiseConstant {
    padding: usize,
}

impl PiecewiseConstant {
    pub fn new(padding: usize) -> Self {
        PiecewiseConstant { padding }
    }
}

fn axis_ratio(num: i32, den: i32) -> Result<i32> {
    if den == 0 || num % den != 0 {
        return Err(RefreshError::PaddedGeometryMismatch {
            incoming: [num, 0, 0],
            staged: [den, 0, 0],
        });
    }
    Ok(num / den)
}

impl ProlongRestrict for PiecewiseConstant {
    fn padding(&self) -> usize {
        self.padding
    }

    fn prolong_apply(&self, src: &[f64], src_n3: [i32; 3], dst_n3: [i32; 3]) -> Result<Vec<f64>> {
        let rx = axis_ratio(dst_n3[0], src_n3[0])?;
        let ry = axis_ratio(dst_n3[1], src_n3[1])?;
        let rz = axis_ratio(dst_n3[2], src_n3[2])?;
        let mut out = vec![0.0; (dst_n3[0] * dst_n3[1] * dst_n3[2]) as usize];
        for dz in 0..dst_n3[2] {
            let sz = dz / rz;
            for dy in 0..dst_n3[1] {
                let sy = dy / ry;
                for dx in 0..dst_n3[0] {
                    let sx = dx / rx;
                    let sidx = (sx + src_n3[0] * (sy + src_n3[1] * sz)) as usize;
                    let didx = (dx + dst_n3[0] * (dy + dst_n3[1] * dz)) as usize;
                    out[didx] = src[sidx];
                }
            }
        }
        Ok(out)
    }

    fn restrict_apply(&self, src: &[f64], src_n3: [i32; 3], dst_n3: [i32; 3]) -> Result<Vec<f64>> {
        let rx = axis_ratio(src_n3[0], dst_n3[0])?;
        let ry = axis_ratio(src_n3[1], dst_n3[1])?;
        let rz = axis_ratio(src_n3[2], dst_n3[2])?;
        let count = (rx * ry * rz) as f64;
        let mut out = vec![0.0; (dst_n3[0] * dst_n3[1] * dst_n3[2]) as usize];
        for dz in 0..dst_n3[2] {
            for dy in 0..dst_n3[1] {
                for dx in 0..dst_n3[0] {
                    let mut sum = 0.0;
                    for oz in 0..rz {
                        let sz = dz * rz + oz;
                        for oy in 0..ry {
                            let sy = dy * ry + oy;
                            for ox in 0..rx {
                                let sx = dx * rx + ox;
                                let sidx = (sx + src_n3[0] * (sy + src_n3[1] * sz)) as usize;
                                sum += src[sidx];
                            }
                        }
                    }
                    let didx = (dx + dst_n3[0] * (dy + dst_n3[1] * dz)) as usize;
                    out[didx] = sum / count;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prolong_replicates_each_coarse_cell_into_a_block() {
        let op = PiecewiseConstant::new(0);
        let src = vec![1.0, 2.0]; // shaped [2,1,1]
        let out = op.prolong_apply(&src, [2, 1, 1], [4, 1, 1]).unwrap();
        assert_eq!(out, vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn restrict_averages_each_fine_block_into_one_coarse_cell() {
        let op = PiecewiseConstant::new(0);
        let src = vec![1.0, 3.0, 5.0, 7.0]; // shaped [4,1,1]
        let out = op.restrict_apply(&src, [4, 1, 1], [2, 1, 1]).unwrap();
        assert_eq!(out, vec![2.0, 6.0]);
    }

    #[test]
    fn restrict_is_conservative_under_uniform_input() {
        let op = PiecewiseConstant::new(0);
        let src = vec![4.0; 64]; // shaped [4,4,4]
        let out = op.restrict_apply(&src, [4, 4, 4], [2, 2, 2]).unwrap();
        assert!(out.iter().all(|&v| v == 4.0));
    }

    #[test]
    fn prolong_restrict_round_trips_uniform_field() {
        let op = PiecewiseConstant::new(0);
        let src = vec![9.0; 8]; // shaped [2,2,2]
        let fine = op.prolong_apply(&src, [2, 2, 2], [4, 4, 4]).unwrap();
        let back = op.restrict_apply(&fine, [4, 4, 4], [2, 2, 2]).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn mismatched_ratio_is_an_error() {
        let op = PiecewiseConstant::new(0);
        assert!(op.prolong_apply(&[1.0, 2.0, 3.0], [3, 1, 1], [4, 1, 1]).is_err());
    }
}
