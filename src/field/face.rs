//! FieldFace codec: packs a send region of one or more fields into a
//! contiguous buffer, and unpacks it into a receiver's fields, applying
//! same-level copy, restriction, or prolongation as the relative level
//! demands.

use crate::error::{RefreshError, Result};
use crate::field::{FieldId, FieldStore};
use crate::geometry::Region;
use crate::prolong_restrict::ProlongRestrict;
use crate::refresh::message::FieldFaceMsg;
use rayon::prelude::*;

/// Flattens the sub-box `region` (in the field's own `m3`-shaped array
/// coordinates) into a contiguous row-major buffer, x fastest-varying.
pub fn pack_region(values: &[f64], m3: [i32; 3], region: Region) -> Vec<f64> {
    let [nx, ny, nz] = region.size();
    let mut out = Vec::with_capacity((nx * ny * nz) as usize);
    for iz in region.lo[2]..region.hi[2] {
        for iy in region.lo[1]..region.hi[1] {
            for ix in region.lo[0]..region.hi[0] {
                let idx = (ix + m3[0] * (iy + m3[1] * iz)) as usize;
                out.push(values[idx]);
            }
        }
    }
    out
}

/// Inverse of [`pack_region`]: scatters `data` into `values`'s sub-box
/// `region`, adding when `accumulate` else overwriting.
pub fn unpack_region(
    values: &mut [f64],
    m3: [i32; 3],
    region: Region,
    data: &[f64],
    accumulate: bool,
) -> Result<()> {
    let [nx, ny, nz] = region.size();
    let expected = (nx * ny * nz) as usize;
    if data.len() != expected {
        return Err(RefreshError::PaddedGeometryMismatch {
            incoming: [nx, ny, nz],
            staged: [nx, ny, nz],
        });
    }
    let mut k = 0usize;
    for iz in region.lo[2]..region.hi[2] {
        for iy in region.lo[1]..region.hi[1] {
            for ix in region.lo[0]..region.hi[0] {
                let idx = (ix + m3[0] * (iy + m3[1] * iz)) as usize;
                if accumulate {
                    values[idx] += data[k];
                } else {
                    values[idx] = data[k];
                }
                k += 1;
            }
        }
    }
    Ok(())
}

/// One (src, dst) field pair transferred by a refresh, plus the accumulate
/// and conservative-scaling flags that apply to it.
#[derive(Debug, Clone, Copy)]
pub struct FieldFaceSpec {
    pub src: FieldId,
    pub dst: FieldId,
    pub accumulate: bool,
    pub make_conservative: bool,
}

/// Packs and unpacks one field pair's transfer for a given relative level,
/// dispatching to same-level copy, restriction, or prolongation.
pub struct FieldFace<'a> {
    pub spec: FieldFaceSpec,
    /// Receiver level minus sender level: `-1`, `0`, or `+1`.
    pub relative_level: i32,
    pub prolong_restrict: &'a dyn ProlongRestrict,
}

impl<'a> FieldFace<'a> {
    pub fn new(
        spec: FieldFaceSpec,
        relative_level: i32,
        prolong_restrict: &'a dyn ProlongRestrict,
    ) -> Self {
        FieldFace {
            spec,
            relative_level,
            prolong_restrict,
        }
    }

    /// Packs the sender's `send_region`, applying conservative scaling
    /// (multiplying by the density field) first when `make_conservative` is
    /// set and the transfer is not same-level.
    pub fn pack(&self, store: &dyn FieldStore, send_region: Region) -> Result<Vec<f64>> {
        let meta = store.meta(self.spec.src)?;
        let m3 = meta.m3;
        let values = store.values(self.spec.src)?;
        let mut packed = pack_region(values, m3, send_region);
        if self.spec.make_conservative && self.relative_level != 0 {
            let density_id = store
                .density_field_id()
                .ok_or(RefreshError::UnknownStoreId(self.spec.src))?;
            let density = store.values(density_id)?;
            let dmeta = store.meta(density_id)?;
            let density_packed = pack_region(density, dmeta.m3, send_region);
            for (v, d) in packed.iter_mut().zip(density_packed.iter()) {
                *v *= d;
            }
        }
        Ok(packed)
    }

    /// Unpacks `data` (shaped like the sender's region, in sender-local
    /// cells) into the receiver's `dst` field at `recv_region`, applying
    /// restriction or prolongation as needed and undoing conservative
    /// scaling afterward.
    pub fn unpack(
        &self,
        store: &mut dyn FieldStore,
        send_n3: [i32; 3],
        data: &[f64],
        recv_region: Region,
    ) -> Result<()> {
        let converted = match self.relative_level {
            0 => data.to_vec(),
            -1 => self.prolong_restrict.restrict_apply(data, send_n3, recv_region.size())?,
            1 => self.prolong_restrict.prolong_apply(data, send_n3, recv_region.size())?,
            other => return Err(RefreshError::InvalidExtraLevelDifference(other)),
        };

        let dmeta = store.meta(self.spec.dst)?;
        let m3 = dmeta.m3;
        unpack_region(
            store.values_mut(self.spec.dst)?,
            m3,
            recv_region,
            &converted,
            self.spec.accumulate,
        )?;

        if self.spec.make_conservative && self.relative_level != 0 {
            unscale_conservative(store, self.spec.dst, recv_region)?;
        }
        Ok(())
    }
}

/// Divides every cell of `dst_field` in `region` by the store's own density
/// field, undoing the conservative scaling [`FieldFace::pack`] applies on
/// the sending side of a restriction or prolongation (spec §4.3). Shared by
/// [`FieldFace::unpack`] and the padded-prolongation stage drain
/// (spec §4.4), both of which unscale after a non-same-level transfer lands.
pub fn unscale_conservative(store: &mut dyn FieldStore, dst_field: FieldId, region: Region) -> Result<()> {
    let density_id = store
        .density_field_id()
        .ok_or(RefreshError::UnknownStoreId(dst_field))?;
    let dens_meta = store.meta(density_id)?.clone();
    let dst_meta = store.meta(dst_field)?.clone();
    for iz in region.lo[2]..region.hi[2] {
        for iy in region.lo[1]..region.hi[1] {
            for ix in region.lo[0]..region.hi[0] {
                let didx = (ix + dens_meta.m3[0] * (iy + dens_meta.m3[1] * iz)) as usize;
                let d = store.values(density_id)?[didx];
                if d != 0.0 {
                    let fidx = (ix + dst_meta.m3[0] * (iy + dst_meta.m3[1] * iz)) as usize;
                    store.values_mut(dst_field)?[fidx] /= d;
                }
            }
        }
    }
    Ok(())
}

/// Packs every `(src, dst)` pair in `pairs` for the same `send_region` and
/// `relative_level`, one [`FieldFaceMsg`] per pair, in parallel with `rayon`
/// — each field's pack is independent (spec.md §4.3 scales and copies one
/// field at a time), mirroring the teacher's data-parallel loops over
/// independent elements with no shared mutable state across threads.
pub fn pack_fields(
    store: &dyn FieldStore,
    pairs: &[(FieldId, FieldId)],
    accumulate: bool,
    relative_level: i32,
    prolong_restrict: &dyn ProlongRestrict,
    send_region: Region,
) -> Result<Vec<FieldFaceMsg>> {
    pairs
        .par_iter()
        .map(|&(src, dst)| {
            let make_conservative = store.is_conservative(src);
            let spec = FieldFaceSpec {
                src,
                dst,
                accumulate,
                make_conservative,
            };
            let face = FieldFace::new(spec, relative_level, prolong_restrict);
            let meta = store.meta(src)?;
            let values = face.pack(store, send_region)?;
            let n3 = send_region.size();
            Ok(FieldFaceMsg {
                src_field: src,
                dst_field: dst,
                precision: meta.precision,
                send_n3: n3,
                accumulate,
                values,
            })
        })
        .collect()
}

/// Unpacks every [`FieldFaceMsg`] in `msgs` into `store` at `recv_region`,
/// sequentially — unlike packing, unpacking mutates one shared store, so
/// fields are applied one at a time rather than farmed out to `rayon`.
pub fn unpack_fields(
    store: &mut dyn FieldStore,
    msgs: &[FieldFaceMsg],
    recv_region: Region,
    relative_level: i32,
    prolong_restrict: &dyn ProlongRestrict,
) -> Result<()> {
    for msg in msgs {
        let declared = store.meta(msg.dst_field)?.precision;
        if declared != msg.precision {
            return Err(RefreshError::PrecisionMismatch {
                declared,
                actual: msg.precision,
            });
        }
        let make_conservative = store.is_conservative(msg.dst_field);
        let spec = FieldFaceSpec {
            src: msg.src_field,
            dst: msg.dst_field,
            accumulate: msg.accumulate,
            make_conservative,
        };
        let face = FieldFace::new(spec, relative_level, prolong_restrict);
        face.unpack(store, msg.send_n3, &msg.values, recv_region)?;
    }
    Ok(())
}
