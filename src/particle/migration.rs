//! Particle migration: binning outgoing particles into a 4×4×4 (rank-3;
//! 4×4 or 4 for lower ranks) neighbor lattice, periodic position updates,
//! and scatter+delete into per-neighbor [`ParticleData`] containers.

use crate::error::{RefreshError, Result};
use crate::geometry::{Child, Face};
use crate::particle::{
    Particle, ParticleData, ParticleTypeId, PositionKind, SerializedParticle,
};
use crate::particle::ParticleStore;

/// One neighbor's slot in the binning lattice: its face/child identity plus
/// the lattice cell range it owns, expressed as `[lo, hi)` per axis in
/// `0..=4` lattice coordinates.
#[derive(Debug, Clone, Copy)]
pub struct NeighborBin {
    pub face: Face,
    pub child: Child,
    /// Receiver level minus this block's level.
    pub relative_level: i32,
    pub lo: [i32; 3],
    pub hi: [i32; 3],
}

/// Computes the lattice range `[lo, hi)` a neighbor in direction `face`, at
/// `relative_level` relative to this block, owns within the 4-wide binning
/// lattice. The axis aligned with `face` always claims the single edge
/// cell (`0` or `3`); tangential axes claim the interior pair `[1, 3)` —
/// since a neighbor's `relative_level`/`child` only ever changes which
/// *sub-tile* of its own domain maps to a lattice cell, never whether that
/// cell sits on a periodic boundary, which is all the lattice range is used
/// for here.
pub fn lattice_range(rank: usize, face: Face) -> ([i32; 3], [i32; 3]) {
    let mut lo = [0i32; 3];
    let mut hi = [1i32; 3];
    for axis in 0..3 {
        if axis >= rank {
            lo[axis] = 0;
            hi[axis] = 1;
            continue;
        }
        lo[axis] = match face[axis] {
            f if f < 0 => 0,
            f if f > 0 => 3,
            _ => 1,
        };
        hi[axis] = match face[axis] {
            f if f < 0 => 1,
            f if f > 0 => 4,
            _ => 3,
        };
    }
    (lo, hi)
}

/// A particle's position update to apply when it lands in a given
/// neighbor's bin and that bin touches a periodic domain boundary this
/// block itself sits on.
fn periodic_update(
    rank: usize,
    lo: [i32; 3],
    hi: [i32; 3],
    periodic: [bool; 3],
    on_boundary: [[bool; 2]; 3],
    domain_lo: [f64; 3],
    domain_hi: [f64; 3],
) -> [f64; 3] {
    let mut d = [0.0; 3];
    for axis in 0..rank {
        if lo[axis] == 0 && on_boundary[axis][0] && periodic[axis] {
            d[axis] = domain_hi[axis] - domain_lo[axis];
        }
        if hi[axis] == 4 && on_boundary[axis][1] && periodic[axis] {
            d[axis] = -(domain_hi[axis] - domain_lo[axis]);
        }
    }
    d
}

/// Bins every particle of the given types (or every type, if `type_list` is
/// empty and `all_types` is set) into a 4×4×4 lattice of [`ParticleData`]
/// containers, one per neighbor, applying periodic position updates before
/// handing particles off. Particles that land in the block's own interior
/// `{1,2}^rank` stay in `store`; all others are scattered into the
/// corresponding neighbor's container and removed from `store`.
///
/// Returns one `(NeighborBin, ParticleData)` pair per neighbor passed in
/// `neighbors`, in the same order; a neighbor with no migrating particles
/// still gets an empty `ParticleData` (a tombstone, per spec, still counted
/// by the refresh's `Sync`).
#[allow(clippy::too_many_arguments)]
pub fn bin_particles(
    store: &mut dyn ParticleStore,
    rank: usize,
    center: [f64; 3],
    extent: [f64; 3],
    neighbors: &[(Face, Child, i32)],
    type_list: &[ParticleTypeId],
    all_types: bool,
    periodic: [bool; 3],
    on_boundary: [[bool; 2]; 3],
    domain_lo: [f64; 3],
    domain_hi: [f64; 3],
) -> Result<Vec<(NeighborBin, ParticleData)>> {
    let bins: Vec<NeighborBin> = neighbors
        .iter()
        .map(|&(face, child, relative_level)| {
            let (lo, hi) = lattice_range(rank, face);
            NeighborBin {
                face,
                child,
                relative_level,
                lo,
                hi,
            }
        })
        .collect();

    let mut lattice: Vec<ParticleData> = vec![ParticleData::default(); 64];
    let deltas: Vec<[f64; 3]> = bins
        .iter()
        .map(|b| periodic_update(rank, b.lo, b.hi, periodic, on_boundary, domain_lo, domain_hi))
        .collect();

    let types = if all_types {
        store.type_ids()
    } else {
        type_list.to_vec()
    };

    for type_id in types {
        let kind = store.position_kind(type_id)?;
        if !matches!(kind, PositionKind::Float | PositionKind::Integer) {
            return Err(RefreshError::UnsupportedParticlePrecision);
        }
        let nb = store.num_batches(type_id)?;
        for batch_idx in 0..nb {
            let batch = store.batch(type_id, batch_idx)?;
            let n = batch.particles.len();
            let mut mask = vec![false; n];
            let mut lattice_index = vec![0usize; n];

            for (ip, particle) in batch.particles.iter().enumerate() {
                let lat = particle_lattice_coords(particle.position, kind, rank, center, extent)?;
                let i = (lat[0] + 4 * (lat[1] + 4 * lat[2])) as usize;
                lattice_index[ip] = i;
                let in_block = (0..rank).all(|axis| (1..=2).contains(&lat[axis]));
                mask[ip] = !in_block;
            }

            for (ip, &i) in lattice_index.iter().enumerate() {
                if !mask[ip] {
                    continue;
                }
                if let Some((bin_idx, bin)) = bins.iter().enumerate().find(|(_, b)| {
                    (b.lo[0]..b.hi[0]).contains(&((i % 4) as i32))
                        && (b.lo[1]..b.hi[1]).contains(&(((i / 4) % 4) as i32))
                        && (b.lo[2]..b.hi[2]).contains(&((i / 16) as i32))
                }) {
                    let _ = bin;
                    let d = deltas[bin_idx];
                    let mut p = batch.particles[ip].clone();
                    if matches!(kind, PositionKind::Float) {
                        for axis in 0..rank {
                            p.position[axis] += d[axis];
                        }
                        // Whether the updated position now lies inside the
                        // *receiving* block's domain is checked when the
                        // message is applied on arrival (the sender does
                        // not know the receiver's bounds); see
                        // `refresh::dispatch::apply_particle_data`.
                    }
                    lattice[i]
                        .by_type
                        .entry(type_id)
                        .or_default()
                        .push(SerializedParticle::from(&p));
                }
            }
            store.delete_particles(type_id, batch_idx, &mask)?;
        }
    }

    let mut out = Vec::with_capacity(bins.len());
    for bin in bins {
        let mut merged = ParticleData::default();
        for iz in bin.lo[2]..bin.hi[2] {
            for iy in bin.lo[1]..bin.hi[1] {
                for ix in bin.lo[0]..bin.hi[0] {
                    let i = (ix + 4 * (iy + 4 * iz)) as usize;
                    for (ty, ps) in &lattice[i].by_type {
                        merged.by_type.entry(*ty).or_default().extend(ps.iter().cloned());
                    }
                }
            }
        }
        out.push((bin, merged));
    }
    Ok(out)
}

/// Converts one particle's position into 4-wide lattice coordinates:
/// `floor(2*(pos - center)/extent + 2)` for float positions, used directly
/// for integer (block-local) positions.
fn particle_lattice_coords(
    position: [f64; 3],
    kind: PositionKind,
    rank: usize,
    center: [f64; 3],
    extent: [f64; 3],
) -> Result<[i32; 3]> {
    let mut lat = [0i32; 3];
    for axis in 0..3 {
        if axis >= rank {
            lat[axis] = 0;
            continue;
        }
        let v = match kind {
            PositionKind::Float => {
                let normalized = 2.0 * (position[axis] - center[axis]) / extent[axis];
                (normalized + 2.0).floor() as i32
            }
            PositionKind::Integer => position[axis] as i32,
        };
        if !(0..4).contains(&v) {
            return Err(RefreshError::ParticleOutOfDomain(position, center, extent));
        }
        lat[axis] = v;
    }
    Ok(lat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{BatchedParticleStore, ParticleBatch};

    fn single_particle_store(position: [f64; 3]) -> BatchedParticleStore {
        let mut store = BatchedParticleStore::new();
        store.add_type(0, PositionKind::Float);
        store.add_batch(
            0,
            ParticleBatch {
                particles: vec![Particle { position, attrs: vec![] }],
            },
        );
        store
    }

    #[test]
    fn interior_particle_stays_in_block() {
        let mut store = single_particle_store([0.5, 0.5, 0.5]);
        let neighbors = vec![([1, 0, 0], [0, 0, 0], 0)];
        let result = bin_particles(
            &mut store,
            3,
            [0.5, 0.5, 0.5],
            [1.0, 1.0, 1.0],
            &neighbors,
            &[0],
            false,
            [false; 3],
            [[false; 2]; 3],
            [0.0; 3],
            [1.0; 3],
        )
        .unwrap();
        assert!(result[0].1.is_empty());
        assert_eq!(store.batch(0, 0).unwrap().particles.len(), 1);
    }

    #[test]
    fn particle_past_face_migrates_to_neighbor() {
        let mut store = single_particle_store([1.01, 0.5, 0.5]);
        let neighbors = vec![([1, 0, 0], [0, 0, 0], 0)];
        let result = bin_particles(
            &mut store,
            3,
            [0.5, 0.5, 0.5],
            [1.0, 1.0, 1.0],
            &neighbors,
            &[0],
            false,
            [false; 3],
            [[false; 2]; 3],
            [0.0; 3],
            [1.0; 3],
        )
        .unwrap();
        assert!(!result[0].1.is_empty());
        assert_eq!(store.batch(0, 0).unwrap().particles.len(), 0);
    }

    #[test]
    fn periodic_wraparound_shifts_position() {
        let mut store = single_particle_store([1.01, 0.5, 0.5]);
        let neighbors = vec![([1, 0, 0], [0, 0, 0], 0)];
        let result = bin_particles(
            &mut store,
            3,
            [0.5, 0.5, 0.5],
            [1.0, 1.0, 1.0],
            &neighbors,
            &[0],
            false,
            [true, false, false],
            [[false, true], [false, false], [false, false]],
            [0.0; 3],
            [1.0; 3],
        )
        .unwrap();
        let shipped = &result[0].1.by_type[&0][0];
        assert!((shipped.position[0] - (1.01 - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn lattice_range_covers_edge_on_face_axis() {
        let (lo, hi) = lattice_range(3, [1, 0, 0]);
        assert_eq!((lo[0], hi[0]), (3, 4));
        assert_eq!((lo[1], hi[1]), (1, 3));
    }
}
