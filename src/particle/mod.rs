//! # Particle store
//!
//! Per-block storage for typed, batched particle attribute arrays. As with
//! [`crate::field::FieldStore`], this crate only defines the interface;
//! [`BatchedParticleStore`] is the in-memory reference implementation used
//! by this crate's own tests.

pub mod migration;

use crate::error::{RefreshError, Result};

/// A particle type's identity within a block's store.
pub type ParticleTypeId = usize;

/// One particle: a world-space or block-local position plus whatever other
/// attributes this type carries, stored densely alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: [f64; 3],
    pub attrs: Vec<f64>,
}

/// One batch of particles of a single type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleBatch {
    pub particles: Vec<Particle>,
}

/// A self-contained bundle of particles in flight between blocks: what a
/// `particle_data` [`crate::refresh::message::DataMsg`] variant carries, and
/// what each lattice cell of [`migration::bin_particles`] points at.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParticleData {
    /// Particles carried per type, keyed by type id.
    pub by_type: std::collections::BTreeMap<ParticleTypeId, Vec<SerializedParticle>>,
}

impl ParticleData {
    pub fn is_empty(&self) -> bool {
        self.by_type.values().all(|v| v.is_empty())
    }
}

/// Wire representation of a [`Particle`] (plain `serde` derive needs no
/// `Vec<f64>` special-casing, but a named type keeps `ParticleData`
/// self-describing on the wire).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SerializedParticle {
    pub position: [f64; 3],
    pub attrs: Vec<f64>,
}

impl From<&Particle> for SerializedParticle {
    fn from(p: &Particle) -> Self {
        SerializedParticle {
            position: p.position,
            attrs: p.attrs.clone(),
        }
    }
}

impl From<SerializedParticle> for Particle {
    fn from(p: SerializedParticle) -> Self {
        Particle {
            position: p.position,
            attrs: p.attrs,
        }
    }
}

/// Whether a particle type's positions are stored as floats in world
/// coordinates or integers in block-local units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionKind {
    Float,
    Integer,
}

/// The particle storage interface the refresh subsystem is handed by a host
/// block.
pub trait ParticleStore {
    fn type_ids(&self) -> Vec<ParticleTypeId>;
    fn position_kind(&self, type_id: ParticleTypeId) -> Result<PositionKind>;
    fn num_batches(&self, type_id: ParticleTypeId) -> Result<usize>;
    fn batch(&self, type_id: ParticleTypeId, batch: usize) -> Result<&ParticleBatch>;
    fn batch_mut(&mut self, type_id: ParticleTypeId, batch: usize) -> Result<&mut ParticleBatch>;

    /// Removes every particle whose index is `true` in `mask`, returning how
    /// many were deleted.
    fn delete_particles(&mut self, type_id: ParticleTypeId, batch: usize, mask: &[bool]) -> Result<usize> {
        let b = self.batch_mut(type_id, batch)?;
        if mask.len() != b.particles.len() {
            return Err(RefreshError::UnknownStoreId(type_id));
        }
        let mut kept = Vec::with_capacity(b.particles.len());
        let mut removed = 0;
        for (p, &m) in b.particles.drain(..).zip(mask.iter()) {
            if m {
                removed += 1;
            } else {
                kept.push(p);
            }
        }
        b.particles = kept;
        Ok(removed)
    }
}

/// In-memory reference [`ParticleStore`]: one [`ParticleBatch`] vector per
/// type.
#[derive(Default)]
pub struct BatchedParticleStore {
    types: std::collections::BTreeMap<ParticleTypeId, (PositionKind, Vec<ParticleBatch>)>,
}

impl BatchedParticleStore {
    pub fn new() -> Self {
        BatchedParticleStore {
            types: std::collections::BTreeMap::new(),
        }
    }

    pub fn add_type(&mut self, type_id: ParticleTypeId, kind: PositionKind) {
        self.types.entry(type_id).or_insert((kind, Vec::new()));
    }

    pub fn add_batch(&mut self, type_id: ParticleTypeId, batch: ParticleBatch) {
        self.types
            .entry(type_id)
            .or_insert((PositionKind::Float, Vec::new()))
            .1
            .push(batch);
    }
}

impl ParticleStore for BatchedParticleStore {
    fn type_ids(&self) -> Vec<ParticleTypeId> {
        self.types.keys().copied().collect()
    }

    fn position_kind(&self, type_id: ParticleTypeId) -> Result<PositionKind> {
        self.types
            .get(&type_id)
            .map(|(k, _)| *k)
            .ok_or(RefreshError::UnknownStoreId(type_id))
    }

    fn num_batches(&self, type_id: ParticleTypeId) -> Result<usize> {
        self.types
            .get(&type_id)
            .map(|(_, b)| b.len())
            .ok_or(RefreshError::UnknownStoreId(type_id))
    }

    fn batch(&self, type_id: ParticleTypeId, batch: usize) -> Result<&ParticleBatch> {
        self.types
            .get(&type_id)
            .and_then(|(_, b)| b.get(batch))
            .ok_or(RefreshError::UnknownStoreId(type_id))
    }

    fn batch_mut(&mut self, type_id: ParticleTypeId, batch: usize) -> Result<&mut ParticleBatch> {
        self.types
            .get_mut(&type_id)
            .and_then(|(_, b)| b.get_mut(batch))
            .ok_or(RefreshError::UnknownStoreId(type_id))
    }
}
