//! # Field store
//!
//! Per-block storage for named, strided 3-D arrays. This crate is handed a
//! [`FieldStore`] implementation by the host application; [`DenseFieldStore`]
//! is the in-memory reference implementation used by this crate's own tests,
//! sized for exercising the refresh protocol rather than for production
//! field-solver storage.

mod face;

pub use face::{pack_fields, pack_region, unpack_fields, unpack_region, unscale_conservative, FieldFace, FieldFaceSpec};

use crate::error::{RefreshError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Field element precision. All three are represented in memory as `f64` in
/// this crate's reference store — `Quadruple` is carried only as a wire tag,
/// since Rust has no native 128-bit float and nothing in the refresh
/// protocol depends on the extra mantissa bits, only on matching tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    Single,
    Double,
    Quadruple,
}

impl Precision {
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Precision::Single),
            1 => Ok(Precision::Double),
            2 => Ok(Precision::Quadruple),
            other => Err(RefreshError::UnsupportedPrecision(other)),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Precision::Single => 0,
            Precision::Double => 1,
            Precision::Quadruple => 2,
        }
    }

    /// Bytes per element on the wire, independent of this crate's in-memory
    /// `f64` representation.
    pub fn element_bytes(self) -> usize {
        match self {
            Precision::Single => 4,
            Precision::Double => 8,
            Precision::Quadruple => 16,
        }
    }
}

/// A field's identity within a block's store.
pub type FieldId = usize;

/// Per-field metadata spec §3's Field store requires: precision, array
/// dimensions (including ghosts), ghost depth, and centering.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMeta {
    pub name: String,
    pub id: FieldId,
    pub precision: Precision,
    /// Full array dimensions, interior plus ghosts, per axis.
    pub m3: [i32; 3],
    pub g3: [i32; 3],
    /// Centering per axis: `0` cell-centered, `1` face-centered.
    pub c3: [i32; 3],
    pub is_temporary: bool,
}

impl FieldMeta {
    pub fn n3(&self) -> [i32; 3] {
        [
            self.m3[0] - 2 * self.g3[0],
            self.m3[1] - 2 * self.g3[1],
            self.m3[2] - 2 * self.g3[2],
        ]
    }
}

/// The field storage interface the refresh subsystem is handed by a host
/// block. A production implementation backs this with whatever array
/// layout its solver already uses; [`DenseFieldStore`] below exists purely
/// for this crate's own tests.
///
/// `Sync` so a refresh can pack several fields' send regions concurrently
/// with `rayon` (spec.md §4.3's per-field work is independent once the send
/// region is known).
pub trait FieldStore: Sync {
    fn meta(&self, id: FieldId) -> Result<&FieldMeta>;

    /// Read-only view of the field's full `m3`-shaped array, row-major with
    /// x fastest-varying.
    fn values(&self, id: FieldId) -> Result<&[f64]>;

    /// Mutable view of the same array.
    fn values_mut(&mut self, id: FieldId) -> Result<&mut [f64]>;

    /// The field id flagged as this store's density field, if any fields
    /// are marked `make_field_conservative` and need one for scaling.
    fn density_field_id(&self) -> Option<FieldId>;

    /// Whether `field_groups.is_in(name, "make_field_conservative")` holds
    /// for `id` (spec.md §4.3). Intensive fields (the common case) answer
    /// `false`.
    fn is_conservative(&self, id: FieldId) -> bool {
        let _ = id;
        false
    }
}

struct FieldEntry {
    meta: FieldMeta,
    data: Vec<f64>,
}

/// In-memory reference [`FieldStore`]. Every field shares one `m3` so tests
/// can construct a block with a handful of named arrays without separately
/// tracking per-field shapes.
#[derive(Default)]
pub struct DenseFieldStore {
    fields: HashMap<FieldId, FieldEntry>,
    density_field: Option<FieldId>,
    conservative_fields: std::collections::BTreeSet<FieldId>,
}

impl DenseFieldStore {
    pub fn new() -> Self {
        DenseFieldStore {
            fields: HashMap::new(),
            density_field: None,
            conservative_fields: std::collections::BTreeSet::new(),
        }
    }

    /// Flags `id` as `make_field_conservative` (spec.md §4.3): its face
    /// region is scaled by the density field before packing and unscaled
    /// after, whenever the transfer is not same-level.
    pub fn set_conservative(&mut self, id: FieldId) {
        self.conservative_fields.insert(id);
    }

    /// Adds a field filled with `fill`, sized `m3` with ghost depth `g3`.
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        id: FieldId,
        precision: Precision,
        m3: [i32; 3],
        g3: [i32; 3],
        c3: [i32; 3],
        fill: f64,
    ) {
        let len = (m3[0] * m3[1] * m3[2]) as usize;
        self.fields.insert(
            id,
            FieldEntry {
                meta: FieldMeta {
                    name: name.into(),
                    id,
                    precision,
                    m3,
                    g3,
                    c3,
                    is_temporary: false,
                },
                data: vec![fill; len],
            },
        );
    }

    pub fn set_density_field(&mut self, id: FieldId) {
        self.density_field = Some(id);
    }
}

impl FieldStore for DenseFieldStore {
    fn meta(&self, id: FieldId) -> Result<&FieldMeta> {
        self.fields
            .get(&id)
            .map(|e| &e.meta)
            .ok_or(RefreshError::UnknownStoreId(id))
    }

    fn values(&self, id: FieldId) -> Result<&[f64]> {
        self.fields
            .get(&id)
            .map(|e| e.data.as_slice())
            .ok_or(RefreshError::UnknownStoreId(id))
    }

    fn values_mut(&mut self, id: FieldId) -> Result<&mut [f64]> {
        self.fields
            .get_mut(&id)
            .map(|e| e.data.as_mut_slice())
            .ok_or(RefreshError::UnknownStoreId(id))
    }

    fn density_field_id(&self) -> Option<FieldId> {
        self.density_field
    }

    fn is_conservative(&self, id: FieldId) -> bool {
        self.conservative_fields.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n3_subtracts_ghosts_from_both_sides() {
        let meta = FieldMeta {
            name: "density".into(),
            id: 0,
            precision: Precision::Double,
            m3: [12, 12, 12],
            g3: [2, 2, 2],
            c3: [0, 0, 0],
            is_temporary: false,
        };
        assert_eq!(meta.n3(), [8, 8, 8]);
    }

    #[test]
    fn dense_store_round_trips_values() {
        let mut store = DenseFieldStore::new();
        store.add_field("density", 0, Precision::Double, [4, 4, 4], [0, 0, 0], [0, 0, 0], 1.0);
        assert_eq!(store.values(0).unwrap().len(), 64);
        store.values_mut(0).unwrap()[0] = 2.0;
        assert_eq!(store.values(0).unwrap()[0], 2.0);
    }

    #[test]
    fn precision_tag_round_trips() {
        for p in [Precision::Single, Precision::Double, Precision::Quadruple] {
            assert_eq!(Precision::from_tag(p.tag()).unwrap(), p);
        }
        assert!(Precision::from_tag(9).is_err());
    }
}
