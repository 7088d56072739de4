//! # `Index` — hierarchical block address
//!
//! An `Index` names one block in the octree mesh: an integer array
//! coordinate (its position in the root-level forest) plus a tree path of
//! child bits descending from that root block. `level()` is the path length;
//! leaves of the root forest have `level >= 0`, while the coarser "sub"
//! lattice used by [`crate::particle::migration`] for neighbor binning uses
//! negative levels.
//!
//! This is a from-scratch, struct-based representation rather than the
//! bit-interleaved encoding the original implementation uses internally —
//! nothing in the spec's operations depends on the wire representation of an
//! `Index`, only on `parent`/`child`/`array`/`tree` behaving as documented.

use crate::error::{RefreshError, Result};
use crate::geometry::child::{validate_child, Child};
use serde::{Deserialize, Serialize};

/// Hierarchical address of one block: a root-forest array coordinate plus a
/// path of child selections down the octree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    array: [i32; 3],
    /// One child triplet per tree level; `tree[0]` selects which child of
    /// the root-forest block this index descends through, `tree[1]` the
    /// next level down, and so on.
    tree: Vec<[u8; 3]>,
}

impl Index {
    /// Builds the index of a root-forest block (level 0, empty tree path).
    pub fn root(array: [i32; 3]) -> Self {
        Index {
            array,
            tree: Vec::new(),
        }
    }

    /// Builds the child of `self` selected by `ic3`.
    pub fn descend(&self, ic3: Child) -> Result<Self> {
        validate_child(ic3)?;
        let mut tree = self.tree.clone();
        tree.push([ic3[0] as u8, ic3[1] as u8, ic3[2] as u8]);
        Ok(Index {
            array: self.array,
            tree,
        })
    }

    /// This block's refinement level: `tree.len()` as a signed integer, so
    /// that the negative "sub" lattice levels used during particle binning
    /// remain representable by the same type.
    pub fn level(&self) -> i32 {
        self.tree.len() as i32
    }

    /// The root-forest array coordinate this block descends from.
    pub fn array(&self) -> [i32; 3] {
        self.array
    }

    /// The full child-selection path from the root-forest block to `self`.
    pub fn tree(&self) -> &[[u8; 3]] {
        &self.tree
    }

    /// The index of this block's immediate parent. Panics if called on a
    /// root-forest block (a caller should always check `level() > 0` first;
    /// calling `parent()` on a root is a logic error, not recoverable input).
    pub fn parent(&self) -> Self {
        assert!(self.level() > 0, "parent() called on a root-forest index");
        Index {
            array: self.array,
            tree: self.tree[..self.tree.len() - 1].to_vec(),
        }
    }

    /// Returns the child triplet identifying `self` within its parent, as
    /// seen from ancestor level `level` (i.e. the bits that place a
    /// level-`level` node within its level-`(level - 1)` parent).
    ///
    /// `level` must be in `1..=self.level()`.
    pub fn child(&self, level: i32) -> Result<Child> {
        if level < 1 || level > self.level() {
            return Err(RefreshError::InvalidChild([level, 0, 0]));
        }
        let bits = self.tree[(level - 1) as usize];
        Ok([bits[0] as i32, bits[1] as i32, bits[2] as i32])
    }
}
