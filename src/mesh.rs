//! # `Mesh` — the topology oracle
//!
//! The refresh subsystem never owns mesh topology itself: it is handed one
//! through this trait. A host application's AMR forest, refinement
//! criteria, and load balancer live entirely behind `Mesh` and are out of
//! this crate's scope; what it needs from them is enumerated here.

use crate::geometry::{Child, Face, Index};

/// How `Mesh::neighbors` should treat resolution jumps at a block boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborType {
    /// Cross resolution jumps: a face may be covered by one coarser
    /// neighbor, one same-level neighbor, or several finer neighbors.
    Leaf,
    /// Traverse the full octree, including non-leaf ancestors.
    Tree,
    /// Restrict enumeration to same-level neighbors only.
    Level,
}

/// One neighbor found by [`Mesh::neighbors`].
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborInfo {
    /// Direction from the queried block toward this neighbor.
    pub face: Face,
    /// The neighbor's own address.
    pub index: Index,
    /// The neighbor's level. Equal to `level - 1`, `level`, or `level + 1`
    /// relative to the queried block's level.
    pub face_level: i32,
    /// Child vector locating the queried block within the interface when
    /// levels differ: the receiver's child index for a coarse neighbor, or
    /// which of the several finer neighbors this is for a fine one.
    pub child: Child,
}

/// The mesh topology oracle the refresh subsystem is handed by a host
/// application. Implementations answer purely geometric questions; this
/// crate never mutates or refines the mesh itself.
pub trait Mesh {
    /// Spatial rank: 1, 2, or 3.
    fn rank(&self) -> usize;

    /// Whether the domain is periodic along each axis.
    fn periodicity(&self) -> [bool; 3];

    /// The physical domain's lower and upper bounds.
    fn domain_bounds(&self) -> ([f64; 3], [f64; 3]);

    /// The coarsest level the mesh ever refines from.
    fn mesh_min_level(&self) -> i32;

    /// All neighbors of `block` reachable through a face of codimension at
    /// least `min_face_rank`, honoring `neighbor_type` and the `min_level`/
    /// `root_level` enumeration clamps.
    fn neighbors(
        &self,
        block: &Index,
        min_face_rank: i32,
        neighbor_type: NeighborType,
        min_level: i32,
        root_level: i32,
    ) -> Vec<NeighborInfo>;

    /// All face vectors of codimension at least `min_face_rank` for this
    /// mesh's rank, independent of any particular block's neighbors.
    fn face_iter(&self, min_face_rank: i32) -> Vec<Face> {
        crate::iter::all_faces(self.rank(), min_face_rank)
    }
}
