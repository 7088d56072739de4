//! `Context`: the immutable handle every `Block` handler is given.

use crate::mesh::Mesh;
use crate::prolong_restrict::ProlongRestrict;
use std::rc::Rc;

/// Bundles the mesh topology oracle and the prolong/restrict operator pair
/// a refresh needs, plus the handful of scalar config values spec.md §6
/// attributes to `config`/`problem`. Built once by the host application and
/// shared (by reference) across every `Block` it drives; never mutated
/// after construction, so a `Block` never has to reason about it changing
/// mid-handler.
pub struct Context {
    mesh: Rc<dyn Mesh>,
    prolong_restrict: Rc<dyn ProlongRestrict>,
    mesh_min_level: i32,
    rank: usize,
}

impl Context {
    pub fn new(mesh: Rc<dyn Mesh>, prolong_restrict: Rc<dyn ProlongRestrict>, mesh_min_level: i32) -> Self {
        let rank = mesh.rank();
        Context {
            mesh,
            prolong_restrict,
            mesh_min_level,
            rank,
        }
    }

    pub fn mesh(&self) -> &dyn Mesh {
        self.mesh.as_ref()
    }

    pub fn prolong_restrict(&self) -> &dyn ProlongRestrict {
        self.prolong_restrict.as_ref()
    }

    pub fn mesh_min_level(&self) -> i32 {
        self.mesh_min_level
    }

    pub fn rank(&self) -> usize {
        self.rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::test_support::TwoBlockMesh;
    use crate::prolong_restrict::PiecewiseConstant;

    #[test]
    fn context_exposes_mesh_rank_through_to_callers() {
        let ctx = Context::new(Rc::new(TwoBlockMesh::same_level(3)), Rc::new(PiecewiseConstant::new(0)), 0);
        assert_eq!(ctx.rank(), 3);
        assert_eq!(ctx.mesh().rank(), 3);
    }
}
