//! Face, neighbor, and "extra" block enumeration.
//!
//! The neighbor and extra iterators themselves are thin wrappers over
//! [`crate::mesh::Mesh::neighbors`] — the actual adjacency logic lives with
//! the mesh oracle the host application supplies. What this module owns is
//! the face-vector enumeration and the extra-candidate filtering rules from
//! spec §4.1/§4.4, which are pure geometry independent of any mesh.

use crate::geometry::Face;
use crate::mesh::{Mesh, NeighborInfo, NeighborType};

/// All face vectors of the given rank with codimension `>= min_face_rank`,
/// in a fixed deterministic order (z fastest-varying, matching the
/// row-major convention used elsewhere in this crate).
pub fn all_faces(rank: usize, min_face_rank: i32) -> Vec<Face> {
    let mut faces = Vec::new();
    let range: Vec<i32> = (-1..=1).collect();
    for &fx in &range {
        for &fy in &range {
            for &fz in &range {
                let f = match rank {
                    1 => [fx, 0, 0],
                    2 => [fx, fy, 0],
                    _ => [fx, fy, fz],
                };
                if f == [0, 0, 0] {
                    continue;
                }
                let codim = f.iter().filter(|&&c| c != 0).count() as i32;
                let face_rank = rank as i32 - codim;
                if face_rank >= min_face_rank {
                    faces.push(f);
                }
            }
        }
    }
    faces.sort();
    faces.dedup();
    faces
}

/// Enumerates every neighbor of `block` via `mesh`, honoring
/// `min_face_rank`/`neighbor_type`/the level clamps. A thin pass-through
/// kept as the named entry point spec §4.1 describes as "neighbor
/// iteration".
pub fn neighbor_iter(
    mesh: &dyn Mesh,
    block: &crate::geometry::Index,
    min_face_rank: i32,
    neighbor_type: NeighborType,
    min_level: i32,
    root_level: i32,
) -> Vec<NeighborInfo> {
    mesh.neighbors(block, min_face_rank, neighbor_type, min_level, root_level)
}

/// Candidate "extra" blocks for the padded-prolongation protocol (spec
/// §4.4): every neighbor of `block` other than `direct` itself, whose level
/// differs from `direct`'s by at most one, restricted to neighbors sharing
/// at least one tangential axis with `direct`'s face (i.e. blocks that could
/// plausibly overlap the padded footprint of the `block -> direct` transfer).
pub fn extra_candidates<'a>(
    neighbors: &'a [NeighborInfo],
    direct: &NeighborInfo,
) -> Vec<&'a NeighborInfo> {
    neighbors
        .iter()
        .filter(|n| n.index != direct.index)
        .filter(|n| {
            let diff = n.face_level - direct.face_level;
            (-1..=1).contains(&diff)
        })
        .filter(|n| shares_tangential_axis(n.face, direct.face))
        .collect()
}

fn shares_tangential_axis(a: Face, b: Face) -> bool {
    (0..3).any(|axis| b[axis] == 0 && a[axis] != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::test_support::TwoBlockMesh;

    #[test]
    fn all_faces_3d_yields_26_at_corner_rank() {
        let faces = all_faces(3, 0);
        assert_eq!(faces.len(), 26);
    }

    #[test]
    fn all_faces_3d_face_only_yields_6() {
        let faces = all_faces(3, 2);
        assert_eq!(faces.len(), 6);
    }

    #[test]
    fn all_faces_2d_has_no_z_component() {
        let faces = all_faces(2, 0);
        assert_eq!(faces.len(), 8);
        assert!(faces.iter().all(|f| f[2] == 0));
    }

    #[test]
    fn neighbor_iter_delegates_to_mesh() {
        let mesh = TwoBlockMesh::same_level(3);
        let block = crate::geometry::Index::root([0, 0, 0]);
        let neighbors = neighbor_iter(&mesh, &block, 2, NeighborType::Leaf, 0, 0);
        assert!(neighbors.iter().any(|n| n.face == [1, 0, 0]));
    }

    #[test]
    fn extra_candidates_excludes_direct_and_distant_levels() {
        let direct = NeighborInfo {
            face: [1, 0, 0],
            index: crate::geometry::Index::root([1, 0, 0]),
            face_level: 0,
            child: [0, 0, 0],
        };
        let far = NeighborInfo {
            face: [1, 1, 0],
            index: crate::geometry::Index::root([1, 1, 0]),
            face_level: 2,
            child: [0, 0, 0],
        };
        let near = NeighborInfo {
            face: [0, 1, 0],
            index: crate::geometry::Index::root([0, 1, 0]),
            face_level: 0,
            child: [0, 0, 0],
        };
        let neighbors = vec![direct.clone(), far, near.clone()];
        let extras = extra_candidates(&neighbors, &direct);
        assert_eq!(extras, vec![&near]);
    }
}
