//! Two level-0 blocks exchange ghost zones across their shared +x/-x face.
//!
//! Run with `cargo run --example two_block_refresh`.

use refresh_core::block::{Block, BlockGeometry};
use refresh_core::context::Context;
use refresh_core::field::{DenseFieldStore, FieldStore, Precision};
use refresh_core::flux::FaceFluxStore;
use refresh_core::geometry::Index;
use refresh_core::mesh::{Mesh, NeighborInfo, NeighborType};
use refresh_core::particle::BatchedParticleStore;
use refresh_core::prolong_restrict::PiecewiseConstant;
use refresh_core::refresh::{NeighborType as SpecNeighborType, RefreshSpec};
use refresh_core::transport::ChannelTransport;
use std::rc::Rc;

struct TwoBlocksAlongX;

impl Mesh for TwoBlocksAlongX {
    fn rank(&self) -> usize {
        3
    }

    fn periodicity(&self) -> [bool; 3] {
        [false; 3]
    }

    fn domain_bounds(&self) -> ([f64; 3], [f64; 3]) {
        ([0.0, 0.0, 0.0], [2.0, 1.0, 1.0])
    }

    fn mesh_min_level(&self) -> i32 {
        0
    }

    fn neighbors(
        &self,
        block: &Index,
        _min_face_rank: i32,
        _neighbor_type: NeighborType,
        _min_level: i32,
        _root_level: i32,
    ) -> Vec<NeighborInfo> {
        if block.array() == [0, 0, 0] {
            vec![NeighborInfo {
                face: [1, 0, 0],
                index: Index::root([1, 0, 0]),
                face_level: 0,
                child: [0, 0, 0],
            }]
        } else {
            vec![NeighborInfo {
                face: [-1, 0, 0],
                index: Index::root([0, 0, 0]),
                face_level: 0,
                child: [0, 0, 0],
            }]
        }
    }
}

fn build_block(array: [i32; 3], fill: f64) -> Block<DenseFieldStore, BatchedParticleStore, FaceFluxStore> {
    let n3 = [8, 8, 8];
    let g3 = [2, 2, 2];
    let m3 = [12, 12, 12];
    let mut fields = DenseFieldStore::new();
    fields.add_field("rho", 0, Precision::Double, m3, g3, [0, 0, 0], fill);
    Block::new(
        BlockGeometry {
            index: Index::root(array),
            level: 0,
            n3,
            g3,
            lower: [array[0] as f64, 0.0, 0.0],
            upper: [array[0] as f64 + 1.0, 1.0, 1.0],
            on_boundary: [[false; 2]; 3],
        },
        fields,
        BatchedParticleStore::new(),
        FaceFluxStore::new(),
    )
}

fn main() {
    env_logger::init();

    let context = Context::new(Rc::new(TwoBlocksAlongX), Rc::new(PiecewiseConstant::new(0)), 0);
    let mut a = build_block([0, 0, 0], 1.0);
    let mut b = build_block([1, 0, 0], 2.0);

    let spec = RefreshSpec {
        id: 1,
        any_fields: true,
        field_list_src: vec![0],
        field_list_dst: vec![0],
        any_particles: false,
        particle_list: vec![],
        all_particles: false,
        any_fluxes: false,
        min_face_rank: 2,
        neighbor_type: SpecNeighborType::Leaf,
        root_level: 0,
        min_level: 0,
        ghost_depth: 2,
        accumulate: false,
        sync_type: "neighbor",
        sync_exit: "barrier",
        callback: 1,
    };

    let a_idx = Index::root([0, 0, 0]);
    let b_idx = Index::root([1, 0, 0]);
    let (transport, mut rx) = ChannelTransport::new(&[a_idx, b_idx]);

    println!("before: A's +x ghost is still its own fill value (1.0)");
    a.refresh_start(&context, &spec, &transport).expect("A refresh_start");
    while let Ok(msg) = rx[1].try_recv() {
        b.on_recv(&context, &spec, msg).expect("B on_recv");
    }
    b.refresh_start(&context, &spec, &transport).expect("B refresh_start");
    while let Ok(msg) = rx[0].try_recv() {
        a.on_recv(&context, &spec, msg).expect("A on_recv");
    }

    let values = a.fields.values(0).unwrap();
    let ghost_idx = (10 + 12 * (2 + 12 * 2)) as usize;
    println!("after: A's +x ghost = {} (B's fill value)", values[ghost_idx]);
}
