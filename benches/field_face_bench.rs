//! Benchmarks for the `FieldFace` codec: packing/unpacking a same-level
//! ghost face and a coarse/fine prolongation, at a representative 8³ block
//! size, with the `rayon`-parallel multi-field `pack_fields` path against
//! field counts this crate's own tests use.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use refresh_core::field::{pack_fields, DenseFieldStore, FieldFace, FieldFaceSpec, FieldStore, Precision};
use refresh_core::geometry::Region;
use refresh_core::prolong_restrict::PiecewiseConstant;

const N3: [i32; 3] = [8, 8, 8];
const G3: [i32; 3] = [2, 2, 2];
const M3: [i32; 3] = [12, 12, 12];

fn filled_store(field_count: usize) -> DenseFieldStore {
    let mut store = DenseFieldStore::new();
    for id in 0..field_count {
        store.add_field(format!("f{id}"), id, Precision::Double, M3, G3, [0, 0, 0], id as f64);
    }
    store
}

fn same_level_send_region() -> Region {
    Region {
        lo: [N3[0], G3[1], G3[2]],
        hi: [N3[0] + G3[0], G3[1] + N3[1], G3[2] + N3[2]],
    }
}

fn bench_pack_single_field(c: &mut Criterion) {
    let store = filled_store(1);
    let pr = PiecewiseConstant::new(0);
    let spec = FieldFaceSpec {
        src: 0,
        dst: 0,
        accumulate: false,
        make_conservative: false,
    };
    let face = FieldFace::new(spec, 0, &pr);
    let region = same_level_send_region();

    c.bench_function("pack_single_field_same_level", |b| {
        b.iter(|| black_box(face.pack(&store, region).unwrap()))
    });
}

fn bench_pack_fields_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_fields_rayon_scaling");
    let pr = PiecewiseConstant::new(0);
    let region = same_level_send_region();

    for field_count in [1usize, 4, 8, 16] {
        let store = filled_store(field_count);
        let pairs: Vec<(usize, usize)> = (0..field_count).map(|id| (id, id)).collect();
        group.throughput(Throughput::Elements((field_count * region.volume() as usize) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(field_count), &field_count, |b, _| {
            b.iter(|| black_box(pack_fields(&store, &pairs, false, 0, &pr, region).unwrap()))
        });
    }
    group.finish();
}

fn bench_unpack_prolong(c: &mut Criterion) {
    let coarse = filled_store(1);
    let pr = PiecewiseConstant::new(0);
    let spec = FieldFaceSpec {
        src: 0,
        dst: 0,
        accumulate: false,
        make_conservative: false,
    };
    let prolong = FieldFace::new(spec, 1, &pr);

    let send_region = Region {
        lo: [8, 4, 4],
        hi: [10, 8, 8],
    };
    let recv_region = Region {
        lo: [0, 0, 0],
        hi: [2, 8, 8],
    };
    let packed = prolong.pack(&coarse, send_region).unwrap();

    c.bench_function("unpack_coarse_to_fine_prolong", |b| {
        b.iter_batched(
            || filled_store(1),
            |mut fine| {
                prolong
                    .unpack(&mut fine, send_region.size(), &packed, recv_region)
                    .unwrap();
                black_box(fine.values(0).unwrap()[0]);
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(field_face, bench_pack_single_field, bench_pack_fields_scaling, bench_unpack_prolong);
criterion_main!(field_face);
