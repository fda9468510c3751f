//! Criterion benchmarks for surface mesh synchronization.
//!
//! Benchmarks:
//!   - full rebuild of a 128×128 grid
//!   - single cell edit with 3×3 refresh
//!   - 32×32 block edited through one batch
//!
//! Run with: cargo bench --bench mesh_bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use terrasim::grid::{GridWorld, MeshSync, HEIGHT};

const SIZE: usize = 128;

fn meshed_grid() -> GridWorld {
    let mut grid = GridWorld::builder(SIZE)
        .scale(SIZE as f32)
        .height_fn(|_, _, u, v| (u * 7.0).sin() * (v * 5.0).cos())
        .build()
        .unwrap();
    grid.ensure_mesh();
    grid
}

fn bench_full_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_full");
    group.sample_size(20);

    let mut grid = meshed_grid();
    group.bench_function("update_mesh_128", |b| {
        b.iter(|| {
            grid.update_mesh();
            black_box(grid.take_mesh_dirty())
        });
    });

    group.finish();
}

fn bench_incremental(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_incremental");

    let mut grid = meshed_grid();
    let mut h = 0.0f32;
    group.bench_function("single_cell", |b| {
        b.iter(|| {
            h += 0.5;
            grid.set_layer_sc(HEIGHT, black_box(64), black_box(64), h, MeshSync::Auto)
                .unwrap()
        });
    });

    group.bench_function("batch_32x32", |b| {
        b.iter(|| {
            h += 0.5;
            grid.edit_batch(|batch| {
                for y in 32..64 {
                    for x in 32..64 {
                        batch.set_layer_sc(HEIGHT, x, y, h).unwrap();
                    }
                }
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_full_rebuild, bench_incremental);
criterion_main!(benches);
