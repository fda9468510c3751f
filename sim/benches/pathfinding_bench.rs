//! Criterion benchmarks for A* over grid cells.
//!
//! Benchmarks:
//!   - corner to corner on an open 128×128 field
//!   - the same search around a long wall
//!   - the same search spread over 64-node slices
//!
//! Run with: cargo bench --bench pathfinding_bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use terrasim::behaviors::world_pathfind::world_graph;
use terrasim::grid::{GridWorld, MeshSync, HEIGHT};
use terrasim::pathfinder::{PathfinderGraph, SearchStatus};

const SIZE: usize = 128;

fn walled_grid() -> GridWorld {
    let mut grid = GridWorld::new(SIZE, SIZE as f32).unwrap();
    for y in 0..(SIZE as i32 - 4) {
        grid.set_layer_sc(HEIGHT, 64, y, 50.0f32, MeshSync::Deferred)
            .unwrap();
    }
    grid
}

// ---------------------------------------------------------------------------
// Benchmark: full searches
// ---------------------------------------------------------------------------

fn bench_pathfind(c: &mut Criterion) {
    let mut group = c.benchmark_group("pathfind_128");
    group.sample_size(20);

    let mut open = PathfinderGraph::<()>::new(SIZE, SIZE);
    group.bench_function("open_field", |b| {
        b.iter(|| black_box(open.pathfind(&(), 0, 0, black_box(127), black_box(127))));
    });

    let grid = walled_grid();
    let mut graph = world_graph(SIZE, 10.0);
    group.bench_function("around_wall", |b| {
        b.iter(|| black_box(graph.pathfind(&grid, 0, 0, black_box(127), black_box(0))));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: budgeted search
// ---------------------------------------------------------------------------

fn bench_budgeted(c: &mut Criterion) {
    let mut group = c.benchmark_group("pathfind_budgeted");
    group.sample_size(20);

    let grid = walled_grid();
    let mut graph = world_graph(SIZE, 10.0);
    group.bench_function("slices_of_64", |b| {
        b.iter(|| {
            graph.begin(0, 0, 127, 0);
            while graph.advance(&grid, 64) == SearchStatus::Running {}
            black_box(graph.take_path())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pathfind, bench_budgeted);
criterion_main!(benches);
