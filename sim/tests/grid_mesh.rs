//! Grid coordinates, layer edits and incremental mesh sync.

use terrasim::layer::{LayerKind, LayerSpec};
use terrasim::{GridWorld, MeshSync, TileKind, TileOverride, HEIGHT};

const TILE: &str = "tile";

fn terrain(segments: usize) -> GridWorld {
    let table = TileKind::table().with_table([
        ("grass", TileKind::new(true).with_color([0.2, 0.8, 0.2])),
        ("rock", TileKind::new(false).with_color([0.5, 0.5, 0.5])),
    ]);
    let mut grid = GridWorld::builder(segments)
        .scale(48.0)
        .offset([-24.0, 10.0, 0.0])
        .height_fn(|_, _, u, v| 0.1 * (u * 7.0).sin() * (v * 3.0).cos())
        .layer(TILE, LayerSpec::new(LayerKind::U8).default_record("grass").lookup(table))
        .color_fn(|cell| cell.tile(TILE).map_or([0.0; 3], |t| t.color))
        .build()
        .unwrap();
    grid.ensure_mesh();
    grid
}

fn assert_meshes_equal(a: &GridWorld, b: &GridWorld) {
    let (a, b) = (a.mesh().unwrap(), b.mesh().unwrap());
    assert_eq!(a.positions(), b.positions());
    assert_eq!(a.normals(), b.normals());
    assert_eq!(a.colors(), b.colors());
    assert_eq!(a.indices(), b.indices());
}

#[test]
fn test_segment_world_round_trip() {
    let grid = terrain(24);
    for sy in 0..24 {
        for sx in 0..24 {
            let (wx, wy) = grid.coord_s2w(sx, sy);
            assert_eq!(grid.coord_w2s(wx, wy), Some((sx, sy)));
            let index = grid.coord_w2i(wx, wy).unwrap();
            assert_eq!(grid.coord_i2s(index), (sx, sy));
        }
    }
    assert_eq!(grid.coord_w2s(-24.5, 11.0), None);
    assert_eq!(grid.coord_w2s(24.0, 11.0), None);
    assert_eq!(grid.coord_w2s(f32::NAN, 11.0), None);
}

#[test]
fn test_cell_plus_neighbors_matches_full_rebuild() {
    let edits = [(0, 0, 3.0), (5, 7, -2.0), (11, 11, 8.5), (6, 0, 1.25)];

    let mut incremental = terrain(12);
    let mut full = terrain(12);
    for &(sx, sy, h) in &edits {
        incremental.set_layer_sc(HEIGHT, sx, sy, h, MeshSync::Deferred).unwrap();
        for (dx, dy) in [(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)] {
            incremental.update_segment(sx + dx, sy + dy);
        }
        full.set_layer_sc(HEIGHT, sx, sy, h, MeshSync::Deferred).unwrap();
    }
    full.update_mesh();

    assert_meshes_equal(&incremental, &full);
}

#[test]
fn test_auto_sync_and_batch_match_full_rebuild() {
    let mut auto = terrain(16);
    let mut batched = terrain(16);
    let mut full = terrain(16);

    for (i, sx) in (2..14).enumerate() {
        let h = i as f32 * 0.75;
        auto.set_layer_sc(HEIGHT, sx, 9, h, MeshSync::Auto).unwrap();
        full.set_layer_sc(HEIGHT, sx, 9, h, MeshSync::Deferred).unwrap();
    }
    batched.edit_batch(|batch| {
        for (i, sx) in (2..14).enumerate() {
            batch.set_layer_sc(HEIGHT, sx, 9, i as f32 * 0.75).unwrap();
        }
    });
    full.update_mesh();

    assert_meshes_equal(&auto, &full);
    assert_meshes_equal(&batched, &full);
}

#[test]
fn test_tile_mutation_recolors_cell() {
    let mut grid = terrain(8);
    grid.take_mesh_dirty();

    let overrides = [TileOverride::color([0.9, 0.1, 0.1])];
    assert!(grid.mutate_sc(TILE, 3, 3, &overrides, MeshSync::Auto).unwrap());
    assert!(grid.take_mesh_dirty().unwrap().any());
    assert_eq!(grid.lookup_sc(TILE, 3, 3).unwrap().unwrap().color, [0.9, 0.1, 0.1]);

    // A second cell with the same overrides shares the derived record.
    assert!(grid.mutate_sc(TILE, 4, 3, &overrides, MeshSync::Auto).unwrap());
    let a = grid.get_layer_sc::<u8>(TILE, 3, 3).unwrap();
    let b = grid.get_layer_sc::<u8>(TILE, 4, 3).unwrap();
    assert_eq!(a, b);
    let table_len = grid.layer::<u8>(TILE).unwrap().table().unwrap().len();
    assert_eq!(table_len, 3);

    // Untouched neighbors keep their color.
    assert_eq!(grid.lookup_sc(TILE, 5, 3).unwrap().unwrap().name, "grass");
}

#[test]
fn test_derived_records_are_interned() {
    let mut table = TileKind::table().with_table([("grass", TileKind::new(true))]);
    let grass = table.index_for_name("grass").unwrap();

    let muddy = table.get_derived(grass, &[TileOverride::walk_cost(3.0)]);
    let again = table.get_derived(grass, &[TileOverride::walk_cost(3.0)]);
    let blocked = table.get_derived(grass, &[TileOverride::Walkable(false)]);
    let noop = table.get_derived(grass, &[TileOverride::Walkable(true)]);

    assert_eq!(muddy, again);
    assert_ne!(muddy, grass);
    assert_ne!(blocked, muddy);
    assert_eq!(noop, grass);
    assert_eq!(table.get(muddy).unwrap().walk_cost, Some(3.0));
    assert!(!table.get(blocked).unwrap().walkable);
}

#[test]
fn test_unknown_layer_is_an_error() {
    let mut grid = terrain(4);
    assert!(grid.set_layer_sc("moisture", 0, 0, 1.0f32, MeshSync::Auto).is_err());
    assert!(grid.layer::<f32>(TILE).is_err());
    assert!(grid.lookup_sc(HEIGHT, 0, 0).is_err());
}
