//! Basic demonstration of the Terrasim simulation.
//!
//! Builds a tiled terrain, drops a few wanderers and two terrain morph
//! brushes on it, and prints their progress.
//!
//! Run with: cargo run --example basic_demo
//! Set RUST_LOG=debug to see promotions and pathfinding decisions.

use terrasim::behaviors::{TerrainMorph, Wanderer, MALLEABILITY, TILE};
use terrasim::layer::{LayerKind, LayerSpec};
use terrasim::{GridHandle, GridWorld, MeshSync, SimConfig, SimWorld, TerrainActor, TileKind};
use tracing_subscriber::EnvFilter;

fn build_terrain(config: &SimConfig) -> terrasim::Result<GridHandle> {
    let table = TileKind::table().with_table([
        ("grass", TileKind::new(true).with_color([0.3, 0.7, 0.2])),
        ("rock", TileKind::new(false).with_color([0.5, 0.5, 0.5])),
        ("mud", TileKind::new(true).with_walk_cost(4.0).with_color([0.4, 0.3, 0.2])),
    ]);
    let mut grid = GridWorld::builder(config.grid.segments)
        .scale(config.grid.scale)
        .offset(config.grid.offset)
        .height_fn(|_, _, u, v| 0.05 * ((u * 6.0).sin() + (v * 4.0).cos()))
        .layer(TILE, LayerSpec::new(LayerKind::U8).default_record("grass").lookup(table))
        .layer(MALLEABILITY, LayerSpec::new(LayerKind::F32).default_value(0.5))
        .color_fn(|cell| cell.tile(TILE).map_or([1.0, 0.0, 0.5], |t| t.color))
        .build()?;

    // A rock ridge with a gap, and a mud patch beside it.
    let n = config.grid.segments as i32;
    let rock = grid.layer::<u8>(TILE)?.table().and_then(|t| t.index_for_name("rock"));
    let mud = grid.layer::<u8>(TILE)?.table().and_then(|t| t.index_for_name("mud"));
    grid.edit_batch(|batch| -> terrasim::Result<()> {
        if let Some(rock) = rock {
            for y in (0..n).filter(|y| (y - n / 2).abs() > 3) {
                batch.set_layer_sc(TILE, n / 2, y, rock as u8)?;
            }
        }
        if let Some(mud) = mud {
            for y in n / 4..n / 2 {
                for x in n / 4..n / 2 {
                    batch.set_layer_sc(TILE, x, y, mud as u8)?;
                }
            }
        }
        Ok(())
    })?;
    grid.set_layer_sc(MALLEABILITY, 0, 0, 0.0f32, MeshSync::Auto)?;
    Ok(GridHandle::new(grid))
}

fn main() -> terrasim::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    println!("=== Terrasim - Simulation Demo ===\n");

    let config = SimConfig::default();
    let grid = build_terrain(&config)?;
    let mut sim = SimWorld::with_config(config);

    sim.push_actor(TerrainActor::new(grid.clone()));
    for i in 0..4 {
        sim.push_actor(Wanderer::new(grid.clone(), 4 + i * 6, 8).with_id(format!("walker-{i}")));
    }
    sim.push_actor(TerrainMorph::height(grid.clone()).with_id("drift"));
    sim.push_actor(TerrainMorph::average(grid.clone()).with_id("smooth"));

    println!("Running simulation for 300 frames (10 seconds at 30 frames/sec)...\n");
    for _ in 0..10 {
        sim.step(1.0);
        let handoff = sim.take_render_handoff();
        println!(
            "--- Tick {} (t={:.1}s) --- promoted={} removed={} dirty_surfaces={}",
            sim.current_tick(),
            sim.current_time(),
            handoff.added.len(),
            handoff.removed.len(),
            handoff.dirty_surfaces.len()
        );
        print_snapshot(&sim);
    }

    if let Some(key) = sim.select_by_id("walker-0") {
        sim.remove_actor(key)?;
        sim.run_frame();
        println!("\nRemoved walker-0, {} actors remain", sim.snapshot().actors.len());
    }

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", sim.snapshot().to_json_pretty()?);
    Ok(())
}

fn print_snapshot(sim: &SimWorld) {
    for actor in sim.snapshot().actors {
        let Some(pos) = actor.position else {
            continue;
        };
        println!(
            "    {:<8} pos=({:.1}, {:.1}, {:.2}) [{}]",
            actor.id.as_deref().unwrap_or("-"),
            pos.x,
            pos.y,
            pos.z,
            actor.state.as_deref().unwrap_or("idle")
        );
    }
}
