//! Terrasim - Simulation Core
//!
//! A mutable grid-world simulation: layered height grids with an
//! incrementally synced surface mesh, weighted A* over grid cells, and a
//! cooperative state-machine scheduler that drives actor behavior one step
//! per frame. Uses `bevy_ecs` for resources and the frame schedule.

pub mod actor;
pub mod api;
pub mod behaviors;
pub mod config;
pub mod error;
pub mod grid;
pub mod ground;
pub mod layer;
pub mod lookup;
pub mod mesh;
pub mod pathfinder;
pub mod registry;
pub mod render_bridge;
pub mod rng;
pub mod state_machine;
pub mod systems;
pub mod tiles;
pub mod world;

pub use actor::{Actor, ActorEnv, FrameInfo, Position, TerrainActor};
pub use api::SimWorld;
pub use config::{GridConfig, PathfindConfig, SimConfig};
pub use error::{Result, SimError};
pub use grid::{GridHandle, GridWorld, MeshSync, HEIGHT};
pub use ground::{GroundHeight, GroundProviders};
pub use layer::{Layer, LayerKind, LayerSpec};
pub use lookup::LookupTable;
pub use mesh::{MeshDirty, SurfaceMesh};
pub use pathfinder::{Cell, PathfinderGraph, SearchStatus};
pub use registry::{ActorKey, ActorRegistry};
pub use rng::{SharedRng, SimRng};
pub use state_machine::{Arg, StateMachine, StateMap, Step};
pub use systems::*;
pub use tiles::{TileKind, TileOverride};
pub use world::Snapshot;
