//! Behavior state sets for the cooperative scheduler.
//!
//! - `pathfind`: generic `target` / `moveLoop` / `move` fragment
//! - `world_pathfind`: the fragment bound to a `GridWorld`, plus a wandering actor
//! - `terrain_morph`: actors that reshape terrain under a moving brush

pub mod pathfind;
pub mod terrain_morph;
pub mod world_pathfind;

pub use pathfind::{PathSearch, PathfindFragment, SearchSpace};
pub use terrain_morph::{MorphKind, TerrainMorph, MALLEABILITY};
pub use world_pathfind::{world_pathfinder, Wanderer, WorldPathfinder, TILE};
