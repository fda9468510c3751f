//! Pathfinding bound to a `GridWorld`.
//!
//! Costs come from the grid itself:
//! - walkable: the `tile` layer record's `walkable` flag (open when the grid
//!   has no tile layer)
//! - base cost: the tile record's walk cost
//! - edge cost: `climb_cost_factor` per unit of height climbed; descending is free
//!
//! Actors are located by `coord_w2s` of their position and each step moves
//! them to the center of the next cell.

use super::pathfind::PathfindFragment;
use crate::actor::{Actor, ActorEnv, ActorStates, Position};
use crate::config::SimConfig;
use crate::grid::{GridHandle, GridWorld};
use crate::pathfinder::{Cell, PathfinderGraph};
use crate::rng::SharedRng;
use crate::state_machine::{Step, START_STATE};
use crate::tiles::TileKind;

/// Name of the tile classification layer.
pub const TILE: &str = "tile";

pub type WorldPathfinder = PathfindFragment<GridHandle, Box<dyn Actor>>;

fn tile_at(grid: &GridWorld, sx: i32, sy: i32) -> Option<&TileKind> {
    let index = grid.coord_s2i(sx, sy)?;
    grid.layers().get(TILE)?.lookup_index(index)
}

/// A* graph over a grid's cells.
pub fn world_graph(segments: usize, climb_cost_factor: f32) -> PathfinderGraph<GridWorld> {
    PathfinderGraph::<GridWorld>::new(segments, segments)
        .with_walkable(|grid, x, y| tile_at(grid, x, y).map_or(true, |t| t.walkable))
        .with_base_cost(|grid, (x, y)| tile_at(grid, x, y).map_or(0.0, TileKind::cost))
        .with_edge_cost(move |grid, from: Cell, to: Cell| {
            match (grid.coord_s2i(from.0, from.1), grid.coord_s2i(to.0, to.1)) {
                (Some(a), Some(b)) => {
                    let heights = grid.heights();
                    (climb_cost_factor * (heights[b] - heights[a])).max(0.0)
                }
                _ => 0.0,
            }
        })
}

/// Pathfinding states for actors walking on `grid`.
pub fn world_pathfinder(grid: &GridHandle, config: &SimConfig, rng: SharedRng) -> WorldPathfinder {
    let segments = grid.read().segments();
    let graph = world_graph(segments, config.climb_cost_factor);

    let locate = grid.clone();
    let place = grid.clone();
    PathfindFragment::new(
        grid.clone(),
        graph,
        move |actor: &Box<dyn Actor>| {
            let pos = actor.position()?;
            locate.read().coord_w2s(pos.x, pos.y)
        },
        move |actor: &mut Box<dyn Actor>, (sx, sy): Cell| {
            let (wx, wy) = place.read().coord_s2w(sx, sy);
            if let Some(pos) = actor.position_mut() {
                pos.x = wx;
                pos.y = wy;
            }
        },
    )
    .with_rng(rng)
    .with_options(config.pathfind.clone())
    .with_path_budget(config.path_budget)
}

// ============================================================================
// Wanderer
// ============================================================================

/// Actor that walks between random walkable cells forever.
pub struct Wanderer {
    id: Option<String>,
    position: Position,
    grid: GridHandle,
}

impl Wanderer {
    /// Starts at the center of cell (`sx`, `sy`).
    pub fn new(grid: GridHandle, sx: i32, sy: i32) -> Self {
        let (x, y) = grid.read().coord_s2w(sx, sy);
        Self {
            id: None,
            position: Position::new(x, y, 0.0),
            grid,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl Actor for Wanderer {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn position(&self) -> Option<&Position> {
        Some(&self.position)
    }

    fn position_mut(&mut self) -> Option<&mut Position> {
        Some(&mut self.position)
    }

    fn pin_to_ground(&self) -> bool {
        true
    }

    fn behavior(&mut self, env: &ActorEnv<'_>) -> Option<ActorStates> {
        let fragment = world_pathfinder(&self.grid, env.config, env.rng.clone());
        let target = fragment.target_state();
        let mut states = fragment.states();
        states.insert(START_STATE, move |_| {
            let target = target.clone();
            move |_: &mut Box<dyn Actor>| Step::goto(target.clone())
        });
        Some(states)
    }
}
