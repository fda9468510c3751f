//! Actors and their optional capabilities.
//!
//! An actor is any object the frame loop drives. Capabilities are opt-in
//! trait methods with empty defaults: an actor that has no position simply
//! keeps `position()` returning `None`.
//!
//! Lifecycle hooks run in this order:
//! 1. `init` when the actor is promoted to the live list
//! 2. `behavior` right after `init`, to build its state machine
//! 3. `update` once per live frame
//! 4. `dispose` at the first promotion step after removal

use crate::config::SimConfig;
use crate::ground::GroundHeight;
use crate::grid::GridHandle;
use crate::rng::SharedRng;
use crate::state_machine::{StateMachine, StateMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// World-space position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Shared services available while an actor is being set up.
pub struct ActorEnv<'a> {
    pub config: &'a SimConfig,
    pub rng: &'a SharedRng,
}

/// Per-frame timing handed to `Actor::update`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInfo {
    pub frame: u64,
    /// Elapsed simulation time in seconds.
    pub time: f32,
    pub dt: f32,
}

/// Behavior states bound to an actor. Routines receive the owning actor.
pub type ActorStates = StateMap<Box<dyn Actor>>;

pub type ActorMachine = StateMachine<Box<dyn Actor>>;

pub trait Actor: Send + Sync + 'static {
    /// Unique name used by `select_by_id`.
    fn id(&self) -> Option<&str> {
        None
    }

    fn position(&self) -> Option<&Position> {
        None
    }

    fn position_mut(&mut self) -> Option<&mut Position> {
        None
    }

    /// Snap `position.z` to the world ground height after each update.
    fn pin_to_ground(&self) -> bool {
        false
    }

    /// Ground surface contributed to the world ground height.
    fn ground(&self) -> Option<Arc<dyn GroundHeight>> {
        None
    }

    /// Renderable grid whose mesh changes are reported to the renderer.
    fn surface(&self) -> Option<&GridHandle> {
        None
    }

    fn init(&mut self, _env: &ActorEnv<'_>) {}

    /// States for this actor's state machine. Must contain `start`.
    fn behavior(&mut self, _env: &ActorEnv<'_>) -> Option<ActorStates> {
        None
    }

    fn update(&mut self, _frame: &FrameInfo) {}

    fn dispose(&mut self) {}
}

// ============================================================================
// Terrain actor
// ============================================================================

/// Places a `GridWorld` in the frame loop as ground and render surface.
pub struct TerrainActor {
    id: String,
    grid: GridHandle,
}

impl TerrainActor {
    pub const DEFAULT_ID: &'static str = "terrain";

    pub fn new(grid: GridHandle) -> Self {
        Self {
            id: Self::DEFAULT_ID.to_string(),
            grid,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn grid(&self) -> &GridHandle {
        &self.grid
    }
}

impl Actor for TerrainActor {
    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn ground(&self) -> Option<Arc<dyn GroundHeight>> {
        if !self.grid.read().is_ground() {
            return None;
        }
        Some(Arc::new(self.grid.clone()))
    }

    fn surface(&self) -> Option<&GridHandle> {
        Some(&self.grid)
    }

    fn init(&mut self, _env: &ActorEnv<'_>) {
        self.grid.write().ensure_mesh();
    }
}
