//! Public API for the simulation.
//!
//! `SimWorld` owns the ECS world holding the actor registry and frame
//! resources, plus the schedule that runs one frame.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 30 Hz). When `step(dt)` is called,
//! the simulation accumulates time and runs fixed updates as needed. `run_frame()` runs exactly
//! one fixed update.
//!
//! ## Frame order
//!
//! Actors pushed during a frame become live at the start of the next one,
//! after removed actors are disposed. Each live actor's state machine is
//! resumed once, then every actor is updated, pinned actors are snapped to
//! the ground, and surface mesh changes are collected for the renderer.

use crate::actor::Actor;
use crate::config::SimConfig;
use crate::error::Result;
use crate::ground::GroundProviders;
use crate::registry::{ActorKey, ActorRegistry};
use crate::render_bridge::snapshot_to_flatbuffer;
use crate::rng::{SharedRng, SimRng};
use crate::systems::*;
use crate::world::Snapshot;
use bevy_ecs::prelude::*;

/// The main simulation world container.
///
/// Holds the ECS world and schedule, providing a clean API for:
/// - Registering and removing actors
/// - Stepping the simulation forward
/// - Extracting state snapshots and renderer changes
pub struct SimWorld {
    world: World,
    schedule: Schedule,
    tick: u64,
    time: f32,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
}

impl SimWorld {
    /// Create a new empty simulation world.
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Create a new simulation world with custom configuration.
    pub fn with_config(config: SimConfig) -> Self {
        let mut world = World::new();

        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(SimTick(0));
        world.insert_resource(ElapsedTime(0.0));
        world.insert_resource(SimRng::from_seed_u64(config.seed));
        world.insert_resource(config);
        world.insert_resource(ActorRegistry::default());
        world.insert_resource(GroundProviders::default());
        world.insert_resource(RenderHandoff::default());

        // Every phase touches the registry, so the frame is one chain.
        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                promote_pending_system,
                state_machine_system,
                actor_update_system,
                ground_pin_system,
                render_handoff_system,
            )
                .chain(),
        );

        Self {
            world,
            schedule,
            tick: 0,
            time: 0.0,
            time_accumulator: 0.0,
        }
    }

    /// Step the simulation forward by `dt` seconds.
    ///
    /// Uses fixed timestep internally - accumulates time and runs fixed updates
    /// as needed. Returns the number of frames run.
    pub fn step(&mut self, dt: f32) -> u32 {
        let fixed_dt = self.config().fixed_timestep;
        self.time_accumulator += dt;

        let mut frames = 0;
        while self.time_accumulator >= fixed_dt {
            self.fixed_update(fixed_dt);
            self.time_accumulator -= fixed_dt;
            frames += 1;
        }
        frames
    }

    /// Run exactly one frame.
    pub fn run_frame(&mut self) {
        let fixed_dt = self.config().fixed_timestep;
        self.fixed_update(fixed_dt);
    }

    /// Run a single fixed timestep update.
    fn fixed_update(&mut self, dt: f32) {
        self.world.resource_mut::<DeltaTime>().0 = dt;
        self.world.resource_mut::<SimTick>().increment();
        self.world.resource_mut::<ElapsedTime>().0 = self.time;

        tracing::trace!(tick = self.tick + 1, "frame start");
        self.schedule.run(&mut self.world);

        self.tick += 1;
        self.time += dt;
    }

    // ------------------------------------------------------------------------
    // Actors
    // ------------------------------------------------------------------------

    /// Register an actor. It becomes live at the start of the next frame.
    pub fn push_actor(&mut self, actor: impl Actor) -> ActorKey {
        self.registry_mut().push(actor)
    }

    pub fn push_boxed(&mut self, actor: Box<dyn Actor>) -> ActorKey {
        self.registry_mut().push_boxed(actor)
    }

    /// Remove a pending or live actor. Its `dispose` hook runs next frame.
    pub fn remove_actor(&mut self, key: ActorKey) -> Result<()> {
        self.registry_mut().remove(key)
    }

    /// Live actor with the given id.
    pub fn select_by_id(&mut self, id: &str) -> Option<ActorKey> {
        self.registry_mut().select_by_id(id)
    }

    pub fn actor(&self, key: ActorKey) -> Option<&dyn Actor> {
        self.registry().get(key)
    }

    pub fn actor_mut(&mut self, key: ActorKey) -> Option<&mut dyn Actor> {
        self.world
            .get_resource_mut::<ActorRegistry>()
            .map(Mut::into_inner)
            .and_then(|registry| registry.get_mut(key))
    }

    pub fn registry(&self) -> &ActorRegistry {
        self.world.resource::<ActorRegistry>()
    }

    fn registry_mut(&mut self) -> Mut<'_, ActorRegistry> {
        self.world.resource_mut::<ActorRegistry>()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Highest ground under (wx, wy) among live ground providers.
    pub fn ground_height(&self, wx: f32, wy: f32) -> Option<f32> {
        self.world.resource::<GroundProviders>().ground_height(wx, wy)
    }

    pub fn config(&self) -> &SimConfig {
        self.world.resource::<SimConfig>()
    }

    /// Handle to the simulation random stream.
    pub fn rng(&self) -> SharedRng {
        self.world.resource::<SimRng>().handle()
    }

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_world(&self.world, self.tick, self.time)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    /// Snapshot as the flat renderer buffer.
    pub fn render_buffer(&self) -> Vec<f32> {
        snapshot_to_flatbuffer(&self.snapshot())
    }

    /// Take the renderer changes accumulated since the last call.
    pub fn take_render_handoff(&mut self) -> RenderHandoff {
        std::mem::take(&mut *self.world.resource_mut::<RenderHandoff>())
    }

    /// Get the current tick number.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Get the elapsed simulation time.
    pub fn current_time(&self) -> f32 {
        self.time
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}
