//! Frame clock resources.

use bevy_ecs::prelude::*;

/// Global simulation frame counter.
/// Increments once per fixed update, before the schedule runs.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Resource containing the delta time for the current frame.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct DeltaTime(pub f32);

/// Simulation time elapsed before the current frame, in seconds.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct ElapsedTime(pub f32);
