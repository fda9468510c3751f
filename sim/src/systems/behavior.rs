//! Per-frame actor logic: behaviors, updates and ground pinning.
//!
//! These run in a fixed order after promotion:
//! 1. `state_machine_system` resumes each live actor's state machine once
//! 2. `actor_update_system` calls each live actor's `update`
//! 3. `ground_pin_system` snaps pinned actors to the world ground height

use super::clock::{DeltaTime, ElapsedTime, SimTick};
use crate::actor::FrameInfo;
use crate::ground::GroundProviders;
use crate::registry::ActorRegistry;
use bevy_ecs::prelude::*;

/// Advance every live state machine by one scheduling step.
pub fn state_machine_system(mut registry: ResMut<ActorRegistry>) {
    registry.step_behaviors();
}

/// Run each live actor's per-frame update.
pub fn actor_update_system(
    tick: Res<SimTick>,
    dt: Res<DeltaTime>,
    elapsed: Res<ElapsedTime>,
    mut registry: ResMut<ActorRegistry>,
) {
    let frame = FrameInfo {
        frame: tick.0,
        time: elapsed.0,
        dt: dt.0,
    };
    tracing::trace!(frame = frame.frame, live = registry.live_len(), "actor update");
    registry.update_actors(&frame);
}

/// Keep pinned actors on the highest ground under them.
pub fn ground_pin_system(grounds: Res<GroundProviders>, mut registry: ResMut<ActorRegistry>) {
    if grounds.is_empty() {
        return;
    }
    registry.pin_to_ground(&grounds);
}
