//! Actor promotion and renderer handoff.
//!
//! `promote_pending_system` opens every frame: actors removed since the last
//! frame are disposed and their ground surfaces dropped, then pending actors
//! are initialized, given their state machines and made live.
//!
//! `render_handoff_system` closes the frame by collecting which surfaces
//! need their buffers re-uploaded.

use crate::actor::ActorEnv;
use crate::config::SimConfig;
use crate::ground::GroundProviders;
use crate::mesh::MeshDirty;
use crate::registry::{ActorKey, ActorRegistry};
use crate::rng::SimRng;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Changes the renderer has not picked up yet.
///
/// Accumulates across frames until taken, so several fixed updates inside
/// one `SimWorld::step` lose nothing.
#[derive(Resource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderHandoff {
    /// Actors promoted to live.
    pub added: Vec<ActorKey>,
    /// Actors disposed after removal.
    pub removed: Vec<ActorKey>,
    /// Surfaces whose mesh buffers changed, with the changed attributes.
    pub dirty_surfaces: Vec<(ActorKey, MeshDirty)>,
}

impl RenderHandoff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.dirty_surfaces.is_empty()
    }

    fn mark_dirty(&mut self, key: ActorKey, dirty: MeshDirty) {
        match self.dirty_surfaces.iter_mut().find(|(k, _)| *k == key) {
            Some((_, flags)) => {
                flags.positions |= dirty.positions;
                flags.normals |= dirty.normals;
                flags.colors |= dirty.colors;
                flags.indices |= dirty.indices;
            }
            None => self.dirty_surfaces.push((key, dirty)),
        }
    }
}

/// Dispose removed actors and promote pending ones.
///
/// ## Data Access
/// - Reads: SimConfig, SimRng
/// - Writes: ActorRegistry, GroundProviders, RenderHandoff
pub fn promote_pending_system(
    config: Res<SimConfig>,
    rng: Res<SimRng>,
    mut registry: ResMut<ActorRegistry>,
    mut grounds: ResMut<GroundProviders>,
    mut handoff: ResMut<RenderHandoff>,
) {
    let shared = rng.handle();
    let env = ActorEnv {
        config: &config,
        rng: &shared,
    };
    let promotion = registry.promote(&env);

    for key in &promotion.disposed {
        grounds.unregister(*key);
    }
    for key in &promotion.added {
        if let Some(ground) = registry.get(*key).and_then(|a| a.ground()) {
            grounds.register(*key, ground);
        }
    }

    if !promotion.added.is_empty() || !promotion.disposed.is_empty() {
        tracing::debug!(
            added = promotion.added.len(),
            disposed = promotion.disposed.len(),
            live = registry.live_len(),
            "promoted actors"
        );
    }
    handoff.added.extend(promotion.added);
    handoff.removed.extend(promotion.disposed);
}

/// Collect surfaces whose meshes changed this frame.
pub fn render_handoff_system(registry: Res<ActorRegistry>, mut handoff: ResMut<RenderHandoff>) {
    for entry in registry.iter() {
        let Some(surface) = entry.actor().surface() else {
            continue;
        };
        let dirty = surface.write().take_mesh_dirty();
        if let Some(dirty) = dirty.filter(MeshDirty::any) {
            handoff.mark_dirty(entry.key(), dirty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::TerrainActor;
    use crate::grid::{GridHandle, GridWorld, MeshSync, HEIGHT};

    fn world_with_resources() -> World {
        let mut world = World::new();
        world.insert_resource(SimConfig::default());
        world.insert_resource(SimRng::default());
        world.insert_resource(ActorRegistry::default());
        world.insert_resource(GroundProviders::default());
        world.insert_resource(RenderHandoff::default());
        world
    }

    #[test]
    fn test_promotion_registers_ground() {
        let mut world = world_with_resources();
        let grid = GridHandle::new(GridWorld::new(4, 4.0).unwrap());
        let key = world
            .resource_mut::<ActorRegistry>()
            .push(TerrainActor::new(grid));

        let mut schedule = Schedule::default();
        schedule.add_systems(promote_pending_system);
        schedule.run(&mut world);

        assert_eq!(world.resource::<GroundProviders>().len(), 1);
        assert_eq!(world.resource::<RenderHandoff>().added, vec![key]);

        world.resource_mut::<ActorRegistry>().remove(key).unwrap();
        schedule.run(&mut world);
        assert!(world.resource::<GroundProviders>().is_empty());
        assert_eq!(world.resource::<RenderHandoff>().removed, vec![key]);
    }

    #[test]
    fn test_dirty_surface_reported_once() {
        let mut world = world_with_resources();
        let grid = GridHandle::new(GridWorld::new(4, 4.0).unwrap());
        let key = world
            .resource_mut::<ActorRegistry>()
            .push(TerrainActor::new(grid.clone()));

        let mut schedule = Schedule::default();
        schedule.add_systems((promote_pending_system, render_handoff_system).chain());
        schedule.run(&mut world);

        // Building the mesh marks everything dirty.
        let handoff = std::mem::take(&mut *world.resource_mut::<RenderHandoff>());
        assert_eq!(handoff.dirty_surfaces, vec![(key, MeshDirty::ALL)]);

        schedule.run(&mut world);
        assert!(world.resource::<RenderHandoff>().dirty_surfaces.is_empty());

        grid.write()
            .set_layer_sc(HEIGHT, 1, 1, 3.0f32, MeshSync::Auto)
            .unwrap();
        schedule.run(&mut world);
        let dirty = &world.resource::<RenderHandoff>().dirty_surfaces;
        assert_eq!(dirty.len(), 1);
        assert!(dirty[0].1.positions);
    }
}
