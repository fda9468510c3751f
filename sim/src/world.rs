//! Snapshot types.
//!
//! The `Snapshot` struct provides a serializable view of the live actors and
//! the pending renderer changes, for clients that visualize the simulation.

use crate::actor::Position;
use crate::registry::{ActorEntry, ActorRegistry};
use crate::systems::RenderHandoff;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// State of one live actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub key: u64,
    pub id: Option<String>,
    /// Current behavior state, if the actor has a running state machine.
    pub state: Option<String>,
    pub position: Option<Position>,
    pub has_behavior: bool,
    pub is_ground: bool,
}

impl ActorSnapshot {
    fn from_entry(entry: &ActorEntry) -> Self {
        let actor = entry.actor();
        let machine = entry.machine();
        Self {
            key: entry.key().0,
            id: actor.id().map(str::to_string),
            state: machine.and_then(|m| m.current_state()).map(str::to_string),
            position: actor.position().copied(),
            has_behavior: machine.is_some_and(|m| !m.is_finished()),
            is_ground: actor.ground().is_some(),
        }
    }
}

/// Complete simulation state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f32,
    /// Live actors in promotion order.
    pub actors: Vec<ActorSnapshot>,
    /// Actors promoted since the renderer last took the handoff.
    pub added: Vec<u64>,
    /// Actors disposed since the renderer last took the handoff.
    pub removed: Vec<u64>,
    /// Surfaces whose mesh buffers need re-uploading.
    pub dirty_surfaces: Vec<u64>,
}

impl Snapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &World, tick: u64, time: f32) -> Self {
        let actors = world
            .get_resource::<ActorRegistry>()
            .map(|registry| registry.iter().map(ActorSnapshot::from_entry).collect())
            .unwrap_or_default();

        let mut snapshot = Self {
            tick,
            time,
            actors,
            ..Default::default()
        };
        if let Some(handoff) = world.get_resource::<RenderHandoff>() {
            snapshot.added = handoff.added.iter().map(|k| k.0).collect();
            snapshot.removed = handoff.removed.iter().map(|k| k.0).collect();
            snapshot.dirty_surfaces = handoff.dirty_surfaces.iter().map(|(k, _)| k.0).collect();
        }
        snapshot
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty JSON string (for debugging).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ActorEnv, TerrainActor};
    use crate::config::SimConfig;
    use crate::grid::{GridHandle, GridWorld};
    use crate::registry::ActorKey;
    use crate::rng::SharedRng;

    struct Marker(Position);

    impl Actor for Marker {
        fn id(&self) -> Option<&str> {
            Some("marker")
        }

        fn position(&self) -> Option<&Position> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_empty_world_snapshot() {
        let world = World::new();
        let snapshot = Snapshot::from_world(&world, 3, 0.1);
        assert_eq!(snapshot.tick, 3);
        assert!(snapshot.actors.is_empty());
    }

    #[test]
    fn test_snapshot_lists_live_actors() {
        let mut registry = ActorRegistry::default();
        let grid = GridHandle::new(GridWorld::new(4, 4.0).unwrap());
        let terrain = registry.push(TerrainActor::new(grid));
        let marker = registry.push(Marker(Position::new(1.0, 2.0, 3.0)));
        let pending = registry.push(Marker(Position::default()));
        let config = SimConfig::default();
        let rng = SharedRng::default();
        registry.promote(&ActorEnv {
            config: &config,
            rng: &rng,
        });
        registry.remove(pending).unwrap();

        let mut world = World::new();
        world.insert_resource(registry);
        world.insert_resource(RenderHandoff {
            removed: vec![ActorKey(9)],
            ..Default::default()
        });
        let snapshot = Snapshot::from_world(&world, 1, 0.5);

        let keys: Vec<u64> = snapshot.actors.iter().map(|a| a.key).collect();
        assert_eq!(keys, vec![terrain.0, marker.0]);
        assert!(snapshot.actors[0].is_ground);
        assert_eq!(snapshot.actors[0].position, None);
        assert_eq!(snapshot.actors[1].id.as_deref(), Some("marker"));
        assert_eq!(snapshot.actors[1].position, Some(Position::new(1.0, 2.0, 3.0)));
        assert!(!snapshot.actors[1].has_behavior);
        assert_eq!(snapshot.removed, vec![9]);
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = Snapshot {
            tick: 7,
            time: 0.25,
            actors: vec![ActorSnapshot {
                key: 2,
                id: Some("walker".into()),
                state: Some("pathfind.move".into()),
                position: Some(Position::new(0.5, 1.5, 0.0)),
                has_behavior: true,
                is_ground: false,
            }],
            ..Default::default()
        };
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("pathfind.move"));
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
