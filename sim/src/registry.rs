//! Actor registry.
//!
//! Owns every actor and its state machine. Actors move through three lists:
//!
//! - `added`: pushed since the last promotion, not yet visible to iteration
//! - `live`: promoted, updated every frame
//! - `removed`: taken out by `remove`, disposed at the next promotion
//!
//! An actor's state machine lives in its entry, so a removed actor's routine
//! can never be resumed again.

use crate::actor::{Actor, ActorEnv, ActorMachine, FrameInfo};
use crate::error::{Result, SimError};
use crate::ground::GroundProviders;
use crate::state_machine::StateMachine;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable handle to a registered actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorKey(pub u64);

pub struct ActorEntry {
    key: ActorKey,
    actor: Box<dyn Actor>,
    machine: Option<ActorMachine>,
}

impl ActorEntry {
    pub fn key(&self) -> ActorKey {
        self.key
    }

    pub fn actor(&self) -> &dyn Actor {
        self.actor.as_ref()
    }

    pub fn actor_mut(&mut self) -> &mut dyn Actor {
        self.actor.as_mut()
    }

    pub fn machine(&self) -> Option<&ActorMachine> {
        self.machine.as_ref()
    }
}

/// Result of one promotion step.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub added: Vec<ActorKey>,
    pub disposed: Vec<ActorKey>,
}

#[derive(Resource, Default)]
pub struct ActorRegistry {
    next_key: u64,
    added: Vec<ActorEntry>,
    live: Vec<ActorEntry>,
    removed: Vec<ActorEntry>,
    /// First registrant of each id.
    claimed: HashMap<String, ActorKey>,
    /// Live id lookups.
    id_cache: HashMap<String, ActorKey>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an actor. It becomes live at the next promotion.
    pub fn push(&mut self, actor: impl Actor) -> ActorKey {
        self.push_boxed(Box::new(actor))
    }

    pub fn push_boxed(&mut self, actor: Box<dyn Actor>) -> ActorKey {
        let key = ActorKey(self.next_key);
        self.next_key += 1;

        if let Some(id) = actor.id() {
            match self.claimed.get(id) {
                Some(first) => {
                    tracing::warn!(
                        id,
                        ?first,
                        ?key,
                        "actor id already registered, keeping the first"
                    );
                }
                None => {
                    self.claimed.insert(id.to_string(), key);
                }
            }
        }

        self.added.push(ActorEntry {
            key,
            actor,
            machine: None,
        });
        key
    }

    /// Take an actor out of the pending and live lists.
    pub fn remove(&mut self, key: ActorKey) -> Result<()> {
        let added_pos = self.added.iter().position(|e| e.key == key);
        let live_pos = self.live.iter().position(|e| e.key == key);

        let entry = match (added_pos, live_pos) {
            (Some(i), None) => self.added.remove(i),
            (None, Some(i)) => self.live.remove(i),
            _ => {
                tracing::error!(?key, "did not remove exactly one actor");
                return Err(SimError::ActorNotFound(key));
            }
        };

        if let Some(id) = entry.actor.id() {
            if self.claimed.get(id) == Some(&key) {
                self.claimed.remove(id);
            }
            if self.id_cache.get(id) == Some(&key) {
                self.id_cache.remove(id);
            }
        }
        self.removed.push(entry);
        Ok(())
    }

    /// Live actor with the given id. Pending actors are not visible.
    pub fn select_by_id(&mut self, id: &str) -> Option<ActorKey> {
        if let Some(key) = self.id_cache.get(id) {
            return Some(*key);
        }

        let key = match self.claimed.get(id) {
            Some(first) if self.live.iter().any(|e| e.key == *first) => Some(*first),
            _ => self
                .live
                .iter()
                .find(|e| e.actor.id() == Some(id))
                .map(|e| e.key),
        }?;
        self.id_cache.insert(id.to_string(), key);
        Some(key)
    }

    /// Dispose removed actors, then initialize and go live with pending ones.
    pub fn promote(&mut self, env: &ActorEnv<'_>) -> Promotion {
        let mut promotion = Promotion::default();

        for mut entry in self.removed.drain(..) {
            entry.actor.dispose();
            promotion.disposed.push(entry.key);
        }

        for mut entry in std::mem::take(&mut self.added) {
            entry.actor.init(env);
            if let Some(states) = entry.actor.behavior(env) {
                match StateMachine::new(states) {
                    Ok(machine) => entry.machine = Some(machine),
                    Err(err) => {
                        tracing::error!(
                            key = ?entry.key,
                            id = ?entry.actor.id(),
                            %err,
                            "actor behavior not started"
                        );
                    }
                }
            }
            promotion.added.push(entry.key);
            self.live.push(entry);
        }

        promotion
    }

    /// Resume every live state machine once.
    pub fn step_behaviors(&mut self) {
        for entry in &mut self.live {
            if let Some(machine) = entry.machine.as_mut() {
                machine.update(&mut entry.actor);
            }
        }
    }

    pub fn update_actors(&mut self, frame: &FrameInfo) {
        for entry in &mut self.live {
            entry.actor.update(frame);
        }
    }

    /// Snap pinned actors onto the highest ground under them.
    pub fn pin_to_ground(&mut self, grounds: &GroundProviders) {
        for entry in &mut self.live {
            if !entry.actor.pin_to_ground() {
                continue;
            }
            let key = entry.key;
            let Some(pos) = entry.actor.position_mut() else {
                tracing::error!(?key, "pin_to_ground set on an actor without a position");
                continue;
            };
            if let Some(z) = grounds.ground_height(pos.x, pos.y) {
                if z != pos.z {
                    pos.z = z;
                }
            }
        }
    }

    /// Live or pending actor.
    pub fn get(&self, key: ActorKey) -> Option<&dyn Actor> {
        self.entry(key).map(ActorEntry::actor)
    }

    pub fn get_mut(&mut self, key: ActorKey) -> Option<&mut dyn Actor> {
        self.live
            .iter_mut()
            .chain(self.added.iter_mut())
            .find(|e| e.key == key)
            .map(ActorEntry::actor_mut)
    }

    pub fn entry(&self, key: ActorKey) -> Option<&ActorEntry> {
        self.live
            .iter()
            .chain(self.added.iter())
            .find(|e| e.key == key)
    }

    pub fn is_live(&self, key: ActorKey) -> bool {
        self.live.iter().any(|e| e.key == key)
    }

    /// Live entries in promotion order.
    pub fn iter(&self) -> impl Iterator<Item = &ActorEntry> {
        self.live.iter()
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    pub fn pending_len(&self) -> usize {
        self.added.len()
    }

    pub fn removed_len(&self) -> usize {
        self.removed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorStates, Position};
    use crate::config::SimConfig;
    use crate::ground::GroundHeight;
    use crate::rng::SharedRng;
    use crate::state_machine::Step;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Hooks {
        inits: AtomicUsize,
        updates: AtomicUsize,
        disposed: AtomicUsize,
    }

    #[derive(Default)]
    struct Probe {
        id: Option<String>,
        pos: Option<Position>,
        pinned: bool,
        hooks: Arc<Hooks>,
        counting: bool,
    }

    impl Probe {
        fn named(id: &str) -> Self {
            Self {
                id: Some(id.to_string()),
                ..Self::default()
            }
        }
    }

    impl Actor for Probe {
        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }

        fn position(&self) -> Option<&Position> {
            self.pos.as_ref()
        }

        fn position_mut(&mut self) -> Option<&mut Position> {
            self.pos.as_mut()
        }

        fn pin_to_ground(&self) -> bool {
            self.pinned
        }

        fn init(&mut self, _env: &ActorEnv<'_>) {
            self.hooks.inits.fetch_add(1, Ordering::SeqCst);
        }

        fn behavior(&mut self, _env: &ActorEnv<'_>) -> Option<ActorStates> {
            if !self.counting {
                return None;
            }
            Some(ActorStates::new().state("start", |_| {
                |actor: &mut Box<dyn Actor>| {
                    if let Some(pos) = actor.position_mut() {
                        pos.x += 1.0;
                    }
                    Step::Yield
                }
            }))
        }

        fn update(&mut self, _frame: &FrameInfo) {
            self.hooks.updates.fetch_add(1, Ordering::SeqCst);
        }

        fn dispose(&mut self) {
            self.hooks.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn promote(registry: &mut ActorRegistry) -> Promotion {
        let config = SimConfig::default();
        let rng = SharedRng::default();
        registry.promote(&ActorEnv { config: &config, rng: &rng })
    }

    #[test]
    fn test_pushed_actor_live_next_frame() {
        let mut registry = ActorRegistry::new();
        let key = registry.push(Probe::named("a"));
        assert_eq!(registry.iter().count(), 0);
        assert_eq!(registry.select_by_id("a"), None);

        let promotion = promote(&mut registry);
        assert_eq!(promotion.added, vec![key]);
        assert_eq!(registry.iter().count(), 1);
        assert_eq!(registry.select_by_id("a"), Some(key));
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let mut registry = ActorRegistry::new();
        let first = registry.push(Probe::named("dup"));
        let second = registry.push(Probe::named("dup"));
        promote(&mut registry);
        assert_eq!(registry.live_len(), 2);
        assert_eq!(registry.select_by_id("dup"), Some(first));

        // Once the first is gone the other becomes reachable.
        registry.remove(first).unwrap();
        assert_eq!(registry.select_by_id("dup"), Some(second));
    }

    #[test]
    fn test_remove_pending_and_live() {
        let mut registry = ActorRegistry::new();
        let live = registry.push(Probe::named("live"));
        promote(&mut registry);
        let pending = registry.push(Probe::named("pending"));

        assert_eq!(registry.select_by_id("live"), Some(live));
        registry.remove(live).unwrap();
        registry.remove(pending).unwrap();
        assert_eq!(registry.live_len(), 0);
        assert_eq!(registry.pending_len(), 0);
        assert_eq!(registry.removed_len(), 2);
        assert_eq!(registry.select_by_id("live"), None);
    }

    #[test]
    fn test_remove_twice_is_error() {
        let mut registry = ActorRegistry::new();
        let key = registry.push(Probe::default());
        registry.remove(key).unwrap();
        assert!(matches!(registry.remove(key), Err(SimError::ActorNotFound(k)) if k == key));
    }

    #[test]
    fn test_dispose_runs_at_next_promotion() {
        let hooks = Arc::new(Hooks::default());
        let mut registry = ActorRegistry::new();
        let key = registry.push(Probe {
            hooks: hooks.clone(),
            ..Probe::default()
        });
        promote(&mut registry);
        registry.remove(key).unwrap();
        assert_eq!(hooks.disposed.load(Ordering::SeqCst), 0);

        let promotion = promote(&mut registry);
        assert_eq!(promotion.disposed, vec![key]);
        assert_eq!(hooks.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(registry.removed_len(), 0);
    }

    #[test]
    fn test_behavior_stepped_once_per_frame() {
        let mut registry = ActorRegistry::new();
        let key = registry.push(Probe {
            pos: Some(Position::default()),
            counting: true,
            ..Probe::default()
        });
        promote(&mut registry);
        for _ in 0..3 {
            registry.step_behaviors();
            registry.update_actors(&FrameInfo::default());
        }
        let actor = registry.get(key).unwrap();
        assert_eq!(actor.position().map(|p| p.x), Some(3.0));
    }

    #[test]
    fn test_removed_actor_not_resumed() {
        let mut registry = ActorRegistry::new();
        let key = registry.push(Probe {
            pos: Some(Position::default()),
            counting: true,
            ..Probe::default()
        });
        promote(&mut registry);
        registry.step_behaviors();
        registry.remove(key).unwrap();
        registry.step_behaviors();
        assert!(registry.get(key).is_none());
        assert!(!registry.is_live(key));
    }

    #[test]
    fn test_pin_to_ground() {
        let mut grounds = GroundProviders::default();
        let flat: Arc<dyn GroundHeight> = Arc::new(|_: f32, _: f32| Some(3.0));
        grounds.register(ActorKey(99), flat);

        let mut registry = ActorRegistry::new();
        let pinned = registry.push(Probe {
            pos: Some(Position::new(1.0, 1.0, 0.0)),
            pinned: true,
            ..Probe::default()
        });
        let free = registry.push(Probe {
            pos: Some(Position::new(1.0, 1.0, 0.0)),
            ..Probe::default()
        });
        // Pinned without a position is logged and skipped.
        registry.push(Probe {
            pinned: true,
            ..Probe::default()
        });
        promote(&mut registry);
        registry.pin_to_ground(&grounds);

        assert_eq!(registry.get(pinned).and_then(|a| a.position()).map(|p| p.z), Some(3.0));
        assert_eq!(registry.get(free).and_then(|a| a.position()).map(|p| p.z), Some(0.0));
    }

    #[test]
    fn test_init_and_update_hooks() {
        let hooks = Arc::new(Hooks::default());
        let mut registry = ActorRegistry::new();
        registry.push(Probe {
            hooks: hooks.clone(),
            ..Probe::default()
        });
        // Pending actors are not updated.
        registry.update_actors(&FrameInfo::default());
        assert_eq!(hooks.updates.load(Ordering::SeqCst), 0);

        promote(&mut registry);
        registry.update_actors(&FrameInfo::default());
        registry.update_actors(&FrameInfo::default());
        promote(&mut registry);
        assert_eq!(hooks.inits.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.updates.load(Ordering::SeqCst), 2);
    }
}
