//! Ground height aggregation.
//!
//! Several surfaces can act as ground at once (terrain plus a water plane,
//! for instance). The world ground height at a point is the maximum over all
//! providers that cover that point.

use crate::registry::ActorKey;
use bevy_ecs::prelude::*;
use std::sync::Arc;

/// Something that reports a ground height at world coordinates.
pub trait GroundHeight: Send + Sync {
    /// `None` when the point is outside this provider.
    fn ground_height(&self, wx: f32, wy: f32) -> Option<f32>;
}

impl<F> GroundHeight for F
where
    F: Fn(f32, f32) -> Option<f32> + Send + Sync,
{
    fn ground_height(&self, wx: f32, wy: f32) -> Option<f32> {
        self(wx, wy)
    }
}

/// Registered ground providers, keyed by the actor that exposed them.
#[derive(Resource, Default, Clone)]
pub struct GroundProviders {
    providers: Vec<(ActorKey, Arc<dyn GroundHeight>)>,
}

impl GroundProviders {
    pub fn register(&mut self, key: ActorKey, provider: Arc<dyn GroundHeight>) {
        self.providers.push((key, provider));
    }

    pub fn unregister(&mut self, key: ActorKey) {
        self.providers.retain(|(k, _)| *k != key);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Highest ground at (wx, wy), or `None` if no provider covers it.
    pub fn ground_height(&self, wx: f32, wy: f32) -> Option<f32> {
        self.providers
            .iter()
            .filter_map(|(_, p)| p.ground_height(wx, wy))
            .fold(None, |max, z| match max {
                Some(m) if m >= z => Some(m),
                _ => Some(z),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(z: f32, extent: f32) -> Arc<dyn GroundHeight> {
        Arc::new(move |wx: f32, wy: f32| {
            (wx.abs() <= extent && wy.abs() <= extent).then_some(z)
        })
    }

    #[test]
    fn test_empty_has_no_ground() {
        let grounds = GroundProviders::default();
        assert_eq!(grounds.ground_height(0.0, 0.0), None);
    }

    #[test]
    fn test_max_of_covering_providers() {
        let mut grounds = GroundProviders::default();
        grounds.register(ActorKey(1), plane(2.0, 10.0));
        grounds.register(ActorKey(2), plane(5.0, 1.0));
        assert_eq!(grounds.ground_height(0.0, 0.0), Some(5.0));
        // Only the wide plane covers this point.
        assert_eq!(grounds.ground_height(4.0, 0.0), Some(2.0));
        assert_eq!(grounds.ground_height(40.0, 0.0), None);
    }

    #[test]
    fn test_unregister() {
        let mut grounds = GroundProviders::default();
        grounds.register(ActorKey(1), plane(2.0, 10.0));
        grounds.register(ActorKey(2), plane(5.0, 10.0));
        grounds.unregister(ActorKey(2));
        assert_eq!(grounds.len(), 1);
        assert_eq!(grounds.ground_height(0.0, 0.0), Some(2.0));
    }
}
