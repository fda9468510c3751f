//! Simulation configuration.
//!
//! `SimConfig` is inserted into the ECS world as a resource and can be loaded
//! from JSON. Missing fields fall back to their defaults.

use crate::error::Result;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Tuning for the pathfinding behavior fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfindConfig {
    /// Searches farther than this (in cells) go through an intermediate point.
    pub max_search_distance: f32,
    /// Frames between path steps.
    pub move_delay: u32,
    /// Inclusive-exclusive range of frames spent "thinking" before picking a target.
    pub think_frames: (i32, i32),
    /// Prefix for the fragment's state names.
    pub prefix: String,
}

impl Default for PathfindConfig {
    fn default() -> Self {
        Self {
            max_search_distance: 100.0,
            move_delay: 0,
            think_frames: (5, 10),
            prefix: "pathfind.".to_string(),
        }
    }
}

impl PathfindConfig {
    /// Defaults used by actors walking a `GridWorld`.
    pub fn world() -> Self {
        Self {
            move_delay: 6,
            ..Self::default()
        }
    }
}

/// Shape of the demo terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub segments: usize,
    pub scale: f32,
    pub offset: [f32; 3],
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            segments: 64,
            scale: 64.0,
            offset: [0.0; 3],
        }
    }
}

/// Configuration for the simulation.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 1/30 = 0.0333 for 30 Hz).
    pub fixed_timestep: f32,
    /// Seed for the simulation RNG.
    pub seed: u64,
    /// Node expansions per frame for each in-flight path search. 0 finishes
    /// every search in the frame that requests it.
    pub path_budget: usize,
    pub pathfind: PathfindConfig,
    pub grid: GridConfig,
    /// Edge cost per unit of height climbed.
    pub climb_cost_factor: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0,
            seed: crate::rng::DEFAULT_SEED,
            path_budget: 0,
            pathfind: PathfindConfig::world(),
            grid: GridConfig::default(),
            climb_cost_factor: 10.0,
        }
    }
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.path_budget, 0);
        assert_eq!(config.pathfind.move_delay, 6);
        assert_eq!(config.pathfind.max_search_distance, 100.0);
        assert_eq!(PathfindConfig::default().move_delay, 0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimConfig::from_json_str(r#"{"seed": 7, "grid": {"segments": 16}}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.grid.segments, 16);
        assert_eq!(config.grid.scale, 64.0);
        assert_eq!(config.pathfind.prefix, "pathfind.");
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = SimConfig::default();
        config.path_budget = 32;
        let json = config.to_json_pretty().unwrap();
        assert_eq!(SimConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = SimConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, crate::error::SimError::Config(_)));
    }
}
