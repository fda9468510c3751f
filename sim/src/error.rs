//! Error types for the simulation core.
//!
//! Only caller mistakes surface as `SimError`. Out-of-range coordinates are
//! routine near the grid edge and come back as `None`, and a pathfinding
//! search that cannot reach its goal returns the best partial path instead.

use crate::registry::ActorKey;
use thiserror::Error;

/// Errors raised by misuse of the simulation API.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown layer '{0}'")]
    UnknownLayer(String),

    #[error("layer '{layer}' stores {found:?}, not {expected:?}")]
    LayerTypeMismatch {
        layer: String,
        expected: crate::layer::LayerKind,
        found: crate::layer::LayerKind,
    },

    #[error("layer '{0}' already exists")]
    DuplicateLayer(String),

    #[error("layer '{0}' has no lookup table")]
    MissingLookup(String),

    #[error("unknown lookup record '{0}'")]
    UnknownRecord(String),

    #[error("state map has no 'start' state")]
    MissingStartState,

    #[error("actor {0:?} is not registered")]
    ActorNotFound(ActorKey),

    #[error("grid needs at least one segment per side")]
    InvalidSegments,

    #[error("flat buffer holds {actual} values, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, SimError>;
