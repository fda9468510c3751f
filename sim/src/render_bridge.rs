//! Renderer bridge.
//!
//! Converts snapshots into a flat `f32` buffer that a renderer can consume
//! without parsing JSON. Surface meshes are not part of this buffer: a
//! renderer reads them from `GridWorld::mesh()` for the keys listed in
//! `Snapshot::dirty_surfaces`.
//!
//! # Buffer Layout (Version 1.0)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ HEADER (1 element)                                              │
//! │ [0] actor_count (as f32)                                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ For each actor i (offset = 1 + i * ACTOR_STRIDE):               │
//! │   [+0] key          - Actor key (u64 as f32)                    │
//! │   [+1] x            - X position (world units, NaN if none)     │
//! │   [+2] y            - Y position (world units, NaN if none)     │
//! │   [+3] z            - Z position (world units, NaN if none)     │
//! │   [+4] has_behavior - 1.0 while a state machine is running      │
//! │   [+5] is_ground    - 1.0 if the actor provides ground height   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Actors are written in snapshot order, so the same snapshot always
//! produces the same buffer.

use crate::error::{Result, SimError};
use crate::world::Snapshot;

/// Number of f32 values per actor.
pub const ACTOR_STRIDE: usize = 6;

/// Number of f32 values in the buffer header.
pub const HEADER_SIZE: usize = 1;

/// Offset within actor data for: key
pub const FIELD_KEY: usize = 0;
/// Offset within actor data for: X position
pub const FIELD_X: usize = 1;
/// Offset within actor data for: Y position
pub const FIELD_Y: usize = 2;
/// Offset within actor data for: Z position
pub const FIELD_Z: usize = 3;
/// Offset within actor data for: running behavior flag
pub const FIELD_HAS_BEHAVIOR: usize = 4;
/// Offset within actor data for: ground provider flag
pub const FIELD_IS_GROUND: usize = 5;

#[inline]
fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Convert a snapshot to the flat actor buffer.
pub fn snapshot_to_flatbuffer(snapshot: &Snapshot) -> Vec<f32> {
    let actor_count = snapshot.actors.len();
    let mut buffer = Vec::with_capacity(calculate_buffer_size(actor_count));
    buffer.push(actor_count as f32);

    for actor in &snapshot.actors {
        let [x, y, z] = actor
            .position
            .map_or([f32::NAN; 3], |p| [p.x, p.y, p.z]);
        buffer.extend_from_slice(&[
            actor.key as f32,
            x,
            y,
            z,
            flag(actor.has_behavior),
            flag(actor.is_ground),
        ]);
    }

    debug_assert_eq!(buffer.len(), calculate_buffer_size(actor_count));
    buffer
}

/// `HEADER_SIZE + actor_count * ACTOR_STRIDE`
#[inline]
pub fn calculate_buffer_size(actor_count: usize) -> usize {
    HEADER_SIZE + actor_count * ACTOR_STRIDE
}

/// Actor count from the header. `None` for an empty buffer.
#[inline]
pub fn parse_actor_count(buffer: &[f32]) -> Option<usize> {
    buffer.first().map(|count| *count as usize)
}

#[inline]
pub const fn actor_offset(actor_index: usize) -> usize {
    HEADER_SIZE + actor_index * ACTOR_STRIDE
}

/// Check that a buffer's length matches its header.
pub fn validate_buffer(buffer: &[f32]) -> Result<usize> {
    let count = parse_actor_count(buffer).unwrap_or(0);
    let expected = calculate_buffer_size(count);
    if buffer.len() != expected {
        return Err(SimError::BufferSizeMismatch {
            expected,
            actual: buffer.len(),
        });
    }
    Ok(count)
}
