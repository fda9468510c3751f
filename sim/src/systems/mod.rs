//! ECS systems that make up one simulation frame.
//!
//! Every frame runs the same chain, in this order:
//!
//! 1. `promote_pending_system` - dispose removed actors, promote pending ones
//! 2. `state_machine_system` - one scheduling step per live state machine
//! 3. `actor_update_system` - per-actor `update`
//! 4. `ground_pin_system` - snap pinned actors to the ground
//! 5. `render_handoff_system` - collect mesh changes for the renderer
//!
//! All systems touch `ActorRegistry` mutably, so the chain is sequential.

pub mod behavior;
pub mod clock;
pub mod lifecycle;

pub use behavior::*;
pub use clock::*;
pub use lifecycle::*;
