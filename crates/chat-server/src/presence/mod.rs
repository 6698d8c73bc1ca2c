//! Presence tracking: registry and broadcaster.

pub mod broadcaster;
pub mod registry;

pub use broadcaster::Broadcaster;
pub use registry::{Participant, PresenceRegistry};
