//! Session protocol: per-connection state machine over the presence registry.

pub mod handler;

pub use handler::{InboundEvent, SessionHandler, SessionState};
