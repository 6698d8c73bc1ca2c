//! chat-core: Shared protocol library for the chat hub.
//!
//! Provides the inbound/outbound event types, the two JSON wire formats
//! (Socket.IO-style event frames and the raw `{type, ...}` fallback),
//! input validation, and message id generation.

pub mod codec;
pub mod error;
pub mod id;
pub mod messages;
pub mod validate;

// Re-export commonly used items at crate root.
pub use codec::WireFormat;
pub use error::{ChatError, ChatResult};
pub use id::generate_message_id;
pub use messages::{
    ChatMessage, ClientEvent, ConnectionId, NoticeKind, ServerEvent, SystemNotice, TypingState,
};
pub use validate::{normalize_text, validate_name, validate_system_text, validate_text};
