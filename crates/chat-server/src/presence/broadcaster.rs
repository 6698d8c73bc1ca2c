//! Broadcaster: addressing rules for outbound events.
//!
//! Wraps an injected [`Transport`] with the three delivery scopes the
//! session handler needs, plus online-count publication.

use crate::transport::Transport;
use chat_core::{ConnectionId, ServerEvent};
use std::sync::Arc;
use tracing::trace;

/// Fans events out to one, all-but-one, or all connections.
#[derive(Clone)]
pub struct Broadcaster {
    transport: Arc<dyn Transport>,
}

impl Broadcaster {
    /// Create a broadcaster over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Deliver to every connected endpoint, joined or not.
    pub fn to_all(&self, event: &ServerEvent) {
        trace!(event = event.name(), "broadcast to all");
        self.transport.send_to_all(event, None);
    }

    /// Deliver to every connection except `connection_id`.
    pub fn to_others(&self, connection_id: ConnectionId, event: &ServerEvent) {
        trace!(event = event.name(), except = %connection_id, "broadcast to others");
        self.transport.send_to_all(event, Some(connection_id));
    }

    /// Deliver to exactly one connection.
    pub fn to_one(&self, connection_id: ConnectionId, event: ServerEvent) {
        trace!(event = event.name(), conn = %connection_id, "send to one");
        self.transport.send_to(connection_id, event);
    }

    /// Publish the current online count to everyone.
    pub fn publish_online_count(&self, count: usize) {
        self.to_all(&ServerEvent::OnlineCount { count });
    }
}
