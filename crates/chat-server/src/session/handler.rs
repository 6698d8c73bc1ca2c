//! Per-connection protocol state machine.
//!
//! Every inbound event for every connection goes through
//! [`SessionHandler::dispatch`]. The server holds the handler behind a single
//! mutex, so one event's registry mutation and all of its broadcasts finish
//! before the next event starts.
//!
//! ```text
//! Unjoined --join(ok)--> Joined --disconnect--> Closed
//!    |  \--join(bad)--> Unjoined (error notice)
//!    \--disconnect--> Closed
//! ```

use crate::presence::{Broadcaster, Participant, PresenceRegistry};
use chat_core::{
    validate_name, validate_system_text, validate_text, ChatError, ChatMessage, ChatResult,
    ClientEvent, ConnectionId, NoticeKind, ServerEvent, SystemNotice, TypingState,
};
use std::collections::HashMap;
use tracing::{debug, error, info};

/// Sent when a join carries an empty or invalid name.
pub const INVALID_NAME_NOTICE: &str = "Некорректное имя пользователя.";
/// Sent when a chat message arrives before a successful join.
pub const JOIN_REQUIRED_NOTICE: &str = "Сначала введите имя.";
/// Sent when handling an event fails unexpectedly.
pub const INTERNAL_ERROR_NOTICE: &str = "Внутренняя ошибка сервера.";

/// Protocol state of an open connection.
///
/// `Closed` has no variant: a closed connection's entry is discarded and
/// later events for its id are ignored. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unjoined,
    Joined,
}

/// Everything the transport can report about a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Transport accepted the connection.
    Connect,
    /// Decoded client event.
    Client(ClientEvent),
    /// Transport closed the connection.
    Disconnect { reason: String },
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Client(ev) => ev.name(),
            Self::Disconnect { .. } => "disconnect",
        }
    }
}

/// Owns session states and the presence registry.
pub struct SessionHandler {
    sessions: HashMap<ConnectionId, SessionState>,
    registry: PresenceRegistry,
    broadcaster: Broadcaster,
}

impl SessionHandler {
    /// Create a handler that publishes through `broadcaster`.
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self {
            sessions: HashMap::new(),
            registry: PresenceRegistry::new(),
            broadcaster,
        }
    }

    /// Handle one event to completion.
    ///
    /// Failures are logged and answered with a generic error notice to the
    /// originating connection; they never reach other connections.
    pub fn dispatch(&mut self, connection_id: ConnectionId, event: InboundEvent) {
        let name = event.name();
        if let Err(e) = self.handle_event(connection_id, event) {
            error!(conn = %connection_id, event = name, error = %e, "event handling failed");
            self.broadcaster.to_one(
                connection_id,
                ServerEvent::ErrorMessage(INTERNAL_ERROR_NOTICE.to_string()),
            );
        }
    }

    /// Current state of a connection; `None` once closed (or never opened).
    pub fn state(&self, connection_id: ConnectionId) -> Option<SessionState> {
        self.sessions.get(&connection_id).copied()
    }

    /// Number of joined participants.
    pub fn online_count(&self) -> usize {
        self.registry.size()
    }

    /// Snapshot of joined participants.
    pub fn participants(&self) -> Vec<Participant> {
        self.registry.list()
    }

    /// Number of open connections, joined or not.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn handle_event(&mut self, connection_id: ConnectionId, event: InboundEvent) -> ChatResult<()> {
        match event {
            InboundEvent::Connect => self.on_connect(connection_id),
            InboundEvent::Client(client) => {
                let Some(state) = self.state(connection_id) else {
                    debug!(
                        conn = %connection_id,
                        event = client.name(),
                        "event for closed connection ignored"
                    );
                    return Ok(());
                };
                match client {
                    ClientEvent::Join { name } => self.on_join(connection_id, &name),
                    ClientEvent::ChatMessage { text } => {
                        self.on_chat_message(connection_id, state, &text)
                    }
                    ClientEvent::Typing { is_typing } => {
                        self.on_typing(connection_id, state, is_typing)
                    }
                }
            }
            InboundEvent::Disconnect { reason } => self.on_disconnect(connection_id, &reason),
        }
    }

    fn on_connect(&mut self, connection_id: ConnectionId) -> ChatResult<()> {
        if self.sessions.contains_key(&connection_id) {
            return Err(ChatError::Internal(format!(
                "connection {connection_id} opened twice"
            )));
        }
        self.sessions.insert(connection_id, SessionState::Unjoined);
        debug!(conn = %connection_id, "session opened");
        Ok(())
    }

    fn on_join(&mut self, connection_id: ConnectionId, raw_name: &str) -> ChatResult<()> {
        let Some(name) = validate_name(raw_name) else {
            debug!(conn = %connection_id, "join rejected: invalid name");
            self.broadcaster.to_one(
                connection_id,
                ServerEvent::ErrorMessage(INVALID_NAME_NOTICE.to_string()),
            );
            return Ok(());
        };

        self.registry.add(connection_id, name.clone());
        self.sessions.insert(connection_id, SessionState::Joined);

        let notice = SystemNotice {
            kind: NoticeKind::Join,
            text: validate_system_text(&format!("{name} присоединился к чату")),
        };
        self.broadcaster.to_others(connection_id, &ServerEvent::SystemMessage(notice));
        self.broadcaster.to_one(connection_id, ServerEvent::Joined { name: name.clone() });
        self.broadcaster.publish_online_count(self.registry.size());

        info!(
            conn = %connection_id,
            name = %name,
            online = self.registry.size(),
            "participant joined"
        );
        Ok(())
    }

    fn on_chat_message(
        &mut self,
        connection_id: ConnectionId,
        state: SessionState,
        raw_text: &str,
    ) -> ChatResult<()> {
        if state != SessionState::Joined {
            self.broadcaster.to_one(
                connection_id,
                ServerEvent::ErrorMessage(JOIN_REQUIRED_NOTICE.to_string()),
            );
            return Ok(());
        }
        let Some(text) = validate_text(raw_text) else {
            debug!(conn = %connection_id, "empty chat message dropped");
            return Ok(());
        };

        let author = self.joined_name(connection_id)?;
        let message = ChatMessage::new(author, text);
        debug!(conn = %connection_id, id = %message.id, "chat message");
        self.broadcaster.to_all(&ServerEvent::ChatMessage(message));
        Ok(())
    }

    fn on_typing(
        &mut self,
        connection_id: ConnectionId,
        state: SessionState,
        is_typing: bool,
    ) -> ChatResult<()> {
        if state != SessionState::Joined {
            return Ok(());
        }
        let name = self.joined_name(connection_id)?;
        self.broadcaster.to_all(&ServerEvent::Typing(TypingState {
            name,
            is_typing,
            id: connection_id,
        }));
        Ok(())
    }

    fn on_disconnect(&mut self, connection_id: ConnectionId, reason: &str) -> ChatResult<()> {
        if self.sessions.remove(&connection_id).is_none() {
            debug!(conn = %connection_id, "disconnect for unknown connection");
            return Ok(());
        }

        match self.registry.remove(connection_id) {
            Some(participant) => {
                let notice = SystemNotice {
                    kind: NoticeKind::Leave,
                    text: validate_system_text(&format!(
                        "{} покинул чат",
                        participant.display_name
                    )),
                };
                self.broadcaster.to_others(connection_id, &ServerEvent::SystemMessage(notice));
                self.broadcaster.publish_online_count(self.registry.size());
                info!(
                    conn = %connection_id,
                    name = %participant.display_name,
                    reason = %reason,
                    stayed_secs = participant.joined_at.elapsed().as_secs(),
                    online = self.registry.size(),
                    "participant left"
                );
            }
            None => debug!(conn = %connection_id, reason = %reason, "unjoined connection closed"),
        }
        Ok(())
    }

    fn joined_name(&self, connection_id: ConnectionId) -> ChatResult<String> {
        self.registry
            .get(connection_id)
            .map(|p| p.display_name.clone())
            .ok_or_else(|| {
                ChatError::Internal(format!(
                    "joined connection {connection_id} missing from registry"
                ))
            })
    }
}
