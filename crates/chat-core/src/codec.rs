//! JSON wire codec for chat events.
//!
//! Two framings are supported, both carried in WebSocket text frames:
//!
//! - [`WireFormat::Events`]: Socket.IO-style `["<event>", <payload>]` arrays,
//!   e.g. `["chat_message", {"text": "hi"}]`.
//! - [`WireFormat::Frames`]: the raw fallback, a flat object tagged with
//!   `type` in `{join, chat, typing, online, system}`.
//!
//! Inbound payloads are coerced rather than rejected: a non-string name or
//! text decodes as `""` and `isTyping` follows JSON truthiness. Validation of
//! the resulting strings is the session handler's job.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::{ChatError, ChatResult};
use crate::messages::{ClientEvent, NoticeKind, ServerEvent, SystemNotice};

/// Which framing a connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Events,
    Frames,
}

impl WireFormat {
    /// Upgrade path that selects the raw fallback framing.
    pub const FRAMES_PATH: &'static str = "/ws";
    /// Upgrade path clients use for event framing (any other path works too).
    pub const EVENTS_PATH: &'static str = "/socket";

    /// Pick the framing from the WebSocket upgrade request path.
    pub fn from_path(path: &str) -> Self {
        if path.trim_end_matches('/') == Self::FRAMES_PATH {
            Self::Frames
        } else {
            Self::Events
        }
    }

    /// Parse a user-facing name (`events` or `frames`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "events" | "event" => Some(Self::Events),
            "frames" | "frame" | "raw" => Some(Self::Frames),
            _ => None,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::Events => Self::EVENTS_PATH,
            Self::Frames => Self::FRAMES_PATH,
        }
    }
}

// ── Server -> client ──────────────────────────────────────────────────

/// Encode an outbound event as a text frame.
pub fn encode_server(format: WireFormat, event: &ServerEvent) -> ChatResult<String> {
    let value = match format {
        WireFormat::Events => json!([event.name(), server_payload(event)?]),
        WireFormat::Frames => server_frame(event)?,
    };
    Ok(serde_json::to_string(&value)?)
}

fn server_payload(event: &ServerEvent) -> ChatResult<Value> {
    Ok(match event {
        ServerEvent::Joined { name } => json!({ "name": name }),
        ServerEvent::ChatMessage(msg) => serde_json::to_value(msg)?,
        ServerEvent::SystemMessage(notice) => serde_json::to_value(notice)?,
        ServerEvent::Typing(state) => serde_json::to_value(state)?,
        ServerEvent::OnlineCount { count } => json!({ "count": count }),
        ServerEvent::ErrorMessage(text) => Value::String(text.clone()),
    })
}

fn server_frame(event: &ServerEvent) -> ChatResult<Value> {
    Ok(match event {
        ServerEvent::Joined { name } => json!({ "type": "join", "name": name }),
        ServerEvent::ChatMessage(msg) => tagged("chat", serde_json::to_value(msg)?),
        ServerEvent::SystemMessage(notice) => json!({
            "type": "system",
            "kind": notice.kind.as_str(),
            "text": notice.text,
        }),
        ServerEvent::Typing(state) => tagged("typing", serde_json::to_value(state)?),
        ServerEvent::OnlineCount { count } => json!({ "type": "online", "count": count }),
        ServerEvent::ErrorMessage(text) => json!({
            "type": "system",
            "kind": NoticeKind::Error.as_str(),
            "text": text,
        }),
    })
}

/// Decode an outbound event (client side).
pub fn decode_server(format: WireFormat, text: &str) -> ChatResult<ServerEvent> {
    let value: Value = serde_json::from_str(text)?;
    match format {
        WireFormat::Events => {
            let (name, payload) = split_event(&value)?;
            match name {
                "joined" => Ok(ServerEvent::Joined {
                    name: required_str(payload.get("name"), "joined.name")?,
                }),
                "chat_message" => Ok(ServerEvent::ChatMessage(from_payload(payload)?)),
                "system_message" => Ok(ServerEvent::SystemMessage(from_payload(payload)?)),
                "typing" => Ok(ServerEvent::Typing(from_payload(payload)?)),
                "online_count" => Ok(ServerEvent::OnlineCount {
                    count: required_count(payload.get("count"))?,
                }),
                "error_message" => Ok(ServerEvent::ErrorMessage(required_str(
                    Some(payload),
                    "error_message",
                )?)),
                other => Err(ChatError::UnknownEvent(other.to_string())),
            }
        }
        WireFormat::Frames => {
            let (tag, obj) = split_frame(&value)?;
            match tag {
                "join" => Ok(ServerEvent::Joined {
                    name: required_str(obj.get("name"), "join.name")?,
                }),
                "chat" => Ok(ServerEvent::ChatMessage(from_payload(&value)?)),
                "typing" => Ok(ServerEvent::Typing(from_payload(&value)?)),
                "online" => Ok(ServerEvent::OnlineCount {
                    count: required_count(obj.get("count"))?,
                }),
                "system" => {
                    let kind: NoticeKind = from_payload(obj.get("kind").unwrap_or(&NULL))?;
                    let text = required_str(obj.get("text"), "system.text")?;
                    Ok(match kind {
                        NoticeKind::Error => ServerEvent::ErrorMessage(text),
                        kind => ServerEvent::SystemMessage(SystemNotice { kind, text }),
                    })
                }
                other => Err(ChatError::UnknownEvent(other.to_string())),
            }
        }
    }
}

// ── Client -> server ──────────────────────────────────────────────────

/// Decode an inbound text frame.
///
/// Fails on malformed JSON, a wrong frame shape, or an unknown event name;
/// payload fields themselves are coerced and never cause a failure.
pub fn decode_client(format: WireFormat, text: &str) -> ChatResult<ClientEvent> {
    let value: Value = serde_json::from_str(text)?;
    match format {
        WireFormat::Events => {
            let (name, payload) = split_event(&value)?;
            match name {
                "join" => Ok(ClientEvent::Join {
                    name: coerce_str(Some(payload)),
                }),
                "chat_message" => Ok(ClientEvent::ChatMessage {
                    text: coerce_str(payload.get("text")),
                }),
                "typing" => Ok(ClientEvent::Typing {
                    is_typing: truthy(payload),
                }),
                other => Err(ChatError::UnknownEvent(other.to_string())),
            }
        }
        WireFormat::Frames => {
            let (tag, obj) = split_frame(&value)?;
            match tag {
                "join" => Ok(ClientEvent::Join {
                    name: coerce_str(obj.get("name")),
                }),
                "chat" => Ok(ClientEvent::ChatMessage {
                    text: coerce_str(obj.get("text")),
                }),
                "typing" => Ok(ClientEvent::Typing {
                    is_typing: obj.get("isTyping").is_some_and(truthy),
                }),
                other => Err(ChatError::UnknownEvent(other.to_string())),
            }
        }
    }
}

/// Encode an inbound event (client side).
pub fn encode_client(format: WireFormat, event: &ClientEvent) -> ChatResult<String> {
    let value = match (format, event) {
        (WireFormat::Events, ClientEvent::Join { name }) => json!(["join", name]),
        (WireFormat::Events, ClientEvent::ChatMessage { text }) => {
            json!(["chat_message", { "text": text }])
        }
        (WireFormat::Events, ClientEvent::Typing { is_typing }) => json!(["typing", is_typing]),
        (WireFormat::Frames, ClientEvent::Join { name }) => json!({ "type": "join", "name": name }),
        (WireFormat::Frames, ClientEvent::ChatMessage { text }) => {
            json!({ "type": "chat", "text": text })
        }
        (WireFormat::Frames, ClientEvent::Typing { is_typing }) => {
            json!({ "type": "typing", "isTyping": is_typing })
        }
    };
    Ok(serde_json::to_string(&value)?)
}

// ── Helpers ───────────────────────────────────────────────────────────

static NULL: Value = Value::Null;

fn split_event(value: &Value) -> ChatResult<(&str, &Value)> {
    let items = value
        .as_array()
        .ok_or_else(|| ChatError::InvalidMessage("expected [event, payload] array".into()))?;
    let name = items
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| ChatError::InvalidMessage("missing event name".into()))?;
    Ok((name, items.get(1).unwrap_or(&NULL)))
}

fn split_frame(value: &Value) -> ChatResult<(&str, &Map<String, Value>)> {
    let obj = value
        .as_object()
        .ok_or_else(|| ChatError::InvalidMessage("expected JSON object frame".into()))?;
    let tag = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ChatError::InvalidMessage("missing frame type".into()))?;
    Ok((tag, obj))
}

fn tagged(tag: &str, mut value: Value) -> Value {
    if let Value::Object(ref mut obj) = value {
        obj.insert("type".into(), Value::String(tag.into()));
    }
    value
}

fn coerce_str(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn required_str(value: Option<&Value>, field: &str) -> ChatResult<String> {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChatError::InvalidMessage(format!("{field} must be a string")))
}

fn required_count(value: Option<&Value>) -> ChatResult<usize> {
    value
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| ChatError::InvalidMessage("count must be a non-negative integer".into()))
}

fn from_payload<T: DeserializeOwned>(value: &Value) -> ChatResult<T> {
    Ok(T::deserialize(value)?)
}
