//! Turn hub events into terminal lines.

use chat_core::{NoticeKind, ServerEvent};
use chrono::DateTime;

/// Per-session rendering state.
#[derive(Debug, Default)]
pub struct Renderer {
    /// Name the hub acknowledged for this client, once joined.
    own_name: Option<String>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn own_name(&self) -> Option<&str> {
        self.own_name.as_deref()
    }

    /// Render one event, or `None` when it should not be shown.
    pub fn render(&mut self, event: &ServerEvent) -> Option<String> {
        match event {
            ServerEvent::Joined { name } => {
                self.own_name = Some(name.clone());
                Some(format!("* joined as {name}"))
            }
            ServerEvent::ChatMessage(msg) => {
                let marker = if self.is_own(&msg.author) {
                    " (you)"
                } else {
                    ""
                };
                Some(format!(
                    "[{}] {}{marker}: {}",
                    clock(msg.ts),
                    msg.author,
                    msg.text
                ))
            }
            ServerEvent::SystemMessage(notice) => Some(match notice.kind {
                NoticeKind::Error => format!("! {}", notice.text),
                _ => format!("* {}", notice.text),
            }),
            ServerEvent::Typing(state) => {
                if self.is_own(&state.name) {
                    return None;
                }
                Some(if state.is_typing {
                    format!("… {} is typing", state.name)
                } else {
                    format!("… {} stopped typing", state.name)
                })
            }
            ServerEvent::OnlineCount { count } => Some(format!("* online: {count}")),
            ServerEvent::ErrorMessage(text) => Some(format!("! {text}")),
        }
    }

    fn is_own(&self, name: &str) -> bool {
        self.own_name.as_deref() == Some(name)
    }
}

/// `HH:MM` (UTC) for a millisecond timestamp.
fn clock(ts: i64) -> String {
    DateTime::from_timestamp_millis(ts)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}
