//! Presence registry: who is online.
//!
//! Maps each joined connection to its display name. The registry is the
//! only source of the online count; it is owned by the session handler and
//! mutated only from the serialized event path.

use chat_core::ConnectionId;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// A joined connection.
#[derive(Debug, Clone)]
pub struct Participant {
    pub connection_id: ConnectionId,
    /// Validated, non-empty display name. Not unique across participants.
    pub display_name: String,
    /// When the connection (last) joined.
    pub joined_at: Instant,
}

/// Registry of joined participants, keyed by connection.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    participants: HashMap<ConnectionId, Participant>,
}

impl PresenceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the participant for `connection_id`.
    ///
    /// `display_name` must already be validated. Re-adding the same
    /// connection replaces its name without changing the size.
    pub fn add(&mut self, connection_id: ConnectionId, display_name: String) {
        debug!(conn = %connection_id, name = %display_name, "participant added");
        self.participants.insert(
            connection_id,
            Participant {
                connection_id,
                display_name,
                joined_at: Instant::now(),
            },
        );
    }

    /// Remove and return the participant for `connection_id`, if any.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Participant> {
        let removed = self.participants.remove(&connection_id);
        if removed.is_some() {
            debug!(conn = %connection_id, "participant removed");
        }
        removed
    }

    /// Look up a participant.
    pub fn get(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants.get(&connection_id)
    }

    /// Number of joined participants.
    pub fn size(&self) -> usize {
        self.participants.len()
    }

    /// All participants, ordered by connection id.
    pub fn list(&self) -> Vec<Participant> {
        let mut all: Vec<Participant> = self.participants.values().cloned().collect();
        all.sort_by_key(|p| p.connection_id);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get() {
        let mut registry = PresenceRegistry::new();
        registry.add(ConnectionId(1), "Ann".into());
        assert_eq!(registry.size(), 1);
        assert_eq!(registry.get(ConnectionId(1)).unwrap().display_name, "Ann");
        assert!(registry.get(ConnectionId(2)).is_none());
    }

    #[test]
    fn rejoin_overwrites_name_without_double_counting() {
        let mut registry = PresenceRegistry::new();
        registry.add(ConnectionId(1), "Ann".into());
        registry.add(ConnectionId(1), "Anna".into());
        assert_eq!(registry.size(), 1);
        assert_eq!(registry.get(ConnectionId(1)).unwrap().display_name, "Anna");
    }

    #[test]
    fn duplicate_names_are_separate_participants() {
        let mut registry = PresenceRegistry::new();
        registry.add(ConnectionId(1), "Ann".into());
        registry.add(ConnectionId(2), "Ann".into());
        assert_eq!(registry.size(), 2);
    }

    #[test]
    fn remove_returns_prior_entry() {
        let mut registry = PresenceRegistry::new();
        registry.add(ConnectionId(3), "Bob".into());
        let removed = registry.remove(ConnectionId(3)).unwrap();
        assert_eq!(removed.display_name, "Bob");
        assert_eq!(registry.size(), 0);
    }

    #[test]
    fn remove_absent_is_none() {
        let mut registry = PresenceRegistry::new();
        assert!(registry.remove(ConnectionId(9)).is_none());
    }

    #[test]
    fn list_is_ordered_by_connection() {
        let mut registry = PresenceRegistry::new();
        registry.add(ConnectionId(5), "Eve".into());
        registry.add(ConnectionId(2), "Bob".into());
        registry.add(ConnectionId(7), "Zed".into());
        let names: Vec<String> = registry.list().into_iter().map(|p| p.display_name).collect();
        assert_eq!(names, vec!["Bob", "Eve", "Zed"]);
    }
}
