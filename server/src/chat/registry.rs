//! In-memory directory of who is online under which name.
//!
//! Maps connection identity to the username it registered. Usernames are not
//! unique; lookups by name resolve duplicates deterministically, earliest
//! registration first.

use std::collections::HashMap;

use crate::ws::ConnectionId;

#[derive(Debug, Clone)]
struct RegistryEntry {
    username: String,
    /// Order of the most recent registration of this connection
    registered_seq: u64,
}

/// Connection id -> username. Not synchronized; the relay owns it behind its lock.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<ConnectionId, RegistryEntry>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the username for a connection.
    /// Returns the previous username if the connection was already registered.
    ///
    /// A re-registration counts as a fresh claim: it moves the connection to the
    /// back of the registration order.
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        username: impl Into<String>,
    ) -> Option<String> {
        let registered_seq = self.next_seq;
        self.next_seq += 1;

        self.entries
            .insert(
                connection_id,
                RegistryEntry {
                    username: username.into(),
                    registered_seq,
                },
            )
            .map(|previous| previous.username)
    }

    /// Remove a connection's entry. No-op for connections that never registered.
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<String> {
        self.entries.remove(connection_id).map(|entry| entry.username)
    }

    /// Resolve a username to a connection. When several connections share the
    /// name, the one registered earliest wins.
    pub fn find_connection_by_username(&self, username: &str) -> Option<ConnectionId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.username == username)
            .min_by_key(|(_, entry)| entry.registered_seq)
            .map(|(connection_id, _)| *connection_id)
    }

    /// Current usernames in registration order. Duplicates are kept.
    pub fn list_usernames(&self) -> Vec<String> {
        let mut entries: Vec<&RegistryEntry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.registered_seq);
        entries.into_iter().map(|entry| entry.username.clone()).collect()
    }

    pub fn username_of(&self, connection_id: &ConnectionId) -> Option<&str> {
        self.entries
            .get(connection_id)
            .map(|entry| entry.username.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
