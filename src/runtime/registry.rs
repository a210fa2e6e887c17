//! Registry of authenticated connections.
//!
//! Maps a connection handle (the slab key the event loop uses as its mio
//! token) to the identity committed by the login handshake. The event loop
//! is the only writer during normal operation, but the registry is shared
//! with [`ServerHandle`](super::ServerHandle) so it can be inspected from
//! other threads while the loop runs.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Handle of an accepted connection.
pub type ConnectionId = usize;

/// Thread-safe handle ↔ identity map. Cloning shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<RwLock<BTreeMap<ConnectionId, String>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `identity` for `handle`.
    ///
    /// Returns `false` and leaves the existing entry untouched if the
    /// handle is already registered. Identities are not required to be
    /// unique across handles.
    pub fn register(&self, handle: ConnectionId, identity: &str) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(&handle) {
            return false;
        }
        entries.insert(handle, identity.to_string());
        true
    }

    /// Remove `handle`, returning its identity if it was registered.
    pub fn deregister(&self, handle: ConnectionId) -> Option<String> {
        self.entries.write().remove(&handle)
    }

    pub fn identity(&self, handle: ConnectionId) -> Option<String> {
        self.entries.read().get(&handle).cloned()
    }

    pub fn contains(&self, handle: ConnectionId) -> bool {
        self.entries.read().contains_key(&handle)
    }

    /// Snapshot of registered handles in ascending order.
    pub fn handles(&self) -> Vec<ConnectionId> {
        self.entries.read().keys().copied().collect()
    }

    /// Snapshot of `(handle, identity)` pairs in ascending handle order.
    pub fn entries(&self) -> Vec<(ConnectionId, String)> {
        self.entries
            .read()
            .iter()
            .map(|(handle, id)| (*handle, id.clone()))
            .collect()
    }

    /// Snapshot of registered identities in handle order.
    pub fn identities(&self) -> Vec<String> {
        self.entries.read().values().cloned().collect()
    }

    /// Number of handles registered under `identity`.
    pub fn count_identity(&self, identity: &str) -> usize {
        self.entries
            .read()
            .values()
            .filter(|id| id.as_str() == identity)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
