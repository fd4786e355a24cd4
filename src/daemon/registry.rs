
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// What the server knows about one connected peer
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// Active sessions keyed by the peer's `ip:port`
///
/// Cloning shares the underlying map. All access goes through a single
/// mutex; critical sections are a map insert or remove.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a newly accepted peer. The entry lives as long as the guard.
    pub fn register(&self, peer: SocketAddr) -> SessionGuard {
        let handle = SessionHandle {
            id: Uuid::new_v4(),
            peer,
            connected_at: Utc::now(),
        };
        let key = peer.to_string();
        let id = handle.id;

        self.lock().insert(key.clone(), handle);

        SessionGuard {
            registry: self.clone(),
            key,
            id,
        }
    }

    fn remove(&self, key: &str, id: Uuid) -> Option<SessionHandle> {
        let mut sessions = self.lock();
        match sessions.get(key) {
            Some(handle) if handle.id == id => sessions.remove(key),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<SessionHandle> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn peers(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}

/// Removes its registry entry when dropped
#[derive(Debug)]
pub struct SessionGuard {
    registry: SessionRegistry,
    key: String,
    id: Uuid,
}

impl SessionGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.key, self.id);
    }
}
