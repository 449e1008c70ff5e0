use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::Session;

/// Where sessions live between requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: &Session);

    /// Returns the session stored under `id`, or `None` if it is unknown or
    /// expired.
    async fn load(&self, id: &str) -> Option<Session>;

    async fn remove(&self, id: &str);

    /// Drops every expired session and returns how many were dropped.
    async fn remove_expired(&self) -> usize;
}

/// Keeps session handles in a concurrent map.
///
/// Because the stored value is the handle itself, mutations made through a
/// resolved [`Session`] are visible here without saving.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn save(&self, session: &Session) {
        self.sessions.insert(session.id().to_owned(), session.clone());
    }

    async fn load(&self, id: &str) -> Option<Session> {
        let expired = match self.sessions.get(id) {
            Some(entry) if !entry.is_expired() => return Some(entry.value().clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            trace!(session_id = id, "dropping expired session on load");
            self.sessions.remove_if(id, |_, session| session.is_expired());
        }
        None
    }

    async fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }

    async fn remove_expired(&self) -> usize {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = !session.is_expired();
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}
