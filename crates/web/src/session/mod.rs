//! Cookie-keyed sessions.
//!
//! [`SessionManager`] resolves the session of a request from its `Cookie`
//! header, refreshes or creates it, and answers with a `Set-Cookie` header.
//! The resolved [`Session`] is attached to the request's extensions for the
//! rest of the pipeline, see [`Session::from_request`].
//!
//! A [`Session`] is a cheap handle; clones share the same data. Mutations are
//! not written back by themselves: call [`Session::save`] (or
//! [`SessionManager::update_session`]) to persist them in a storage that keeps
//! copies rather than handles.

mod manager;
mod storage;

pub use manager::{SessionConfig, SessionManager};
pub(crate) use manager::DEFAULT_SWEEP_INTERVAL_SECS;
pub use storage::{MemorySessionStorage, SessionStorage};

#[cfg(test)]
pub(crate) use storage::MockSessionStorage;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use brisk_http::protocol::Request;
use serde::{Deserialize, Serialize};

/// Upper bound on a session lifetime, so expiry arithmetic cannot overflow.
const MAX_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: String,
    max_age: Duration,
    state: RwLock<SessionState>,
    manager: OnceLock<Weak<SessionManager>>,
}

struct SessionState {
    data: HashMap<String, String>,
    expires_at: SystemTime,
}

impl Session {
    /// A new empty session expiring `max_age` from now.
    ///
    /// Lifetimes longer than a hundred years are clamped.
    pub fn new(id: impl Into<String>, max_age: Duration) -> Self {
        let max_age = max_age.min(MAX_LIFETIME);
        Self::from_parts(id.into(), max_age, HashMap::new(), SystemTime::now() + max_age)
    }

    /// Rebuilds a session from a persisted snapshot, keeping its expiry.
    pub fn restore(snapshot: SessionSnapshot) -> Self {
        let expires_at = UNIX_EPOCH + Duration::from_millis(snapshot.expires_at_millis);
        let max_age = Duration::from_secs(snapshot.max_age_secs).min(MAX_LIFETIME);
        Self::from_parts(snapshot.id, max_age, snapshot.data, expires_at)
    }

    fn from_parts(id: String, max_age: Duration, data: HashMap<String, String>, expires_at: SystemTime) -> Self {
        let state = RwLock::new(SessionState { data, expires_at });
        Self { inner: Arc::new(SessionInner { id, max_age, state, manager: OnceLock::new() }) }
    }

    /// The session resolved for `req`, if a session manager is installed.
    pub fn from_request(req: &Request) -> Option<&Session> {
        req.extensions().get::<Session>()
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn max_age(&self) -> Duration {
        self.inner.max_age
    }

    pub fn expires_at(&self) -> SystemTime {
        self.read().expires_at
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at()
    }

    /// Pushes the expiry to `max_age` from now.
    pub fn refresh(&self) {
        self.write().expires_at = SystemTime::now() + self.inner.max_age;
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        self.read().data.get(key).cloned()
    }

    pub fn set_value(&self, key: impl Into<String>, value: impl Into<String>) {
        self.write().data.insert(key.into(), value.into());
    }

    pub fn remove_value(&self, key: &str) -> Option<String> {
        self.write().data.remove(key)
    }

    pub fn clear(&self) {
        self.write().data.clear();
    }

    pub fn len(&self) -> usize {
        self.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().data.is_empty()
    }

    /// Persists the current state through the manager that resolved this
    /// session.
    ///
    /// Returns `false` when there is no such manager, either because the
    /// session was built by hand or because the manager is gone.
    pub async fn save(&self) -> bool {
        match self.inner.manager.get().and_then(Weak::upgrade) {
            Some(manager) => {
                manager.update_session(self).await;
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.read();
        SessionSnapshot {
            id: self.inner.id.clone(),
            data: state.data.clone(),
            expires_at_millis: millis_since_epoch(state.expires_at),
            max_age_secs: self.inner.max_age.as_secs(),
        }
    }

    pub(crate) fn attach(&self, manager: Weak<SessionManager>) {
        // only the first manager sticks
        let _ = self.inner.manager.set(manager);
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("max_age", &self.inner.max_age)
            .field("expires_at", &state.expires_at)
            .field("values", &state.data.len())
            .finish()
    }
}

/// Owned, serializable copy of a session for storages that persist outside
/// the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub data: HashMap<String, String>,
    pub expires_at_millis: u64,
    pub max_age_secs: u64,
}

fn millis_since_epoch(time: SystemTime) -> u64 {
    let millis = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}
