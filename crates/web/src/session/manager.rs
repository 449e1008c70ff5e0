use std::fmt::{self, Write};
use std::sync::{Arc, Weak};
use std::time::Duration;

use brisk_http::protocol::{Request, Response};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{MemorySessionStorage, Session, SessionStorage};

pub(crate) const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub cookie_path: String,
    /// Session lifetime in seconds, counted from the last request.
    pub max_age: u64,
    pub http_only: bool,
    /// Seconds between background sweeps of expired sessions; `None` or `0`
    /// relies on lazy expiry only.
    pub sweep_interval: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sessionId".into(),
            cookie_path: "/".into(),
            max_age: 3600,
            http_only: true,
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl SessionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval.filter(|secs| *secs > 0).map(Duration::from_secs)
    }
}

pub struct SessionManager {
    storage: Box<dyn SessionStorage>,
    config: SessionConfig,
    this: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(storage: impl SessionStorage + 'static, config: SessionConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self { storage: Box::new(storage), config, this: this.clone() })
    }

    /// An in-memory manager with the default configuration.
    pub fn in_memory() -> Arc<Self> {
        Self::new(MemorySessionStorage::new(), SessionConfig::default())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Finds the live session named by the request cookie and refreshes it, or
    /// starts a new one. Either way the session is stored and `resp` gets a
    /// `Set-Cookie` header for it.
    pub async fn resolve(&self, req: &Request, resp: &mut Response) -> Session {
        let existing = match self.session_id_from_cookie(req) {
            Some(id) => self.load_live(id).await,
            None => None,
        };

        let session = match existing {
            Some(session) => {
                session.refresh();
                debug!(session_id = session.id(), "session refreshed");
                session
            }
            None => {
                let session = Session::new(generate_session_id(), self.config.max_age());
                debug!(session_id = session.id(), "session created");
                session
            }
        };

        session.attach(self.this.clone());
        self.storage.save(&session).await;
        resp.set_header("Set-Cookie", self.session_cookie(&session));
        session
    }

    pub async fn update_session(&self, session: &Session) {
        self.storage.save(session).await;
    }

    pub async fn destroy(&self, id: &str) {
        self.storage.remove(id).await;
        debug!(session_id = id, "session destroyed");
    }

    pub async fn sweep_expired(&self) -> usize {
        let removed = self.storage.remove_expired().await;
        if removed > 0 {
            info!(removed, "swept expired sessions");
        }
        removed
    }

    /// Sweeps expired sessions every `interval` until the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    debug!("session manager dropped, sweeper stops");
                    break;
                };
                manager.sweep_expired().await;
            }
        })
    }

    async fn load_live(&self, id: &str) -> Option<Session> {
        let session = self.storage.load(id).await?;
        if session.is_expired() {
            self.storage.remove(id).await;
            return None;
        }
        Some(session)
    }

    fn session_id_from_cookie<'a>(&self, req: &'a Request) -> Option<&'a str> {
        let cookies = req.headers().get_ignore_case("Cookie")?;
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.config.cookie_name)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn session_cookie(&self, session: &Session) -> String {
        let mut cookie = format!(
            "{}={}; Path={}; Max-Age={}",
            self.config.cookie_name, session.id(), self.config.cookie_path, self.config.max_age
        );
        if self.config.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager").field("config", &self.config).finish_non_exhaustive()
    }
}

/// 128 random bits from the OS, hex encoded.
fn generate_session_id() -> String {
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(32), |mut id, byte| {
        let _ = write!(id, "{byte:02x}");
        id
    })
}
