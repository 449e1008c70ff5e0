//! Server configuration, loadable from JSON.
//!
//! ```json
//! {
//!     "address": "127.0.0.1:8080",
//!     "max_body_bytes": 1048576,
//!     "log_level": "debug",
//!     "cors": { "allowed_origins": ["*"] },
//!     "session": { "max_age": 1800, "sweep_interval": 60 }
//! }
//! ```
//!
//! Every field is optional.

use std::path::Path;

use brisk_http::codec::DEFAULT_MAX_BODY_BYTES;
use serde::Deserialize;
use thiserror::Error;
use tracing::Level;

use crate::middleware::CorsConfig;
use crate::session::SessionConfig;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub max_body_bytes: u64,
    pub log_level: Option<String>,
    /// Installs CORS handling when present.
    pub cors: Option<CorsConfig>,
    /// Installs in-memory sessions when present.
    pub session: Option<SessionConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".into(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            log_level: None,
            cors: None,
            session: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't read config file: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("malformed config: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("unknown log level '{level}'")]
    InvalidLogLevel { level: String },
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn log_level(&self) -> Result<Option<Level>, ConfigError> {
        self.log_level
            .as_deref()
            .map(|level| level.parse::<Level>().map_err(|_| ConfigError::InvalidLogLevel { level: level.to_owned() }))
            .transpose()
    }
}
