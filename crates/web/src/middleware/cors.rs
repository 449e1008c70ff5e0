use async_trait::async_trait;
use brisk_http::protocol::{Request, Response};
use http::{Method, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

use super::{Flow, Middleware};
use crate::handler::BoxError;

const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
const ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
const MAX_AGE: &str = "Access-Control-Max-Age";

/// Cross-origin policy.
///
/// `"*"` in `allowed_origins` allows any origin, and so does an empty list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    /// Seconds a preflight answer may be cached; `None` omits the header.
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_methods: vec![],
            allowed_headers: vec![],
            allow_credentials: false,
            max_age: Some(3600),
        }
    }
}

impl CorsConfig {
    /// Any origin, the common methods, `Content-Type` and `Authorization`.
    pub fn permissive() -> Self {
        Self {
            allowed_origins: vec!["*".into()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"].map(String::from).to_vec(),
            allowed_headers: ["Content-Type", "Authorization"].map(String::from).to_vec(),
            ..Self::default()
        }
    }
}

/// Answers preflight requests and decorates every other response with the
/// configured `Access-Control-*` headers.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    config: CorsConfig,
}

impl CorsMiddleware {
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorsConfig {
        &self.config
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        let origins = &self.config.allowed_origins;
        origins.is_empty() || origins.iter().any(|allowed| allowed == "*" || allowed == origin)
    }

    fn preflight(&self, req: &Request, origin: &str) -> Response {
        let mut resp = Response::for_request(req);

        if !self.is_origin_allowed(origin) {
            warn!(origin, path = req.path(), "preflight from disallowed origin");
            resp.set_status(StatusCode::FORBIDDEN);
            return resp;
        }

        info!(origin, path = req.path(), "answering preflight");
        resp.set_status(StatusCode::NO_CONTENT);
        self.apply_headers(&mut resp, origin);
        resp
    }

    fn apply_headers(&self, resp: &mut Response, origin: &str) {
        resp.set_header(ALLOW_ORIGIN, origin);
        if !self.config.allowed_methods.is_empty() {
            resp.set_header(ALLOW_METHODS, self.config.allowed_methods.join(", "));
        }
        if !self.config.allowed_headers.is_empty() {
            resp.set_header(ALLOW_HEADERS, self.config.allowed_headers.join(", "));
        }
        if self.config.allow_credentials {
            resp.set_header(ALLOW_CREDENTIALS, "true");
        }
        if let Some(max_age) = self.config.max_age {
            resp.set_header(MAX_AGE, max_age.to_string());
        }
    }

    // wildcard if configured, else the first configured origin
    fn advertised_origin(&self) -> Option<&str> {
        let origins = &self.config.allowed_origins;
        origins.iter().find(|origin| *origin == "*").or_else(|| origins.first()).map(String::as_str)
    }
}

fn preflight_origin(req: &Request) -> Option<&str> {
    if req.method() != Method::OPTIONS {
        return None;
    }
    req.headers().get_ignore_case("Origin")
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn before(&self, req: &mut Request) -> Flow {
        match preflight_origin(req) {
            Some(origin) => Flow::ShortCircuit(self.preflight(req, origin)),
            None => Flow::Continue,
        }
    }

    async fn after(&self, req: &Request, resp: &mut Response) -> Result<(), BoxError> {
        if preflight_origin(req).is_some() {
            return Ok(());
        }

        if let Some(origin) = self.advertised_origin() {
            self.apply_headers(resp, origin);
        }
        Ok(())
    }
}
