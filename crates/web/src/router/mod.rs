//! Request routing.
//!
//! A [`Router`] holds four tables:
//!
//! 1. handler objects keyed by exact `(method, path)`
//! 2. callbacks keyed by exact `(method, path)`
//! 3. handler objects with a path template
//! 4. callbacks with a path template
//!
//! and consults them in that order. The first table with a match wins. Within
//! the pattern tables candidates are tried in registration order, so a broad
//! pattern registered early shadows a narrower one registered later.

mod pattern;

pub use pattern::PatternRoute;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use brisk_http::protocol::{Request, Response};
use http::Method;
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::handler::{BoxError, HandlerCallback, RequestHandler};

type SharedHandler = Arc<dyn RequestHandler>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    method: Method,
    path: String,
}

impl RouteKey {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into() }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("invalid route pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: matchit::InsertError,
    },
}

/// Routing tables, immutable once built.
pub struct Router {
    handlers: HashMap<RouteKey, SharedHandler>,
    callbacks: HashMap<RouteKey, HandlerCallback>,
    pattern_handlers: Vec<PatternRoute<SharedHandler>>,
    pattern_callbacks: Vec<PatternRoute<HandlerCallback>>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Dispatches `req` to the first matching target.
    ///
    /// Returns `Ok(false)` when nothing matched; `resp` is left untouched in
    /// that case. Errors returned by a handler object are passed through.
    pub async fn route(&self, req: &Request, resp: &mut Response) -> Result<bool, BoxError> {
        let key = RouteKey::new(req.method().clone(), req.path());

        if let Some(handler) = self.handlers.get(&key) {
            trace!(method = %key.method, path = key.path(), "matched static handler");
            handler.handle(req, resp).await?;
            return Ok(true);
        }

        if let Some(callback) = self.callbacks.get(&key) {
            trace!(method = %key.method, path = key.path(), "matched static callback");
            callback(req, resp);
            return Ok(true);
        }

        for route in &self.pattern_handlers {
            if let Some(params) = route.matches(req.method(), req.path()) {
                trace!(pattern = route.pattern(), path = req.path(), "matched pattern handler");
                let req = req.with_route_params(params);
                route.target().handle(&req, resp).await?;
                return Ok(true);
            }
        }

        for route in &self.pattern_callbacks {
            if let Some(params) = route.matches(req.method(), req.path()) {
                trace!(pattern = route.pattern(), path = req.path(), "matched pattern callback");
                let req = req.with_route_params(params);
                (route.target())(&req, resp);
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Runs [`RequestHandler::init`] once per distinct handler object.
    ///
    /// Stops at the first failure.
    pub async fn init_handlers(&self) -> Result<(), BoxError> {
        for handler in self.distinct_handlers() {
            handler.init().await.inspect_err(|e| error!(cause = %e, "handler init failed"))?;
        }
        debug!("handlers initialized");
        Ok(())
    }

    /// Runs [`RequestHandler::cleanup`] once per distinct handler object.
    pub async fn cleanup_handlers(&self) {
        for handler in self.distinct_handlers() {
            handler.cleanup().await;
        }
        debug!("handlers cleaned up");
    }

    pub fn len(&self) -> usize {
        self.handlers.len() + self.callbacks.len() + self.pattern_handlers.len() + self.pattern_callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // the same object may be registered under several routes
    fn distinct_handlers(&self) -> Vec<&SharedHandler> {
        let mut seen = HashSet::new();
        self.handlers
            .values()
            .chain(self.pattern_handlers.iter().map(PatternRoute::target))
            .filter(|handler| seen.insert(Arc::as_ptr(handler).cast::<()>()))
            .collect()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .field("pattern_handlers", &self.pattern_handlers)
            .field("pattern_callbacks", &self.pattern_callbacks)
            .finish()
    }
}

/// Collects routes; a later exact registration for the same key replaces the
/// earlier one.
pub struct RouterBuilder {
    handlers: HashMap<RouteKey, SharedHandler>,
    callbacks: HashMap<RouteKey, HandlerCallback>,
    pattern_handlers: Vec<(Method, String, SharedHandler)>,
    pattern_callbacks: Vec<(Method, String, HandlerCallback)>,
}

macro_rules! method_callback {
    ($name:ident, $method:expr) => {
        pub fn $name<F>(self, path: impl Into<String>, callback: F) -> Self
        where
            F: Fn(&Request, &mut Response) + Send + Sync + 'static,
        {
            self.callback($method, path, callback)
        }
    };
}

impl RouterBuilder {
    fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            callbacks: HashMap::new(),
            pattern_handlers: Vec::new(),
            pattern_callbacks: Vec::new(),
        }
    }

    pub fn handler<H: RequestHandler + 'static>(self, method: Method, path: impl Into<String>, handler: H) -> Self {
        self.shared_handler(method, path, Arc::new(handler))
    }

    /// Registers one handler object under a route; the same `Arc` may be
    /// registered several times.
    pub fn shared_handler(mut self, method: Method, path: impl Into<String>, handler: SharedHandler) -> Self {
        self.handlers.insert(RouteKey::new(method, path), handler);
        self
    }

    pub fn callback<F>(mut self, method: Method, path: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.callbacks.insert(RouteKey::new(method, path), Arc::new(callback));
        self
    }

    pub fn pattern_handler<H: RequestHandler + 'static>(
        self,
        method: Method,
        pattern: impl Into<String>,
        handler: H,
    ) -> Self {
        self.shared_pattern_handler(method, pattern, Arc::new(handler))
    }

    pub fn shared_pattern_handler(mut self, method: Method, pattern: impl Into<String>, handler: SharedHandler) -> Self {
        self.pattern_handlers.push((method, pattern.into(), handler));
        self
    }

    pub fn pattern_callback<F>(mut self, method: Method, pattern: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.pattern_callbacks.push((method, pattern.into(), Arc::new(callback)));
        self
    }

    method_callback!(get, Method::GET);
    method_callback!(post, Method::POST);
    method_callback!(put, Method::PUT);
    method_callback!(delete, Method::DELETE);

    /// Compiles the pattern tables.
    pub fn build(self) -> Result<Router, RouterError> {
        let pattern_handlers = self
            .pattern_handlers
            .into_iter()
            .map(|(method, pattern, handler)| PatternRoute::new(method, pattern, handler))
            .collect::<Result<Vec<_>, _>>()?;

        let pattern_callbacks = self
            .pattern_callbacks
            .into_iter()
            .map(|(method, pattern, callback)| PatternRoute::new(method, pattern, callback))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Router { handlers: self.handlers, callbacks: self.callbacks, pattern_handlers, pattern_callbacks })
    }
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("handlers", &self.handlers.len())
            .field("callbacks", &self.callbacks.len())
            .field("pattern_handlers", &self.pattern_handlers.len())
            .field("pattern_callbacks", &self.pattern_callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Named(&'static str);

    #[async_trait]
    impl RequestHandler for Named {
        async fn handle(&self, req: &Request, resp: &mut Response) -> Result<(), BoxError> {
            let id = req.route_param("id").unwrap_or("-");
            resp.set_body(format!("{} {}", self.0, id));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl RequestHandler for Failing {
        async fn handle(&self, _req: &Request, _resp: &mut Response) -> Result<(), BoxError> {
            Err("storage offline".into())
        }
    }

    #[derive(Default)]
    struct Lifecycle {
        inits: AtomicUsize,
        cleanups: AtomicUsize,
    }

    #[async_trait]
    impl RequestHandler for Lifecycle {
        async fn handle(&self, _req: &Request, _resp: &mut Response) -> Result<(), BoxError> {
            Ok(())
        }

        async fn init(&self) -> Result<(), BoxError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn cleanup(&self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request(method: Method, uri: &str) -> Request {
        Request::builder().method(method).uri(uri).build()
    }

    async fn body_of(router: &Router, method: Method, uri: &str) -> Option<String> {
        let req = request(method, uri);
        let mut resp = Response::for_request(&req);
        match router.route(&req, &mut resp).await.unwrap() {
            true => Some(String::from_utf8(resp.body().to_vec()).unwrap()),
            false => None,
        }
    }

    #[tokio::test]
    async fn static_handler_beats_everything() {
        let router = Router::builder()
            .pattern_callback(Method::GET, "/users/{id}", |_req, resp| {
                resp.set_body("pattern callback");
            })
            .pattern_handler(Method::GET, "/users/{id}", Named("pattern handler"))
            .get("/users/me", |_req, resp| {
                resp.set_body("static callback");
            })
            .handler(Method::GET, "/users/me", Named("static handler"))
            .build()
            .unwrap();

        assert_eq!(body_of(&router, Method::GET, "/users/me").await.unwrap(), "static handler -");
    }

    #[tokio::test]
    async fn static_callback_beats_patterns() {
        let router = Router::builder()
            .pattern_handler(Method::GET, "/users/{id}", Named("pattern handler"))
            .get("/users/me", |_req, resp| {
                resp.set_body("static callback");
            })
            .build()
            .unwrap();

        assert_eq!(body_of(&router, Method::GET, "/users/me").await.unwrap(), "static callback");
        assert_eq!(body_of(&router, Method::GET, "/users/7").await.unwrap(), "pattern handler 7");
    }

    #[tokio::test]
    async fn pattern_handler_beats_pattern_callback() {
        let router = Router::builder()
            .pattern_callback(Method::GET, "/users/{id}", |req, resp| {
                resp.set_body(format!("pattern callback {}", req.route_param("id").unwrap()));
            })
            .pattern_handler(Method::GET, "/users/{id}", Named("pattern handler"))
            .pattern_callback(Method::GET, "/teams/{id}", |req, resp| {
                resp.set_body(format!("pattern callback {}", req.route_param("id").unwrap()));
            })
            .build()
            .unwrap();

        assert_eq!(body_of(&router, Method::GET, "/users/3").await.unwrap(), "pattern handler 3");
        assert_eq!(body_of(&router, Method::GET, "/teams/3").await.unwrap(), "pattern callback 3");
    }

    #[tokio::test]
    async fn patterns_match_in_registration_order() {
        let router = Router::builder()
            .pattern_handler(Method::GET, "/files/{*path}", Named("catch all"))
            .pattern_handler(Method::GET, "/files/{id}", Named("single"))
            .build()
            .unwrap();

        assert_eq!(body_of(&router, Method::GET, "/files/readme").await.unwrap(), "catch all -");
    }

    #[tokio::test]
    async fn method_is_part_of_the_key() {
        let router = Router::builder()
            .get("/items", |_req, resp| {
                resp.set_body("list");
            })
            .post("/items", |_req, resp| {
                resp.set_body("create");
            })
            .build()
            .unwrap();

        assert_eq!(body_of(&router, Method::GET, "/items").await.unwrap(), "list");
        assert_eq!(body_of(&router, Method::POST, "/items").await.unwrap(), "create");
        assert_eq!(body_of(&router, Method::PUT, "/items").await, None);
    }

    #[tokio::test]
    async fn query_does_not_affect_matching() {
        let router = Router::builder()
            .get("/search", |req, resp| {
                resp.set_body(req.query_param("q").unwrap_or_default().to_owned());
            })
            .build()
            .unwrap();

        assert_eq!(body_of(&router, Method::GET, "/search?q=rust").await.unwrap(), "rust");
    }

    #[tokio::test]
    async fn later_static_registration_replaces_earlier() {
        let router = Router::builder()
            .handler(Method::GET, "/", Named("first"))
            .handler(Method::GET, "/", Named("second"))
            .build()
            .unwrap();

        assert_eq!(router.len(), 1);
        assert_eq!(body_of(&router, Method::GET, "/").await.unwrap(), "second -");
    }

    #[tokio::test]
    async fn unmatched_leaves_response_untouched() {
        let router = Router::builder()
            .get("/", |_req, resp| {
                resp.set_body("home");
            })
            .build()
            .unwrap();

        let req = request(Method::GET, "/missing");
        let mut resp = Response::for_request(&req);
        assert!(!router.route(&req, &mut resp).await.unwrap());
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert!(resp.body().is_empty());
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let router = Router::builder().handler(Method::GET, "/", Failing).build().unwrap();

        let req = request(Method::GET, "/");
        let mut resp = Response::for_request(&req);
        let err = router.route(&req, &mut resp).await.unwrap_err();
        assert_eq!(err.to_string(), "storage offline");
    }

    #[tokio::test]
    async fn lifecycle_runs_once_per_object() {
        let shared = Arc::new(Lifecycle::default());
        let router = Router::builder()
            .shared_handler(Method::GET, "/a", shared.clone())
            .shared_handler(Method::GET, "/b", shared.clone())
            .shared_pattern_handler(Method::GET, "/c/{id}", shared.clone())
            .build()
            .unwrap();

        router.init_handlers().await.unwrap();
        router.cleanup_handlers().await;

        assert_eq!(shared.inits.load(Ordering::SeqCst), 1);
        assert_eq!(shared.cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn build_rejects_malformed_patterns() {
        let result = Router::builder().pattern_callback(Method::GET, "/a/{*rest}/tail", |_req, _resp| {}).build();
        assert!(matches!(result, Err(RouterError::InvalidPattern { .. })));
    }
}
