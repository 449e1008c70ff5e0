//! Hooks around dispatch.
//!
//! For a chain `[m1, m2, m3]` the order of calls is
//!
//! ```text
//! m1.before -> m2.before -> m3.before -> handler -> m3.after -> m2.after -> m1.after
//! ```
//!
//! A `before` hook may answer the request itself by returning
//! [`Flow::ShortCircuit`]. Later `before` hooks and the handler are then
//! skipped, but every `after` hook still runs, in reverse order, on the
//! substitute response.

mod cors;

pub use cors::{CorsConfig, CorsMiddleware};

use std::fmt;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use brisk_http::protocol::{Request, Response};
use futures::FutureExt;
use http::StatusCode;
use tracing::{debug, error};

use crate::handler::{BoxError, panic_message};

/// Outcome of a `before` hook.
#[derive(Debug)]
pub enum Flow {
    Continue,
    ShortCircuit(Response),
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn before(&self, _req: &mut Request) -> Flow {
        Flow::Continue
    }

    async fn after(&self, _req: &Request, _resp: &mut Response) -> Result<(), BoxError> {
        Ok(())
    }
}

pub struct MiddlewareChain {
    inner: Vec<Box<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn builder() -> MiddlewareChainBuilder {
        MiddlewareChainBuilder::new()
    }

    pub fn empty() -> Self {
        Self { inner: vec![] }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Runs the `before` hooks in order, stopping at the first short circuit.
    ///
    /// A panicking hook short-circuits with `500 Internal Server Error`.
    pub async fn before(&self, req: &mut Request) -> Flow {
        for (index, middleware) in self.inner.iter().enumerate() {
            match AssertUnwindSafe(middleware.before(req)).catch_unwind().await {
                Ok(Flow::Continue) => {}
                Ok(flow @ Flow::ShortCircuit(_)) => {
                    debug!(index, path = req.path(), "middleware short-circuited the request");
                    return flow;
                }
                Err(panic) => {
                    error!(index, cause = panic_message(&*panic), "middleware before hook panicked");
                    return Flow::ShortCircuit(Response::with_status(StatusCode::INTERNAL_SERVER_ERROR));
                }
            }
        }
        Flow::Continue
    }

    /// Runs every `after` hook in reverse order.
    ///
    /// Failures are logged and do not stop the remaining hooks.
    pub async fn after(&self, req: &Request, resp: &mut Response) {
        for (index, middleware) in self.inner.iter().enumerate().rev() {
            match AssertUnwindSafe(middleware.after(req, resp)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(index, cause = %e, "middleware after hook failed"),
                Err(panic) => error!(index, cause = panic_message(&*panic), "middleware after hook panicked"),
            }
        }
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain").field("len", &self.inner.len()).finish()
    }
}

pub struct MiddlewareChainBuilder {
    inner: Vec<Box<dyn Middleware>>,
}

impl MiddlewareChainBuilder {
    fn new() -> Self {
        Self { inner: vec![] }
    }

    pub fn add_last<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.inner.push(Box::new(middleware));
        self
    }

    pub fn add_first<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.inner.insert(0, Box::new(middleware));
        self
    }

    pub fn build(self) -> MiddlewareChain {
        MiddlewareChain { inner: self.inner }
    }
}

impl fmt::Debug for MiddlewareChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChainBuilder").field("len", &self.inner.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
        short_circuit: bool,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Log) -> Self {
            Self { name, log: log.clone(), short_circuit: false }
        }

        fn short_circuiting(name: &'static str, log: &Log) -> Self {
            Self { short_circuit: true, ..Self::new(name, log) }
        }
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn before(&self, _req: &mut Request) -> Flow {
            self.log.lock().unwrap().push(format!("{}.before", self.name));
            if self.short_circuit {
                Flow::ShortCircuit(Response::with_status(StatusCode::UNAUTHORIZED))
            } else {
                Flow::Continue
            }
        }

        async fn after(&self, _req: &Request, resp: &mut Response) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(format!("{}.after", self.name));
            resp.headers_mut().insert(format!("X-{}", self.name), "seen");
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl Middleware for Broken {
        async fn before(&self, _req: &mut Request) -> Flow {
            panic!("before exploded")
        }

        async fn after(&self, _req: &Request, _resp: &mut Response) -> Result<(), BoxError> {
            Err("after failed".into())
        }
    }

    struct Passive;

    impl Middleware for Passive {}

    async fn run(chain: &MiddlewareChain, log: &Log) -> Response {
        let mut req = Request::builder().method(Method::GET).uri("/").build();
        let mut resp = match chain.before(&mut req).await {
            Flow::Continue => {
                log.lock().unwrap().push("handler".into());
                Response::new()
            }
            Flow::ShortCircuit(resp) => resp,
        };
        chain.after(&req, &mut resp).await;
        resp
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn empty_chain_only_runs_handler() {
        let log = Log::default();
        let chain = MiddlewareChain::empty();

        run(&chain, &log).await;
        assert_eq!(entries(&log), ["handler"]);
    }

    #[tokio::test]
    async fn single_middleware_wraps_handler() {
        let log = Log::default();
        let chain = MiddlewareChain::builder().add_last(Recorder::new("a", &log)).build();

        let resp = run(&chain, &log).await;
        assert_eq!(entries(&log), ["a.before", "handler", "a.after"]);
        assert_eq!(resp.header("X-a"), Some("seen"));
    }

    #[tokio::test]
    async fn after_hooks_run_in_reverse() {
        let log = Log::default();
        let chain = MiddlewareChain::builder()
            .add_last(Recorder::new("b", &log))
            .add_last(Recorder::new("c", &log))
            .add_first(Recorder::new("a", &log))
            .build();

        run(&chain, &log).await;
        assert_eq!(entries(&log), ["a.before", "b.before", "c.before", "handler", "c.after", "b.after", "a.after"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest_but_not_afters() {
        let log = Log::default();
        let chain = MiddlewareChain::builder()
            .add_last(Recorder::new("a", &log))
            .add_last(Recorder::short_circuiting("b", &log))
            .add_last(Recorder::new("c", &log))
            .build();

        let resp = run(&chain, &log).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(entries(&log), ["a.before", "b.before", "c.after", "b.after", "a.after"]);
    }

    #[tokio::test]
    async fn default_hooks_do_nothing() {
        let log = Log::default();
        let chain = MiddlewareChain::builder().add_last(Passive).build();

        let resp = run(&chain, &log).await;
        assert_eq!(entries(&log), ["handler"]);
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn failing_hooks_are_contained() {
        let log = Log::default();
        let chain = MiddlewareChain::builder().add_last(Recorder::new("a", &log)).add_last(Broken).build();

        let resp = run(&chain, &log).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(entries(&log), ["a.before", "a.after"]);
    }
}
