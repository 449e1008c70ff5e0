use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use brisk_http::handler::Handler;
use brisk_http::protocol::{Request, Response};
use futures::FutureExt;
use http::StatusCode;
use tracing::{debug, error};

use crate::handler::{BoxError, RequestHandler, panic_message};
use crate::middleware::{Flow, MiddlewareChain};
use crate::router::Router;
use crate::session::SessionManager;

/// Everything that happens to a parsed request before its response goes back
/// on the wire:
///
/// 1. session resolution, when a [`SessionManager`] is installed
/// 2. the `before` hooks of the middleware chain
/// 3. routing, falling back to the default handler or `404 Not Found`
/// 4. the `after` hooks, in reverse
///
/// Handler errors and panics become `500 Internal Server Error`; the
/// connection is never torn down because of them.
pub struct Pipeline {
    router: Router,
    middlewares: MiddlewareChain,
    sessions: Option<Arc<SessionManager>>,
    default_handler: Option<Box<dyn RequestHandler>>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        Self { router, middlewares: MiddlewareChain::empty(), sessions: None, default_handler: None }
    }

    pub fn with_middlewares(mut self, middlewares: MiddlewareChain) -> Self {
        self.middlewares = middlewares;
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_default_handler(self, handler: impl RequestHandler + 'static) -> Self {
        self.with_boxed_default_handler(Box::new(handler))
    }

    pub(crate) fn with_boxed_default_handler(mut self, handler: Box<dyn RequestHandler>) -> Self {
        self.default_handler = Some(handler);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn sessions(&self) -> Option<&Arc<SessionManager>> {
        self.sessions.as_ref()
    }

    pub async fn init(&self) -> Result<(), BoxError> {
        self.router.init_handlers().await?;
        if let Some(handler) = &self.default_handler {
            handler.init().await?;
        }
        Ok(())
    }

    pub async fn cleanup(&self) {
        self.router.cleanup_handlers().await;
        if let Some(handler) = &self.default_handler {
            handler.cleanup().await;
        }
    }

    async fn dispatch(&self, req: &Request, resp: &mut Response) {
        let untouched = resp.clone();

        let outcome = AssertUnwindSafe(self.route(req, resp)).catch_unwind().await;
        let cause = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("panicked: {}", panic_message(&*panic)),
        };

        error!(method = %req.method(), path = req.path(), cause = %cause, "handler failed");
        *resp = untouched;
        resp.set_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    async fn route(&self, req: &Request, resp: &mut Response) -> Result<(), BoxError> {
        if self.router.route(req, resp).await? {
            return Ok(());
        }

        match &self.default_handler {
            Some(handler) => handler.handle(req, resp).await,
            None => {
                debug!(method = %req.method(), path = req.path(), "no route matched");
                resp.set_status(StatusCode::NOT_FOUND);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Handler for Pipeline {
    async fn call(&self, mut req: Request) -> Response {
        let mut resp = Response::for_request(&req);

        if let Some(sessions) = &self.sessions {
            let session = sessions.resolve(&req, &mut resp).await;
            req.extensions_mut().insert(session);
        }

        match self.middlewares.before(&mut req).await {
            Flow::Continue => self.dispatch(&req, &mut resp).await,
            Flow::ShortCircuit(mut substitute) => {
                substitute.set_version(req.version()).inherit_headers(&resp);
                if resp.close_connection() {
                    substitute.set_close_connection(true);
                }
                resp = substitute;
            }
        }

        self.middlewares.after(&req, &mut resp).await;
        resp
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("router", &self.router)
            .field("middlewares", &self.middlewares)
            .field("sessions", &self.sessions)
            .field("default_handler", &self.default_handler.is_some())
            .finish()
    }
}
