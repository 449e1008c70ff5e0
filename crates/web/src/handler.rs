//! Route targets.
//!
//! A route resolves to one of two kinds of target:
//!
//! - a [`RequestHandler`] object, which may hold state and gets [`init`] /
//!   [`cleanup`] calls around the server's lifetime
//! - a [`HandlerCallback`], a plain function of `(&Request, &mut Response)`
//!
//! [`init`]: RequestHandler::init
//! [`cleanup`]: RequestHandler::cleanup

use std::any::Any;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use brisk_http::protocol::{Request, Response};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// A stateful route target.
///
/// `handle` is expected to populate the response fully. Returning an error
/// (or panicking) makes the pipeline answer with `500 Internal Server Error`.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, req: &Request, resp: &mut Response) -> Result<(), BoxError>;

    /// Called once before the server accepts connections.
    async fn init(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called once after the server stopped serving.
    async fn cleanup(&self) {}
}

/// A stateless route target.
pub type HandlerCallback = Arc<dyn Fn(&Request, &mut Response) + Send + Sync + 'static>;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
