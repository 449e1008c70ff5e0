use std::future::Future;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::handler::Handler;
use crate::protocol::{HttpError, ParseError, Response, SendError};

/// An HTTP connection that turns inbound bytes into requests and writes back
/// the handler's responses, one request in flight at a time.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_decoder(reader, writer, RequestDecoder::new())
    }

    pub fn with_decoder(reader: R, writer: W, decoder: RequestDecoder) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, decoder, 8 * 1024),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
        }
    }

    /// Serves requests until the peer closes, a response carries the close
    /// directive, or the input turns out to be malformed.
    ///
    /// Malformed input is answered with a client-error response and the
    /// connection is closed; the parse error is returned.
    pub async fn process<H>(self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler + ?Sized,
    {
        self.process_until(handler, std::future::pending()).await
    }

    /// Like [`process`](Self::process), but stops once `shutdown` resolves
    /// while waiting for the next request. A request already handed to the
    /// handler is answered first.
    pub async fn process_until<H, S>(mut self, handler: Arc<H>, shutdown: S) -> Result<(), HttpError>
    where
        H: Handler + ?Sized,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let next = tokio::select! {
                biased;

                () = &mut shutdown => {
                    debug!("shutdown requested, connection closed between requests");
                    return Ok(());
                }
                next = self.framed_read.next() => next,
            };

            match next {
                Some(Ok(request)) => {
                    let version = request.version();
                    let wants_close = request.wants_close();

                    let mut response = handler.call(request).await;
                    let close = response.close_connection() || wants_close;
                    response.set_version(version).set_close_connection(close);

                    match self.framed_write.send(response).await {
                        Ok(()) => {}
                        Err(e @ SendError::InvalidResponse { .. }) => {
                            error!(cause = %e, "handler produced an unsendable response");
                            let mut fallback = build_error_response(StatusCode::INTERNAL_SERVER_ERROR);
                            fallback.set_version(version);
                            self.framed_write.send(fallback).await?;
                            return Err(e.into());
                        }
                        Err(e) => return Err(e.into()),
                    }

                    if close {
                        debug!("response carries close directive, connection shutdown");
                        return Ok(());
                    }
                }

                Some(Err(e @ ParseError::Io { .. })) => {
                    error!(cause = %e, "can't read next request");
                    return Err(e.into());
                }

                Some(Err(e)) => {
                    warn!(cause = %e, "can't parse next request");
                    self.framed_write.send(build_error_response(e.status_code())).await?;
                    return Err(e.into());
                }

                None => {
                    debug!("cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }
}

fn build_error_response(status_code: StatusCode) -> Response {
    let mut response = Response::with_status(status_code);
    response.set_close_connection(true);
    response
}
