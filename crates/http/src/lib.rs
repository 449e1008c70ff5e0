//! An incremental HTTP/1.1 server core
//!
//! This crate turns arbitrarily fragmented inbound bytes into structured
//! requests and serializes responses back to the wire. It is the protocol half
//! of `brisk`; routing, middleware and sessions live in `brisk-web`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//! use brisk_http::connection::HttpConnection;
//! use brisk_http::handler::make_handler;
//! use brisk_http::protocol::{Request, Response};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = Arc::new(make_handler(hello_world));
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = handler.clone();
//!
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = HttpConnection::new(reader, writer);
//!             if let Err(e) = connection.process(handler).await {
//!                 error!(cause = %e, "connection shutdown");
//!             }
//!         });
//!     }
//! }
//!
//! async fn hello_world(request: Request) -> Response {
//!     info!(path = request.path(), "request received");
//!     Response::text("Hello World!\r\n")
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: [`Request`](protocol::Request), [`Response`](protocol::Response),
//!   [`Headers`](protocol::Headers) and the error types
//! - [`codec`]: the incremental [`RequestDecoder`](codec::RequestDecoder) state
//!   machine and the [`ResponseEncoder`](codec::ResponseEncoder)
//! - [`connection`]: [`HttpConnection`](connection::HttpConnection), the per
//!   connection driver
//! - [`handler`]: the [`Handler`](handler::Handler) trait the driver calls
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only, no chunked transfer-encoding
//! - Only `POST` and `PUT` carry a body, which must declare `Content-Length`
//! - One in-flight request per connection
//! - Maximum header section size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
