//! HTTP connection handling module
//!
//! [`HttpConnection`] drives one connection: it frames inbound bytes with the
//! [`RequestDecoder`](crate::codec::RequestDecoder), hands each request to a
//! [`Handler`](crate::handler::Handler), and writes the response back through
//! the [`ResponseEncoder`](crate::codec::ResponseEncoder). Keep-alive is decided
//! by the close directive on each response.

mod http_connection;

pub use http_connection::HttpConnection;
