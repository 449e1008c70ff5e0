//! HTTP codec module for decoding requests and encoding responses
//!
//! - [`RequestDecoder`]: the per-connection incremental request parser, usable
//!   directly through [`RequestDecoder::consume`] or as a
//!   [`tokio_util::codec::Decoder`]
//! - [`ResponseEncoder`]: serializes a [`Response`](crate::protocol::Response)
//!   as a [`tokio_util::codec::Encoder`]
//!
//! # Example
//!
//! ```no_run
//! use brisk_http::codec::{RequestDecoder, ResponseEncoder};
//! use brisk_http::protocol::Response;
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::BytesMut;
//!
//! // Decode incoming request
//! let mut decoder = RequestDecoder::new();
//! let mut request_buffer = BytesMut::from("GET / HTTP/1.1\r\n\r\n");
//! let request = decoder.decode(&mut request_buffer);
//!
//! // Encode outgoing response
//! let mut encoder = ResponseEncoder::new();
//! let mut response_buffer = BytesMut::new();
//! encoder.encode(Response::text("hi"), &mut response_buffer).unwrap();
//! ```

mod header_line;
mod request_decoder;
mod request_line;
mod response_encoder;

pub use request_decoder::DEFAULT_MAX_BODY_BYTES;
pub use request_decoder::MAX_HEADER_BYTES;
pub use request_decoder::MAX_HEADER_NUM;
pub use request_decoder::ParseState;
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
