//! Core HTTP message types.
//!
//! - [`Request`]: an inbound request, read-only once parsed
//! - [`Response`]: an outbound response, mutated by handlers and middleware
//! - [`Headers`]: ordered, case-preserving header storage used by both
//! - [`ParseError`], [`SendError`], [`HttpError`]: the error taxonomy of the
//!   connection layer

mod headers;
pub use headers::Headers;

mod request;
pub(crate) use request::parse_query;
pub use request::Request;
pub use request::RequestBuilder;

mod response;
pub use response::Response;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
