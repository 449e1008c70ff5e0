//! HTTP response serializer
//!
//! Writes a [`Response`] as status line, `Connection` directive, headers,
//! `Content-Length`, blank line and body, all lines CRLF-terminated.

use crate::protocol::{Response, SendError};

use bytes::{BufMut, BytesMut};
use http::Version;
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

#[derive(Debug, Default)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Response> for ResponseEncoder {
    type Error = SendError;

    /// # Errors
    ///
    /// Returns error if:
    /// - HTTP version is neither HTTP/1.0 nor HTTP/1.1
    /// - a header name or value, or the reason phrase, contains CR or LF
    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let version = match item.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };

        // validate up front so a rejected response leaves `dst` untouched
        if has_line_break(item.reason()) {
            return Err(SendError::invalid_response("line break in reason phrase"));
        }
        if let Some((name, _)) = item.headers().iter().find(|(name, value)| has_line_break(name) || has_line_break(value)) {
            return Err(SendError::invalid_response(format!("line break in header `{name}`")));
        }

        dst.reserve(INIT_HEADER_SIZE + item.body().len());
        write!(FastWrite(dst), "{} {} {}\r\n", version, item.status().as_str(), item.reason())?;

        if item.close_connection() {
            dst.put_slice(b"Connection: close\r\n");
        } else {
            dst.put_slice(b"Connection: Keep-Alive\r\n");
        }

        for (name, value) in item.headers().iter() {
            // both are derived from the response itself
            if name.eq_ignore_ascii_case("connection") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }

        write!(FastWrite(dst), "Content-Length: {}\r\n\r\n", item.body().len())?;
        dst.put_slice(item.body());
        Ok(())
    }
}

fn has_line_break(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n')
}

/// Fast writer implementation for writing to BytesMut.
///
/// Space has been reserved up front, so writes never fail.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
