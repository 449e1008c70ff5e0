//! Incremental HTTP request decoder
//!
//! One [`RequestDecoder`] belongs to one connection. It is fed whatever bytes
//! have arrived so far and advances a small state machine:
//!
//! ```text
//! ExpectRequestLine -> ExpectHeaders -> (ExpectBody) -> Complete
//!        ^                                                  |
//!        +------------------ take_request() ----------------+
//! ```
//!
//! Bytes are only consumed once a whole line (or the whole body) is available,
//! so splitting the input at arbitrary offsets yields the same [`Request`] as
//! delivering it in one piece. Running out of bytes is not an error: the
//! decoder simply reports its current state and waits for the next call.
//!
//! # Example
//!
//! ```
//! use brisk_http::codec::{ParseState, RequestDecoder};
//! use bytes::BytesMut;
//! use std::time::SystemTime;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buf = BytesMut::from("GET /search?q=rust HTTP/1.1\r\nHost: ex");
//! assert_eq!(decoder.consume(&mut buf, SystemTime::now()).unwrap(), ParseState::ExpectHeaders);
//!
//! buf.extend_from_slice(b"ample.com\r\n\r\n");
//! assert_eq!(decoder.consume(&mut buf, SystemTime::now()).unwrap(), ParseState::Complete);
//!
//! let request = decoder.take_request().unwrap();
//! assert_eq!(request.path(), "/search");
//! assert_eq!(request.query_param("q"), Some("rust"));
//! ```

use std::mem;
use std::time::SystemTime;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::codec::header_line::{HeaderLine, content_length, parse_header_line};
use crate::codec::request_line::parse_request_line;
use crate::ensure;
use crate::protocol::{ParseError, Request, parse_query};

/// Maximum number of distinct headers allowed in a request
pub const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes of the request line plus the header section
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Default upper bound for a declared `Content-Length`
pub const DEFAULT_MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

/// Where the decoder is within the current request cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParseState {
    ExpectRequestLine,
    ExpectHeaders,
    ExpectBody,
    Complete,
}

#[derive(Debug)]
pub struct RequestDecoder {
    state: ParseState,
    request: Request,
    header_bytes: usize,
    max_body_bytes: u64,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { state: ParseState::ExpectRequestLine, request: Request::empty(), header_bytes: 0, max_body_bytes: DEFAULT_MAX_BODY_BYTES }
    }
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_body_bytes(max_body_bytes: u64) -> Self {
        Self { max_body_bytes, ..Self::default() }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.state == ParseState::Complete
    }

    /// Advances the state machine over the bytes buffered in `src`.
    ///
    /// Consumed bytes are removed from `src`; an incomplete line or body is left
    /// untouched. `received_at` is recorded on the request when its request
    /// line is parsed. Any error is permanent for the connection.
    pub fn consume(&mut self, src: &mut BytesMut, received_at: SystemTime) -> Result<ParseState, ParseError> {
        loop {
            match self.state {
                ParseState::ExpectRequestLine => {
                    let Some(line) = self.next_line(src)? else {
                        return Ok(self.state);
                    };

                    let request_line = parse_request_line(&line[..line.len() - 2])?;
                    trace!(method = %request_line.method, path = request_line.path, "parsed request line");

                    self.request.method = request_line.method;
                    self.request.path = request_line.path.to_string();
                    self.request.query = request_line.query.map(parse_query).unwrap_or_default();
                    self.request.version = request_line.version;
                    self.request.received_at = received_at;
                    self.state = ParseState::ExpectHeaders;
                }

                ParseState::ExpectHeaders => {
                    let Some(line) = self.next_line(src)? else {
                        return Ok(self.state);
                    };

                    match parse_header_line(&line[..line.len() - 2])? {
                        HeaderLine::Field { name, value } => {
                            self.request.headers.insert(name, value);
                            ensure!(self.request.headers.len() <= MAX_HEADER_NUM, ParseError::too_many_headers(MAX_HEADER_NUM));
                        }
                        HeaderLine::End => {
                            let length = content_length(&self.request.method, &self.request.headers, self.max_body_bytes)?;
                            self.request.content_length = length;
                            self.state = if length == 0 { ParseState::Complete } else { ParseState::ExpectBody };
                        }
                    }
                }

                ParseState::ExpectBody => {
                    let declared = self.request.content_length;
                    let length = usize::try_from(declared).map_err(|_| ParseError::too_large_body(declared, self.max_body_bytes))?;
                    if src.len() < length {
                        return Ok(self.state);
                    }

                    self.request.body = src.split_to(length).freeze();
                    trace!(body_size = length, "parsed body");
                    self.state = ParseState::Complete;
                }

                ParseState::Complete => return Ok(self.state),
            }
        }
    }

    /// Hands out the completed request and resets for the next cycle.
    ///
    /// Returns `None` unless the state is [`ParseState::Complete`].
    pub fn take_request(&mut self) -> Option<Request> {
        if !self.is_complete() {
            return None;
        }
        let request = mem::replace(&mut self.request, Request::empty());
        self.reset();
        Some(request)
    }

    /// Drops any partially parsed request.
    pub fn reset(&mut self) {
        self.state = ParseState::ExpectRequestLine;
        self.request = Request::empty();
        self.header_bytes = 0;
    }

    /// Splits off the next CRLF-terminated line (terminator included).
    ///
    /// Enforces [`MAX_HEADER_BYTES`] over the request line and header section,
    /// counting a pending partial line as well.
    fn next_line(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
        match find_crlf(src) {
            Some(index) => {
                self.header_bytes += index + 2;
                ensure!(self.header_bytes <= MAX_HEADER_BYTES, ParseError::too_large_header(self.header_bytes, MAX_HEADER_BYTES));
                Ok(Some(src.split_to(index + 2)))
            }
            None => {
                let pending = self.header_bytes + src.len();
                ensure!(pending <= MAX_HEADER_BYTES, ParseError::too_large_header(pending, MAX_HEADER_BYTES));
                Ok(None)
            }
        }
    }
}

fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(2).position(|w| w == b"\r\n")
}

impl Decoder for RequestDecoder {
    type Item = Request;
    type Error = ParseError;

    /// - `Ok(Some(request))`: a complete request was parsed
    /// - `Ok(None)`: need more data to proceed
    /// - `Err(_)`: the input is malformed, the connection must be closed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.consume(src, SystemTime::now())? {
            ParseState::Complete => Ok(self.take_request()),
            _ => Ok(None),
        }
    }

    /// The peer went away: a partially received request is discarded.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(request) = self.decode(src)? {
            return Ok(Some(request));
        }

        if !src.is_empty() || self.state != ParseState::ExpectRequestLine {
            debug!(state = ?self.state, buffered = src.len(), "connection closed mid-request, discarding partial request");
        }
        src.clear();
        self.reset();
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Version};
    use indoc::indoc;
    use std::time::Duration;

    fn crlf(raw: &str) -> String {
        raw.replace('\n', "\r\n")
    }

    fn at() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn parse_whole(raw: &[u8]) -> Request {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(raw);
        assert_eq!(decoder.consume(&mut buf, at()).unwrap(), ParseState::Complete);
        assert!(buf.is_empty());
        decoder.take_request().unwrap()
    }

    fn assert_same(left: &Request, right: &Request) {
        assert_eq!(left.method(), right.method());
        assert_eq!(left.path(), right.path());
        assert_eq!(left.query(), right.query());
        assert_eq!(left.headers(), right.headers());
        assert_eq!(left.body(), right.body());
        assert_eq!(left.content_length(), right.content_length());
        assert_eq!(left.version(), right.version());
        assert_eq!(left.received_at(), right.received_at());
    }

    #[test]
    fn search_example() {
        let raw = crlf(indoc! {"
            GET /search?q=chatgpt&lang=zh HTTP/1.1
            Host: example.com

        "});

        let request = parse_whole(raw.as_bytes());

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.path(), "/search");
        assert_eq!(request.query_param("q"), Some("chatgpt"));
        assert_eq!(request.query_param("lang"), Some("zh"));
        assert_eq!(request.query().len(), 2);
        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(request.header("Host"), Some("example.com"));
        assert!(request.body().is_empty());
        assert_eq!(request.received_at(), at());
    }

    #[test]
    fn from_curl() {
        let raw = crlf(indoc! {"
            GET /index.html HTTP/1.1
            Host: 127.0.0.1:8080
            User-Agent: curl/7.79.1
            Accept: */*

        "});

        let request = parse_whole(raw.as_bytes());

        assert_eq!(request.path(), "/index.html");
        assert!(request.query().is_empty());
        assert_eq!(request.headers().len(), 3);
        assert_eq!(request.header("Accept"), Some("*/*"));
        assert_eq!(request.header("User-Agent"), Some("curl/7.79.1"));
    }

    #[test]
    fn post_body_exact_length() {
        let raw = crlf(indoc! {"
            POST /submit HTTP/1.1
            Content-Length: 11

        "}) + "hello world";

        let request = parse_whole(raw.as_bytes());

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.content_length(), 11);
        assert_eq!(&request.body()[..], b"hello world");
    }

    #[test]
    fn post_zero_length_completes_without_body_state() {
        let raw = crlf("PUT /x HTTP/1.1\nContent-Length: 0\n\n");
        let request = parse_whole(raw.as_bytes());
        assert_eq!(request.content_length(), 0);
        assert!(request.body().is_empty());
    }

    #[test]
    fn chunk_boundary_invariance() {
        let raw = crlf(indoc! {"
            POST /api/items?kind=book HTTP/1.1
            Host: example.com
            Content-Type: application/json
            Content-Length: 16

        "}) + r#"{"title":"rust"}"#;
        let raw = raw.as_bytes();
        let whole = parse_whole(raw);

        // every single split point
        for offset in 0..=raw.len() {
            let mut decoder = RequestDecoder::new();
            let mut buf = BytesMut::from(&raw[..offset]);
            decoder.consume(&mut buf, at()).unwrap();
            buf.extend_from_slice(&raw[offset..]);
            assert_eq!(decoder.consume(&mut buf, at()).unwrap(), ParseState::Complete, "split at {offset}");
            assert_same(&decoder.take_request().unwrap(), &whole);
        }

        // one byte at a time
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::new();
        for byte in raw {
            assert!(!decoder.is_complete());
            buf.extend_from_slice(&[*byte]);
            decoder.consume(&mut buf, at()).unwrap();
        }
        assert_same(&decoder.take_request().unwrap(), &whole);
    }

    #[test]
    fn partial_body_makes_no_progress() {
        let raw = crlf("POST /upload HTTP/1.1\nContent-Length: 10\n\n") + "12345";
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(raw.as_str());

        assert_eq!(decoder.consume(&mut buf, at()).unwrap(), ParseState::ExpectBody);
        assert_eq!(&buf[..], b"12345");
        assert!(decoder.take_request().is_none());

        // calling again without new bytes changes nothing
        assert_eq!(decoder.consume(&mut buf, at()).unwrap(), ParseState::ExpectBody);
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(b"67890");
        assert_eq!(decoder.consume(&mut buf, at()).unwrap(), ParseState::Complete);
        assert_eq!(&decoder.take_request().unwrap().body()[..], b"1234567890");
    }

    #[test]
    fn post_without_content_length_is_rejected() {
        let raw = crlf("POST /submit HTTP/1.1\nHost: example.com\n\nbody");
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(raw.as_str());

        let err = decoder.consume(&mut buf, at()).unwrap_err();
        assert!(matches!(err, ParseError::MissingContentLength { .. }));
        assert_ne!(decoder.state(), ParseState::ExpectBody);
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let raw = crlf("GET / HTTP/1.1\nHost example.com\n\n");
        let mut buf = BytesMut::from(raw.as_str());
        let err = RequestDecoder::new().consume(&mut buf, at()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidHeader { .. }));
    }

    #[test]
    fn bad_request_line_is_rejected() {
        let mut buf = BytesMut::from("GET / HTTP/3.0\r\n\r\n");
        assert!(matches!(RequestDecoder::new().consume(&mut buf, at()), Err(ParseError::InvalidVersion(_))));

        let mut buf = BytesMut::from("FETCH / HTTP/1.1\r\n\r\n");
        assert!(matches!(RequestDecoder::new().consume(&mut buf, at()), Err(ParseError::InvalidMethod(_))));
    }

    #[test]
    fn duplicate_header_last_write_wins() {
        let raw = crlf("GET / HTTP/1.1\nX-Id: 1\nX-Id: 2\n\n");
        let request = parse_whole(raw.as_bytes());
        assert_eq!(request.headers().len(), 1);
        assert_eq!(request.header("X-Id"), Some("2"));
    }

    #[test]
    fn get_ignores_body_headers() {
        let raw = crlf("GET / HTTP/1.0\nContent-Length: 5\n\n");
        let request = parse_whole(raw.as_bytes());
        assert_eq!(request.version(), Version::HTTP_10);
        assert_eq!(request.content_length(), 0);
    }

    #[test]
    fn keep_alive_back_to_back() {
        let raw = crlf("POST /a HTTP/1.1\nContent-Length: 3\n\n") + "abc" + &crlf("GET /b HTTP/1.1\n\n");
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(raw.as_str());

        let first = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.path(), "/a");
        assert_eq!(&first.body()[..], b"abc");
        assert_eq!(decoder.state(), ParseState::ExpectRequestLine);

        let second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.path(), "/b");
        assert!(buf.is_empty());
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversized_header_section() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\n");
        buf.extend_from_slice(format!("X-Big: {}\r\n", "a".repeat(MAX_HEADER_BYTES)).as_bytes());
        let err = RequestDecoder::new().consume(&mut buf, at()).unwrap_err();
        assert!(matches!(err, ParseError::TooLargeHeader { .. }));

        // also without a line terminator in sight
        let mut buf = BytesMut::from("GET /");
        buf.extend_from_slice("a".repeat(MAX_HEADER_BYTES).as_bytes());
        let err = RequestDecoder::new().consume(&mut buf, at()).unwrap_err();
        assert!(matches!(err, ParseError::TooLargeHeader { .. }));
    }

    #[test]
    fn too_many_headers() {
        let mut raw = String::from("GET / HTTP/1.1\r\n");
        for i in 0..=MAX_HEADER_NUM {
            raw.push_str(&format!("X-{i}: v\r\n"));
        }
        raw.push_str("\r\n");
        let mut buf = BytesMut::from(raw.as_str());
        let err = RequestDecoder::new().consume(&mut buf, at()).unwrap_err();
        assert!(matches!(err, ParseError::TooManyHeaders { .. }));
    }

    #[test]
    fn body_limit() {
        let mut decoder = RequestDecoder::with_max_body_bytes(4);
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\n12345");
        assert!(matches!(decoder.consume(&mut buf, at()), Err(ParseError::TooLargeBody { declared: 5, max_size: 4 })));
    }

    #[test]
    fn eof_discards_partial_request() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from("POST /a HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");

        assert!(decoder.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
        assert_eq!(decoder.state(), ParseState::ExpectRequestLine);
    }
}
