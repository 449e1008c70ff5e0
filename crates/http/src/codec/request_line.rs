//! Request line parsing: `METHOD SP target SP HTTP/1.x`.

use http::{Method, Version};

use crate::ensure;
use crate::protocol::ParseError;

/// The three parts of a request line, with the target already split at `?`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RequestLine<'a> {
    pub(crate) method: Method,
    pub(crate) path: &'a str,
    pub(crate) query: Option<&'a str>,
    pub(crate) version: Version,
}

/// Parses one request line, `line` excludes the trailing CRLF.
pub(crate) fn parse_request_line(line: &[u8]) -> Result<RequestLine<'_>, ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::invalid_request_line("not valid utf-8"))?;

    let (method, rest) = line.split_once(' ').ok_or_else(|| ParseError::invalid_request_line(line))?;
    let method = parse_method(method)?;

    let (target, version) = rest.split_once(' ').ok_or_else(|| ParseError::invalid_request_line(line))?;
    ensure!(!target.is_empty(), ParseError::InvalidUri);

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };
    ensure!(!path.is_empty(), ParseError::InvalidUri);

    let version = parse_version(version)?;

    Ok(RequestLine { method, path, query, version })
}

fn parse_method(token: &str) -> Result<Method, ParseError> {
    let method = match token {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "DELETE" => Method::DELETE,
        "OPTIONS" => Method::OPTIONS,
        "HEAD" => Method::HEAD,
        "PATCH" => Method::PATCH,
        "CONNECT" => Method::CONNECT,
        "TRACE" => Method::TRACE,
        other => return Err(ParseError::InvalidMethod(other.to_string())),
    };
    Ok(method)
}

/// The version token must be exactly `HTTP/1.1` or `HTTP/1.0`.
fn parse_version(token: &str) -> Result<Version, ParseError> {
    const PREFIX: &[u8] = b"HTTP/1.";

    let bytes = token.as_bytes();
    ensure!(bytes.len() == 8 && bytes.starts_with(PREFIX), ParseError::InvalidVersion(token.to_string()));

    match bytes[7] {
        b'1' => Ok(Version::HTTP_11),
        b'0' => Ok(Version::HTTP_10),
        _ => Err(ParseError::InvalidVersion(token.to_string())),
    }
}
