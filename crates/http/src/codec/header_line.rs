//! Header line parsing and the end-of-headers body decision.

use http::Method;

use crate::ensure;
use crate::protocol::{Headers, ParseError};

/// One line of the header section.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HeaderLine<'a> {
    Field { name: &'a str, value: &'a str },
    /// The blank line terminating the header section.
    End,
}

/// Parses one header line, `line` excludes the trailing CRLF.
pub(crate) fn parse_header_line(line: &[u8]) -> Result<HeaderLine<'_>, ParseError> {
    if line.is_empty() {
        return Ok(HeaderLine::End);
    }

    let line = std::str::from_utf8(line).map_err(|_| ParseError::invalid_header("not valid utf-8"))?;
    let (name, value) = line.split_once(':').ok_or_else(|| ParseError::invalid_header(format!("no colon in `{line}`")))?;

    ensure!(
        !name.is_empty() && !name.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()),
        ParseError::invalid_header(format!("bad header name `{name}`"))
    );

    Ok(HeaderLine::Field { name, value: value.trim() })
}

/// Only these methods carry a body, and they must declare its length.
pub(crate) fn expects_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT)
}

/// Reads the declared body length once the header section has ended.
///
/// Returns `Ok(0)` for methods without a body. Body-bearing methods must send
/// a `Content-Length` (matched case-insensitively) holding a decimal integer.
pub(crate) fn content_length(method: &Method, headers: &Headers, max_body_bytes: u64) -> Result<u64, ParseError> {
    if !expects_body(method) {
        return Ok(0);
    }

    let raw = headers
        .get_ignore_case("Content-Length")
        .ok_or_else(|| ParseError::MissingContentLength { method: method.clone() })?;

    let length = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| ParseError::invalid_content_length(format!("value {raw} is not u64")))?;

    ensure!(length <= max_body_bytes, ParseError::too_large_body(length, max_body_bytes));
    Ok(length)
}
