//! HTTP response value object.
//!
//! Handlers and middleware mutate a [`Response`] freely; it is serialized once,
//! by the [`ResponseEncoder`](crate::codec::ResponseEncoder), when the pipeline
//! is done with it.

use bytes::Bytes;
use http::{StatusCode, Version};
use mime::Mime;

use crate::protocol::{Headers, Request};

#[derive(Debug, Clone)]
pub struct Response {
    version: Version,
    status: StatusCode,
    reason: String,
    headers: Headers,
    body: Bytes,
    close_connection: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::with_status(StatusCode::OK)
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty HTTP/1.1 keep-alive response with `status` and its canonical reason.
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            version: Version::HTTP_11,
            status,
            reason: canonical_reason(status).to_string(),
            headers: Headers::new(),
            body: Bytes::new(),
            close_connection: false,
        }
    }

    /// A 200 response answering `req`: same protocol version and the
    /// connection directive the client asked for.
    pub fn for_request(req: &Request) -> Self {
        let mut response = Self::with_status(StatusCode::OK);
        response.version = req.version();
        response.close_connection = req.wants_close();
        response
    }

    pub fn text(body: impl Into<Bytes>) -> Self {
        Self::with_body(mime::TEXT_PLAIN_UTF_8, body)
    }

    pub fn html(body: impl Into<Bytes>) -> Self {
        Self::with_body(mime::TEXT_HTML_UTF_8, body)
    }

    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::with_body(mime::APPLICATION_JSON, body)
    }

    fn with_body(content_type: Mime, body: impl Into<Bytes>) -> Self {
        let mut response = Self::default();
        response.set_content_type(&content_type);
        response.set_body(body);
        response
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn close_connection(&self) -> bool {
        self.close_connection
    }

    /// Sets the status code together with its canonical reason phrase.
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self.reason = canonical_reason(status).to_string();
        self
    }

    /// Sets the full status line, allowing a custom reason phrase.
    pub fn set_status_line(&mut self, version: Version, status: StatusCode, reason: impl Into<String>) -> &mut Self {
        self.version = version;
        self.status = status;
        self.reason = reason.into();
        self
    }

    pub fn set_version(&mut self, version: Version) -> &mut Self {
        self.version = version;
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    pub fn set_content_type(&mut self, content_type: &Mime) -> &mut Self {
        self.headers.insert("Content-Type", content_type.as_ref());
        self
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = body.into();
        self
    }

    pub fn set_close_connection(&mut self, close: bool) -> &mut Self {
        self.close_connection = close;
        self
    }

    /// Copies every header of `other` whose exact name this response does not set yet.
    pub fn inherit_headers(&mut self, other: &Response) -> &mut Self {
        for (name, value) in other.headers.iter() {
            if !self.headers.contains(name) {
                self.headers.insert(name, value);
            }
        }
        self
    }
}

fn canonical_reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}
