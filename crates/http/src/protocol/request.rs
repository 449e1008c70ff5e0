//! HTTP request value object.
//!
//! A [`Request`] is assembled by the [`RequestDecoder`](crate::codec::RequestDecoder)
//! (or by [`Request::builder`] outside the parser) and is read-only afterwards.
//! The router never mutates the instance it is handed; pattern routes receive a
//! copy carrying the extracted route parameters, see [`Request::with_route_params`].

use std::collections::HashMap;
use std::time::SystemTime;

use bytes::Bytes;
use http::{Extensions, Method, Version};

use crate::protocol::Headers;

#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: HashMap<String, String>,
    pub(crate) headers: Headers,
    pub(crate) body: Bytes,
    pub(crate) content_length: u64,
    pub(crate) version: Version,
    pub(crate) received_at: SystemTime,
    pub(crate) route_params: HashMap<String, String>,
    pub(crate) extensions: Extensions,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    /// An empty request, used as the in-progress value while parsing.
    pub(crate) fn empty() -> Self {
        Self {
            method: Method::GET,
            path: String::new(),
            query: HashMap::new(),
            headers: Headers::new(),
            body: Bytes::new(),
            content_length: 0,
            version: Version::HTTP_11,
            received_at: SystemTime::UNIX_EPOCH,
            route_params: HashMap::new(),
            extensions: Extensions::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Exact-name header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }

    /// Parameters captured by a pattern route, empty for static routes.
    pub fn route_params(&self) -> &HashMap<String, String> {
        &self.route_params
    }

    pub fn route_param(&self, key: &str) -> Option<&str> {
        self.route_params.get(key).map(String::as_str)
    }

    /// Typed values attached while the request travels the pipeline (e.g. the session).
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Returns a copy of this request carrying `params` as its route parameters.
    pub fn with_route_params(&self, params: HashMap<String, String>) -> Request {
        let mut copy = self.clone();
        copy.route_params.extend(params);
        copy
    }

    /// Whether the client asked for the connection to be closed after this exchange.
    ///
    /// HTTP/1.1 keeps the connection unless `Connection: close` is sent,
    /// HTTP/1.0 closes it unless `Connection: keep-alive` is sent.
    pub fn wants_close(&self) -> bool {
        let connection = self.headers.get_ignore_case("Connection").map(str::trim);
        match self.version {
            Version::HTTP_10 => !connection.is_some_and(|v| v.eq_ignore_ascii_case("keep-alive")),
            _ => connection.is_some_and(|v| v.eq_ignore_ascii_case("close")),
        }
    }
}

/// Decodes a raw query string (the part after `?`) into a key/value mapping.
///
/// Percent escapes and `+` are decoded; repeated keys keep the last value.
pub(crate) fn parse_query(raw: &str) -> HashMap<String, String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(raw).unwrap_or_default().into_iter().collect()
}

/// Builds a [`Request`] without going through the wire parser.
#[derive(Debug)]
pub struct RequestBuilder {
    inner: Request,
}

impl RequestBuilder {
    fn new() -> Self {
        let mut inner = Request::empty();
        inner.path.push('/');
        inner.received_at = SystemTime::now();
        Self { inner }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.inner.method = method;
        self
    }

    /// Sets the path; anything after a `?` becomes the query parameters.
    pub fn uri(mut self, uri: &str) -> Self {
        match uri.split_once('?') {
            Some((path, query)) => {
                self.inner.path = path.to_string();
                self.inner.query = parse_query(query);
            }
            None => {
                self.inner.path = uri.to_string();
                self.inner.query.clear();
            }
        }
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.headers.insert(name, value);
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.inner.version = version;
        self
    }

    /// Sets the body and the declared content length to match it.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.inner.content_length = body.len() as u64;
        self.inner.body = body;
        self
    }

    pub fn received_at(mut self, received_at: SystemTime) -> Self {
        self.inner.received_at = received_at;
        self
    }

    pub fn build(self) -> Request {
        self.inner
    }
}
