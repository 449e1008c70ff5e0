use std::collections::HashMap;
use std::fmt;

use http::Method;

use super::RouterError;

type Matcher = matchit::Router<()>;

/// A route whose path is a template like `/users/{id}` or `/files/{*rest}`.
///
/// Each pattern is compiled into its own matcher so that candidates can be
/// tried one by one, in registration order.
pub struct PatternRoute<T> {
    method: Method,
    pattern: String,
    matcher: Matcher,
    target: T,
}

impl<T> PatternRoute<T> {
    pub fn new(method: Method, pattern: impl Into<String>, target: T) -> Result<Self, RouterError> {
        let pattern = pattern.into();
        let mut matcher = Matcher::new();
        matcher
            .insert(pattern.as_str(), ())
            .map_err(|source| RouterError::InvalidPattern { pattern: pattern.clone(), source })?;

        Ok(Self { method, pattern, matcher, target })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Returns the captured parameters when both the method and the path match.
    pub fn matches(&self, method: &Method, path: &str) -> Option<HashMap<String, String>> {
        if self.method != *method {
            return None;
        }

        let matched = self.matcher.at(path).ok()?;
        Some(matched.params.iter().map(|(name, value)| (name.to_owned(), value.to_owned())).collect())
    }
}

impl<T> fmt::Debug for PatternRoute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRoute").field("method", &self.method).field("pattern", &self.pattern).finish()
    }
}
