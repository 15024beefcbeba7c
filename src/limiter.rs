use std::sync::Arc;

use futures_util::future::BoxFuture;
use regex::Regex;

use crate::Result;
use crate::context::Context;
use crate::error::{BoxError, Error};
use crate::request::Request;

/// Admission control in front of every exchange.
///
/// `allow` is the non-blocking fast path: `true` lets the request through
/// without waiting. Otherwise the pipeline awaits `wait`, racing it against the
/// request context.
pub trait Limiter: Send + Sync {
    fn allow(&self, request: &Request) -> bool;

    fn wait<'a>(
        &'a self,
        context: &'a Context,
    ) -> BoxFuture<'a, std::result::Result<(), BoxError>>;
}

impl<L> Limiter for Arc<L>
where
    L: Limiter + ?Sized,
{
    fn allow(&self, request: &Request) -> bool {
        (**self).allow(request)
    }

    fn wait<'a>(
        &'a self,
        context: &'a Context,
    ) -> BoxFuture<'a, std::result::Result<(), BoxError>> {
        (**self).wait(context)
    }
}

/// Applies an inner limiter only to URLs matching one of the patterns.
///
/// With no patterns every request is limited.
#[derive(Debug)]
pub struct UrlPatternLimiter<L> {
    inner: L,
    patterns: Vec<Regex>,
}

impl<L> UrlPatternLimiter<L>
where
    L: Limiter,
{
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            patterns: Vec::new(),
        }
    }

    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        let compiled = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        self.patterns.push(compiled);
        Ok(self)
    }

    pub fn compiled_pattern(mut self, pattern: Regex) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L> Limiter for UrlPatternLimiter<L>
where
    L: Limiter,
{
    fn allow(&self, request: &Request) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let url = request.uri().to_string();
        !self.patterns.iter().any(|pattern| pattern.is_match(&url))
    }

    fn wait<'a>(
        &'a self,
        context: &'a Context,
    ) -> BoxFuture<'a, std::result::Result<(), BoxError>> {
        self.inner.wait(context)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::future::BoxFuture;
    use http::Method;

    use super::{Limiter, UrlPatternLimiter};
    use crate::context::Context;
    use crate::error::{BoxError, ErrorCode};
    use crate::request::Request;

    #[derive(Debug)]
    struct Noop;

    impl Limiter for Noop {
        fn allow(&self, _: &Request) -> bool {
            true
        }

        fn wait<'a>(&'a self, _: &'a Context) -> BoxFuture<'a, Result<(), BoxError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn request(uri: &str) -> Request {
        Request::new(Method::GET, uri).expect("valid uri")
    }

    #[test]
    fn no_patterns_limits_everything() {
        let limiter = UrlPatternLimiter::new(Noop);
        assert!(!limiter.allow(&request("https://api.example.com/v1")));
    }

    #[test]
    fn matching_urls_wait_and_others_bypass() {
        let limiter = UrlPatternLimiter::new(Noop)
            .pattern(r"^https://api\.example\.com/")
            .expect("valid pattern");
        assert!(!limiter.allow(&request("https://api.example.com/v1/items")));
        assert!(limiter.allow(&request("https://cdn.example.com/static.js")));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let error = UrlPatternLimiter::new(Noop)
            .pattern("(unclosed")
            .expect_err("pattern does not compile");
        assert_eq!(error.code(), ErrorCode::InvalidPattern);
    }
}
