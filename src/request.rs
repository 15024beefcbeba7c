use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::Result;
use crate::body::{Body, BodyFactory, snapshot_factory};
use crate::client::Client;
use crate::context::{Context, ContextError};
use crate::error::{BoxError, Error};
use crate::response::Response;
use crate::retry::RetryPolicy;
use crate::util::{parse_header_name, parse_header_value, redact_uri_for_logs};

/// A single outbound exchange as seen by the pipeline.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
    body_factory: Option<BodyFactory>,
    context: Context,
    retry_policy: Option<Arc<RetryPolicy>>,
    decompress: bool,
}

impl Request {
    /// Parses `uri`, which must be an absolute `http` or `https` URI.
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        Ok(Self::from_uri(method, parse_request_uri(uri)?))
    }

    pub fn from_uri(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Body::empty(),
            body_factory: Some(Arc::new(|| Ok(Body::empty()))),
            context: Context::new(),
            retry_policy: None,
            decompress: true,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn retry_policy(&self) -> Option<&Arc<RetryPolicy>> {
        self.retry_policy.as_ref()
    }

    pub fn decompress(&self) -> bool {
        self.decompress
    }

    /// Returns true when the pipeline can regenerate the body for a new attempt.
    pub fn is_body_replayable(&self) -> bool {
        self.body_factory.is_some()
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Replaces the body. In-memory bodies get a regeneration factory for free;
    /// streams do not, and are buffered by the pipeline only if a retrying
    /// policy is attached.
    pub fn set_body(&mut self, body: impl Into<Body>) -> &mut Self {
        let body = body.into();
        self.body_factory = snapshot_factory(&body);
        self.body = body;
        self
    }

    /// Replaces the body with the first output of `factory` and keeps the
    /// factory to regenerate it for later attempts.
    pub fn set_body_factory<F>(&mut self, factory: F) -> io::Result<&mut Self>
    where
        F: Fn() -> io::Result<Body> + Send + Sync + 'static,
    {
        self.body = factory()?;
        self.body_factory = Some(Arc::new(factory));
        Ok(self)
    }

    pub fn set_context(&mut self, context: Context) -> &mut Self {
        self.context = context;
        self
    }

    pub fn set_retry_policy(&mut self, retry_policy: impl Into<Arc<RetryPolicy>>) -> &mut Self {
        self.retry_policy = Some(retry_policy.into());
        self
    }

    pub fn set_decompress(&mut self, decompress: bool) -> &mut Self {
        self.decompress = decompress;
        self
    }

    pub(crate) fn body_factory(&self) -> Option<&BodyFactory> {
        self.body_factory.as_ref()
    }

    pub(crate) fn install_body_factory(&mut self, factory: BodyFactory) {
        self.body_factory = Some(factory);
    }

    pub(crate) fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Swaps in a fresh body from the factory. Without a factory the body is
    /// left as is, which is only the case for single-attempt requests.
    pub(crate) fn regenerate_body(&mut self) -> io::Result<()> {
        if let Some(factory) = &self.body_factory {
            self.body = factory()?;
        }
        Ok(())
    }

    pub(crate) fn redacted_uri(&self) -> String {
        redact_uri_for_logs(&self.uri.to_string())
    }

    pub(crate) fn context_error(&self, error: ContextError) -> Error {
        let method = self.method.clone();
        let uri = self.redacted_uri();
        match error {
            ContextError::Cancelled => Error::Cancelled { method, uri },
            ContextError::DeadlineExceeded => Error::DeadlineExceeded { method, uri },
        }
    }

    pub(crate) fn apply_default_headers(&mut self, default_headers: &HeaderMap) {
        for (name, value) in default_headers {
            if !self.headers.contains_key(name) {
                self.headers.insert(name.clone(), value.clone());
            }
        }
    }

    /// Builds the transport-level request for one attempt, consuming the
    /// current body.
    pub(crate) fn to_http_request(&mut self) -> Result<http::Request<Body>> {
        let body = self.take_body();
        let mut builder = http::Request::builder()
            .method(self.method.clone())
            .uri(self.uri.clone());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
        }
        builder
            .body(body)
            .map_err(|source| Error::RequestBuild { source })
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.redacted_uri())
            .field("headers", &self.headers.len())
            .field("body", &self.body)
            .field("body_replayable", &self.body_factory.is_some())
            .field("retry_policy", &self.retry_policy)
            .field("decompress", &self.decompress)
            .finish()
    }
}

pub(crate) fn parse_request_uri(uri: &str) -> Result<Uri> {
    let parsed: Uri = uri.parse().map_err(|_| Error::InvalidUri {
        uri: uri.to_owned(),
    })?;
    let scheme_ok = parsed.scheme_str().is_some_and(|scheme| {
        scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
    });
    if !scheme_ok || parsed.host().is_none() {
        return Err(Error::InvalidUri {
            uri: uri.to_owned(),
        });
    }
    Ok(parsed)
}

/// Fluent construction of a [`Request`] bound to a [`Client`].
///
/// Construction errors are carried along and reported in the error slot of
/// the [`Response`] returned by [`RequestBuilder::send`].
pub struct RequestBuilder<'a> {
    client: &'a Client,
    request: Result<Request>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a Client, method: Method, uri: &str) -> Self {
        Self {
            client,
            request: Request::new(method, uri),
        }
    }

    fn update(mut self, apply: impl FnOnce(&mut Request) -> Result<()>) -> Self {
        if let Ok(request) = &mut self.request
            && let Err(error) = apply(request)
        {
            self.request = Err(error);
        }
        self
    }

    pub fn header(self, name: HeaderName, value: HeaderValue) -> Self {
        self.update(|request| {
            request.headers_mut().insert(name, value);
            Ok(())
        })
    }

    pub fn try_header(self, name: &str, value: &str) -> Self {
        self.update(|request| request.set_header(name, value).map(|_| ()))
    }

    pub fn bearer_token(self, token: &str) -> Self {
        self.try_header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    pub fn body(self, body: impl Into<Body>) -> Self {
        let body = body.into();
        self.update(|request| {
            request.set_body(body);
            Ok(())
        })
    }

    pub fn body_bytes(self, body: Bytes) -> Self {
        self.body(body)
    }

    pub fn body_stream<S, E>(self, stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.body(Body::from_stream(stream))
    }

    pub fn body_reader<R>(self, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        self.body(Body::from_reader(reader))
    }

    pub fn json<T>(self, payload: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_json::to_vec(payload);
        self.update(|request| {
            let encoded = encoded.map_err(|source| Error::Serialize { source })?;
            request.set_body(encoded);
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(())
        })
    }

    pub fn context(self, context: Context) -> Self {
        self.update(|request| {
            request.set_context(context);
            Ok(())
        })
    }

    /// Bounds the whole exchange, retries and backoff included.
    pub fn total_timeout(self, timeout: Duration) -> Self {
        self.update(|request| {
            let context = request.context().with_timeout(timeout);
            request.set_context(context);
            Ok(())
        })
    }

    pub fn retry(self, retry_policy: impl Into<Arc<RetryPolicy>>) -> Self {
        let retry_policy = retry_policy.into();
        self.update(|request| {
            request.set_retry_policy(retry_policy);
            Ok(())
        })
    }

    pub fn decompress(self, decompress: bool) -> Self {
        self.update(|request| {
            request.set_decompress(decompress);
            Ok(())
        })
    }

    pub fn build(self) -> Result<Request> {
        self.request
    }

    pub async fn send(self) -> Response {
        match self.request {
            Ok(request) => self.client.execute(request).await,
            Err(error) => Response::failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::Request;
    use crate::body::Body;
    use crate::error::Error;

    #[test]
    fn rejects_non_http_schemes_and_relative_uris() {
        for uri in ["ftp://example.com/file", "/relative/path", "not a uri"] {
            match Request::new(Method::GET, uri) {
                Err(Error::InvalidUri { uri: reported }) => assert_eq!(reported, uri),
                other => panic!("unexpected result for {uri}: {other:?}"),
            }
        }
    }

    #[test]
    fn fresh_requests_have_empty_replayable_body() {
        let request = Request::new(Method::GET, "https://api.example.com/v1").expect("valid uri");
        assert!(request.body().is_empty());
        assert!(request.is_body_replayable());
    }

    #[test]
    fn set_body_tracks_replay_capability() {
        let mut request =
            Request::new(Method::POST, "https://api.example.com/v1").expect("valid uri");
        request.set_body("payload");
        assert!(request.is_body_replayable());
        assert_eq!(request.body().content_length(), Some(7));

        request.set_body(Body::from_reader(tokio::io::empty()));
        assert!(!request.is_body_replayable());

        request.set_body(Vec::new());
        assert!(request.is_body_replayable());
        assert_eq!(request.body().content_length(), Some(0));
    }

    #[test]
    fn regenerate_body_restores_buffer_after_take() {
        let mut request =
            Request::new(Method::PUT, "https://api.example.com/v1").expect("valid uri");
        request.set_body("hello");
        let first = request.take_body();
        assert_eq!(first.content_length(), Some(5));
        assert!(request.body().is_empty());

        request.regenerate_body().expect("regenerate");
        assert_eq!(request.body().content_length(), Some(5));
    }

    #[test]
    fn set_header_rejects_invalid_names() {
        let mut request =
            Request::new(Method::GET, "https://api.example.com/v1").expect("valid uri");
        let error = request
            .set_header("bad header", "value")
            .expect_err("space in name is invalid");
        assert!(matches!(error, Error::InvalidHeaderName { .. }));
    }
}
