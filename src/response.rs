use bytes::Bytes;
use futures_core::Stream;
use futures_util::TryStreamExt;
use http::{HeaderMap, Method, StatusCode, Version};
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Incoming;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::body::map_infallible_to_box_error;
use crate::content_encoding::{
    decode_content_encoded_body, pending_content_encoding, remove_content_encoding_headers,
};
use crate::error::{BoxError, Error};

/// A single-use response body as produced by a transport.
pub struct ResponseBody {
    inner: UnsyncBoxBody<Bytes, BoxError>,
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self {
            inner: Empty::<Bytes>::new()
                .map_err(map_infallible_to_box_error)
                .boxed_unsync(),
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            inner: Full::new(bytes.into())
                .map_err(map_infallible_to_box_error)
                .boxed_unsync(),
        }
    }

    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let stream = stream
            .map_ok(Frame::data)
            .map_err(|error| -> BoxError { error.into() });
        Self {
            inner: StreamBody::new(stream).boxed_unsync(),
        }
    }

    pub(crate) fn from_incoming(body: Incoming) -> Self {
        Self {
            inner: body.map_err(|error| Box::new(error) as BoxError).boxed_unsync(),
        }
    }

    pub async fn into_bytes(self) -> std::result::Result<Bytes, BoxError> {
        Ok(self.inner.collect().await?.to_bytes())
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("ResponseBody")
    }
}

/// Outcome of a pipeline run: a transport response, an error, or a response
/// whose error slot was filled by a later stage.
///
/// Once the error slot is set, body accessors return that error.
#[derive(Debug)]
pub struct Response {
    status: Option<StatusCode>,
    version: Option<Version>,
    headers: HeaderMap,
    body: Option<ResponseBody>,
    content: Option<Bytes>,
    content_encoding: Option<String>,
    max_decoded_bytes: usize,
    method: Option<Method>,
    uri: Option<String>,
    error: Option<Error>,
}

impl Response {
    pub fn failed(error: Error) -> Self {
        Self {
            status: None,
            version: None,
            headers: HeaderMap::new(),
            body: None,
            content: None,
            content_encoding: None,
            max_decoded_bytes: usize::MAX,
            method: None,
            uri: None,
            error: Some(error),
        }
    }

    /// A response with an in-memory body, as a transport or a test would build it.
    pub fn from_parts(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status: Some(status),
            version: None,
            headers,
            body: Some(ResponseBody::from_bytes(body)),
            content: None,
            content_encoding: None,
            max_decoded_bytes: usize::MAX,
            method: None,
            uri: None,
            error: None,
        }
    }

    /// `decode_limit` enables content decoding, capped at that many bytes.
    pub(crate) fn from_transport(
        response: http::Response<ResponseBody>,
        method: &Method,
        uri: String,
        decode_limit: Option<usize>,
    ) -> Self {
        let (parts, body) = response.into_parts();
        let mut headers = parts.headers;
        let content_encoding = decode_limit
            .and_then(|_| pending_content_encoding(method, parts.status, &headers));
        if content_encoding.is_some() {
            remove_content_encoding_headers(&mut headers);
        }
        Self {
            status: Some(parts.status),
            version: Some(parts.version),
            headers,
            body: Some(body),
            content: None,
            content_encoding,
            max_decoded_bytes: decode_limit.unwrap_or(usize::MAX),
            method: Some(method.clone()),
            uri: Some(uri),
            error: None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_some_and(|status| status.is_success())
    }

    /// Body bytes buffered by [`Response::prefetch`].
    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub(crate) fn record_error(&mut self, error: Error) {
        self.body = None;
        self.error = Some(error);
    }

    pub fn into_result(self) -> Result<Self> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    /// Reads the body into memory so it can be inspected more than once.
    /// Read failures land in the error slot.
    pub async fn prefetch(&mut self) -> &mut Self {
        if self.error.is_some() || self.content.is_some() {
            return self;
        }
        let Some(body) = self.body.take() else {
            self.content = Some(Bytes::new());
            return self;
        };
        let raw = match body.into_bytes().await {
            Ok(raw) => raw,
            Err(source) => {
                self.error = Some(Error::ReadBody { source });
                return self;
            }
        };
        let decoded = match self.content_encoding.take() {
            Some(encoding) => decode_content_encoded_body(raw, &encoding, self.max_decoded_bytes),
            None => Ok(raw),
        };
        match decoded {
            Ok(content) => self.content = Some(content),
            Err(error) => self.error = Some(error),
        }
        self
    }

    pub async fn bytes(mut self) -> Result<Bytes> {
        self.prefetch().await;
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(self.content.unwrap_or_default())
    }

    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T>(self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| Error::Deserialize { source })
    }

    /// Fails with [`Error::HttpStatus`] unless the status is `expected`.
    pub fn check_status(&self, expected: StatusCode) -> Result<()> {
        self.check_status_with(|status| status == expected)
    }

    pub fn check_status_2xx(&self) -> Result<()> {
        self.check_status_with(|status| status.is_success())
    }

    fn check_status_with(&self, accept: impl Fn(StatusCode) -> bool) -> Result<()> {
        match self.status {
            Some(status) if accept(status) => Ok(()),
            Some(status) => Err(Error::HttpStatus {
                status: status.as_u16(),
                method: self.method.clone().unwrap_or(Method::GET),
                uri: self.uri.clone().unwrap_or_default(),
            }),
            None => Ok(()),
        }
    }

    pub fn ensure_status(mut self, expected: StatusCode) -> Self {
        if self.error.is_none()
            && let Err(error) = self.check_status(expected)
        {
            self.record_error(error);
        }
        self
    }

    pub fn ensure_status_2xx(mut self) -> Self {
        if self.error.is_none()
            && let Err(error) = self.check_status_2xx()
        {
            self.record_error(error);
        }
        self
    }
}
