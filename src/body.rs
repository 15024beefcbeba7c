use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{BoxError, Error};
use crate::request::Request;

pub(crate) type ReqBody = UnsyncBoxBody<Bytes, BoxError>;

/// Produces a fresh copy of a request body for every attempt after the first.
pub type BodyFactory = Arc<dyn Fn() -> io::Result<Body> + Send + Sync>;

enum Kind {
    Empty,
    Full(Bytes),
    Stream(BoxStream<'static, io::Result<Bytes>>),
}

/// An outbound request body: nothing, an in-memory buffer, or a single-use stream.
pub struct Body {
    kind: Kind,
}

impl Body {
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// An in-memory body. Zero-length buffers become [`Body::empty`].
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::empty();
        }
        Self {
            kind: Kind::Full(bytes),
        }
    }

    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let stream = stream.map_err(|error| {
            let error: BoxError = error.into();
            match error.downcast::<io::Error>() {
                Ok(error) => *error,
                Err(error) => io::Error::other(error),
            }
        });
        Self {
            kind: Kind::Stream(stream.boxed()),
        }
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            kind: Kind::Stream(ReaderStream::new(reader).boxed()),
        }
    }

    /// Returns true only when the body is known to carry no bytes.
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::Empty)
    }

    /// Exact length for in-memory bodies, `None` for streams.
    pub fn content_length(&self) -> Option<u64> {
        match &self.kind {
            Kind::Empty => Some(0),
            Kind::Full(bytes) => Some(bytes.len() as u64),
            Kind::Stream(_) => None,
        }
    }

    /// Cheap reset for bodies already held in memory. Streams cannot be
    /// rewound and return `None`.
    pub fn try_clone(&self) -> Option<Self> {
        match &self.kind {
            Kind::Empty => Some(Self::empty()),
            Kind::Full(bytes) => Some(Self {
                kind: Kind::Full(bytes.clone()),
            }),
            Kind::Stream(_) => None,
        }
    }

    /// Reads the whole body into memory.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        match self.kind {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Full(bytes) => Ok(bytes),
            Kind::Stream(mut stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok(buffer.freeze())
            }
        }
    }

    pub(crate) fn into_req_body(self) -> ReqBody {
        match self.kind {
            Kind::Empty => Empty::<Bytes>::new()
                .map_err(map_infallible_to_box_error)
                .boxed_unsync(),
            Kind::Full(bytes) => Full::new(bytes)
                .map_err(map_infallible_to_box_error)
                .boxed_unsync(),
            Kind::Stream(stream) => StreamBody::new(
                stream
                    .map_ok(Frame::data)
                    .map_err(|error| Box::new(error) as BoxError),
            )
            .boxed_unsync(),
        }
    }
}

pub(crate) fn map_infallible_to_box_error(never: Infallible) -> BoxError {
    match never {}
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Kind::Empty => formatter.write_str("Body::Empty"),
            Kind::Full(bytes) => formatter
                .debug_struct("Body::Full")
                .field("len", &bytes.len())
                .finish(),
            Kind::Stream(_) => formatter.write_str("Body::Stream"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::from_bytes(text)
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::from_bytes(text)
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

pub(crate) fn snapshot_factory(body: &Body) -> Option<BodyFactory> {
    let snapshot = body.try_clone()?;
    let factory: BodyFactory = match snapshot.kind {
        Kind::Empty => Arc::new(|| Ok(Body::empty())),
        Kind::Full(bytes) => Arc::new(move || Ok(Body::from_bytes(bytes.clone()))),
        Kind::Stream(_) => return None,
    };
    Some(factory)
}

/// Makes the request body replayable before the first of several attempts.
///
/// Bodies that already have a factory, or are empty, are left untouched.
/// Anything else is drained into memory once, racing the request context.
pub(crate) async fn prepare_replay(request: &mut Request) -> Result<(), Error> {
    if request.body_factory().is_some() || request.body().is_empty() {
        return Ok(());
    }

    if let Some(factory) = snapshot_factory(request.body()) {
        request.install_body_factory(factory);
        return Ok(());
    }

    let body = request.take_body();
    let context = request.context().clone();
    let drained = match context.run(body.into_bytes()).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(source)) => {
            return Err(Error::BodyReplay {
                method: request.method().clone(),
                uri: request.redacted_uri(),
                source,
            });
        }
        Err(error) => return Err(request.context_error(error)),
    };
    debug!(
        body_bytes = drained.len(),
        "buffered streaming request body for replay"
    );
    request.set_body(Body::from_bytes(drained));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use bytes::Bytes;
    use futures_util::stream;

    use super::{Body, snapshot_factory};

    #[test]
    fn zero_length_buffers_normalize_to_empty() {
        let body = Body::from_bytes(Vec::new());
        assert!(body.is_empty());
        assert_eq!(body.content_length(), Some(0));
    }

    #[test]
    fn streams_have_no_cheap_reset() {
        let body = Body::from_stream(stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(
            b"abc",
        ))]));
        assert!(body.try_clone().is_none());
        assert!(body.content_length().is_none());
        assert!(snapshot_factory(&body).is_none());
    }

    #[tokio::test]
    async fn snapshot_factory_yields_identical_buffers() {
        let body = Body::from("hello world");
        let factory = snapshot_factory(&body).expect("buffered body should be snapshotable");
        for _ in 0..3 {
            let replay = factory().expect("factory should succeed");
            let bytes = replay.into_bytes().await.expect("buffered read");
            assert_eq!(bytes, Bytes::from_static(b"hello world"));
        }
    }

    #[tokio::test]
    async fn stream_body_concatenates_chunks() {
        let body = Body::from_stream(stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]));
        let bytes = body.into_bytes().await.expect("stream read");
        assert_eq!(bytes, Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn stream_body_surfaces_read_errors() {
        let body = Body::from_stream(stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "source went away")),
        ]));
        let error = body.into_bytes().await.expect_err("read should fail");
        assert_eq!(error.kind(), io::ErrorKind::ConnectionReset);
    }
}
