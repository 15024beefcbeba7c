use std::path::PathBuf;

use http::Method;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Where in the pipeline a hook rejected the exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookStage {
    BeforeRequest,
    AfterResponse,
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::BeforeRequest => "before_request",
            Self::AfterResponse => "after_response",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUri,
    InvalidHeaderName,
    InvalidHeaderValue,
    SerializeJson,
    RequestBuild,
    Transport,
    Timeout,
    Cancelled,
    DeadlineExceeded,
    Admission,
    BodyReplay,
    Hook,
    ReadBody,
    DecodeContentEncoding,
    DecodedBodyTooLarge,
    Deserialize,
    HttpStatus,
    InvalidPattern,
    TlsConfig,
    ReadCertificate,
    GlobalClientUnset,
    GlobalClientAlreadySet,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::SerializeJson => "serialize_json",
            Self::RequestBuild => "request_build",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Admission => "admission",
            Self::BodyReplay => "body_replay",
            Self::Hook => "hook",
            Self::ReadBody => "read_body",
            Self::DecodeContentEncoding => "decode_content_encoding",
            Self::DecodedBodyTooLarge => "decoded_body_too_large",
            Self::Deserialize => "deserialize",
            Self::HttpStatus => "http_status",
            Self::InvalidPattern => "invalid_pattern",
            Self::TlsConfig => "tls_config",
            Self::ReadCertificate => "read_certificate",
            Self::GlobalClientUnset => "global_client_unset",
            Self::GlobalClientAlreadySet => "global_client_already_set",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to serialize request json: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("http attempt timed out after {timeout_ms}ms for {method} {uri}")]
    Timeout {
        timeout_ms: u128,
        method: Method,
        uri: String,
    },
    #[error("request cancelled for {method} {uri}")]
    Cancelled { method: Method, uri: String },
    #[error("request deadline exceeded for {method} {uri}")]
    DeadlineExceeded { method: Method, uri: String },
    #[error("rate limiter rejected {method} {uri}: {source}")]
    Admission {
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to buffer request body for replay on {method} {uri}: {source}")]
    BodyReplay {
        method: Method,
        uri: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: HookStage,
        #[source]
        source: BoxError,
    },
    #[error("failed to read response body: {source}")]
    ReadBody {
        #[source]
        source: BoxError,
    },
    #[error("failed to decode response content-encoding {encoding}: {message}")]
    DecodeContentEncoding { encoding: String, message: String },
    #[error("decoded response body exceeds {limit_bytes} bytes (read {actual_bytes})")]
    DecodedBodyTooLarge {
        limit_bytes: usize,
        actual_bytes: usize,
    },
    #[error("failed to decode response json: {source}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected http status {status} for {method} {uri}")]
    HttpStatus {
        status: u16,
        method: Method,
        uri: String,
    },
    #[error("invalid url pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid tls configuration: {message}")]
    TlsConfig { message: String },
    #[error("failed to read certificate file {}: {source}", path.display())]
    ReadCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no global client has been installed")]
    GlobalClientUnset,
    #[error("a global client has already been installed")]
    GlobalClientAlreadySet,
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::Serialize { .. } => ErrorCode::SerializeJson,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::DeadlineExceeded { .. } => ErrorCode::DeadlineExceeded,
            Self::Admission { .. } => ErrorCode::Admission,
            Self::BodyReplay { .. } => ErrorCode::BodyReplay,
            Self::Hook { .. } => ErrorCode::Hook,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::DecodeContentEncoding { .. } => ErrorCode::DecodeContentEncoding,
            Self::DecodedBodyTooLarge { .. } => ErrorCode::DecodedBodyTooLarge,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
            Self::InvalidPattern { .. } => ErrorCode::InvalidPattern,
            Self::TlsConfig { .. } => ErrorCode::TlsConfig,
            Self::ReadCertificate { .. } => ErrorCode::ReadCertificate,
            Self::GlobalClientUnset => ErrorCode::GlobalClientUnset,
            Self::GlobalClientAlreadySet => ErrorCode::GlobalClientAlreadySet,
        }
    }

    /// True when the request context fired, as opposed to the server or the
    /// network failing.
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }

    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}
