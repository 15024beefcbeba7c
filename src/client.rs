use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};

use crate::Result;
use crate::config::ClientProfile;
use crate::execution::Pipeline;
use crate::hooks::{AfterResponseHook, BeforeRequestHook};
use crate::limiter::Limiter;
use crate::request::{Request, RequestBuilder};
use crate::response::Response;
use crate::retry::RetryPolicy;
use crate::tls::TlsOptions;
use crate::transport::{HyperTransportBuilder, Transport};
use crate::util::{parse_header_name, parse_header_value};

pub struct ClientBuilder {
    profile: ClientProfile,
    transport: Option<Arc<dyn Transport>>,
    tls_options: TlsOptions,
    connect_timeout: Option<Duration>,
    attempt_timeout: Option<Duration>,
    limiter: Option<Arc<dyn Limiter>>,
    before_request: Vec<Arc<dyn BeforeRequestHook>>,
    after_response: Vec<Arc<dyn AfterResponseHook>>,
    retry_policy: Option<Arc<RetryPolicy>>,
    auto_decompress: bool,
    max_decoded_body_bytes: usize,
    default_headers: HeaderMap,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        let profile = ClientProfile::default();
        Self {
            profile,
            transport: None,
            tls_options: TlsOptions::default(),
            connect_timeout: None,
            attempt_timeout: Some(profile.defaults().attempt_timeout),
            limiter: None,
            before_request: Vec::new(),
            after_response: Vec::new(),
            retry_policy: None,
            auto_decompress: true,
            max_decoded_body_bytes: profile.defaults().max_decoded_body_bytes,
            default_headers: HeaderMap::new(),
        }
    }

    /// Applies the profile's timeouts and pool settings. Call it before any
    /// individual override.
    pub fn profile(mut self, profile: ClientProfile) -> Self {
        self.profile = profile;
        self.attempt_timeout = Some(profile.defaults().attempt_timeout);
        self.max_decoded_body_bytes = profile.defaults().max_decoded_body_bytes;
        self
    }

    /// Replaces the default hyper transport. TLS and connect settings on this
    /// builder are then ignored.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn tls_options(mut self, tls_options: TlsOptions) -> Self {
        self.tls_options = tls_options;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    /// Bounds each attempt up to the response head.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.attempt_timeout = None;
        self
    }

    pub fn limiter(mut self, limiter: impl Limiter + 'static) -> Self {
        self.limiter = Some(Arc::new(limiter));
        self
    }

    pub fn shared_limiter(mut self, limiter: Arc<dyn Limiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn before_request(mut self, hook: impl BeforeRequestHook + 'static) -> Self {
        self.before_request.push(Arc::new(hook));
        self
    }

    pub fn after_response(mut self, hook: impl AfterResponseHook + 'static) -> Self {
        self.after_response.push(Arc::new(hook));
        self
    }

    /// Policy for requests that do not carry their own.
    pub fn retry_policy(mut self, retry_policy: impl Into<Arc<RetryPolicy>>) -> Self {
        self.retry_policy = Some(retry_policy.into());
        self
    }

    pub fn auto_decompress(mut self, enabled: bool) -> Self {
        self.auto_decompress = enabled;
        self
    }

    /// Caps the size of a decompressed response body. Reads that would
    /// exceed it fail with [`Error::DecodedBodyTooLarge`](crate::Error::DecodedBodyTooLarge).
    pub fn max_decoded_body_bytes(mut self, max_bytes: usize) -> Self {
        self.max_decoded_body_bytes = max_bytes.max(1);
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.default_header(name, value))
    }

    pub fn try_build(self) -> Result<Client> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let mut builder =
                    HyperTransportBuilder::from_profile(self.profile).tls_options(self.tls_options);
                if let Some(connect_timeout) = self.connect_timeout {
                    builder = builder.connect_timeout(connect_timeout);
                }
                Arc::new(builder.try_build()?)
            }
        };
        Ok(Client {
            pipeline: Arc::new(Pipeline {
                transport,
                limiter: self.limiter,
                before_request: self.before_request,
                after_response: self.after_response,
                retry_policy: self.retry_policy,
                attempt_timeout: self.attempt_timeout,
                auto_decompress: self.auto_decompress,
                max_decoded_body_bytes: self.max_decoded_body_bytes,
                default_headers: self.default_headers,
            }),
        })
    }
}

/// Entry point of the request pipeline. Cheap to clone; clones share the
/// transport, limiter and hooks.
#[derive(Clone)]
pub struct Client {
    pipeline: Arc<Pipeline>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("limiter", &self.pipeline.limiter.is_some())
            .field("before_request_hooks", &self.pipeline.before_request.len())
            .field("after_response_hooks", &self.pipeline.after_response.len())
            .field("retry_policy", &self.pipeline.retry_policy)
            .field("attempt_timeout", &self.pipeline.attempt_timeout)
            .field("auto_decompress", &self.pipeline.auto_decompress)
            .field("max_decoded_body_bytes", &self.pipeline.max_decoded_body_bytes)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// A client with the standard profile and the default transport.
    pub fn try_new() -> Result<Self> {
        ClientBuilder::new().try_build()
    }

    /// Runs `request` through the pipeline. Failures are reported in the
    /// response's error slot.
    pub async fn execute(&self, request: Request) -> Response {
        self.pipeline.execute(request).await
    }

    pub fn request(&self, method: Method, uri: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, uri)
    }

    pub fn get(&self, uri: &str) -> RequestBuilder<'_> {
        self.request(Method::GET, uri)
    }

    pub fn post(&self, uri: &str) -> RequestBuilder<'_> {
        self.request(Method::POST, uri)
    }

    pub fn put(&self, uri: &str) -> RequestBuilder<'_> {
        self.request(Method::PUT, uri)
    }

    pub fn patch(&self, uri: &str) -> RequestBuilder<'_> {
        self.request(Method::PATCH, uri)
    }

    pub fn delete(&self, uri: &str) -> RequestBuilder<'_> {
        self.request(Method::DELETE, uri)
    }

    pub fn head(&self, uri: &str) -> RequestBuilder<'_> {
        self.request(Method::HEAD, uri)
    }
}
