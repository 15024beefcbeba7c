use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client as LegacyClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use crate::Result;
use crate::body::{Body, ReqBody};
use crate::config::ClientProfile;
use crate::error::Error;
use crate::response::ResponseBody;
use crate::tls::{TlsOptions, build_rustls_config};
use crate::util::{classify_transport_error, redact_uri_for_logs};

/// Moves one request over the network.
///
/// Implementations own connection management and TLS. Errors are reported
/// as [`Error::Transport`] so retry triggers can tell them apart.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: http::Request<Body>,
    ) -> BoxFuture<'_, Result<http::Response<ResponseBody>>>;
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    fn send(
        &self,
        request: http::Request<Body>,
    ) -> BoxFuture<'_, Result<http::Response<ResponseBody>>> {
        (**self).send(request)
    }
}

type HyperClient = LegacyClient<HttpsConnector<HttpConnector>, ReqBody>;

/// HTTP/1.1 and HTTP/2 over rustls, with connection pooling.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }
}

impl Transport for HyperTransport {
    fn send(
        &self,
        request: http::Request<Body>,
    ) -> BoxFuture<'_, Result<http::Response<ResponseBody>>> {
        let method = request.method().clone();
        let uri = redact_uri_for_logs(&request.uri().to_string());
        let request = request.map(Body::into_req_body);
        Box::pin(async move {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|source| Error::Transport {
                    kind: classify_transport_error(&source),
                    method,
                    uri,
                    source: Box::new(source),
                })?;
            Ok(response.map(ResponseBody::from_incoming))
        })
    }
}

#[derive(Clone, Debug)]
pub struct HyperTransportBuilder {
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    http2_only: bool,
    tls: TlsOptions,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    pub fn new() -> Self {
        Self::from_profile(ClientProfile::Standard)
    }

    pub fn from_profile(profile: ClientProfile) -> Self {
        let defaults = profile.defaults();
        Self {
            connect_timeout: defaults.connect_timeout,
            pool_idle_timeout: defaults.pool_idle_timeout,
            pool_max_idle_per_host: defaults.pool_max_idle_per_host,
            http2_only: false,
            tls: TlsOptions::default(),
        }
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    pub fn http2_only(mut self, http2_only: bool) -> Self {
        self.http2_only = http2_only;
        self
    }

    pub fn tls_options(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    pub fn add_root_certificate_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.tls = self.tls.add_root_certificate_pem(pem);
        self
    }

    pub fn add_root_certificates_pem_file(
        mut self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self> {
        self.tls = self.tls.add_root_certificates_pem_file(path)?;
        Ok(self)
    }

    pub fn client_identity_pem(
        mut self,
        cert_chain_pem: impl Into<Vec<u8>>,
        private_key_pem: impl Into<Vec<u8>>,
    ) -> Self {
        self.tls = self.tls.client_identity_pem(cert_chain_pem, private_key_pem);
        self
    }

    pub fn try_build(self) -> Result<HyperTransport> {
        let tls_config = build_rustls_config(&self.tls)?;

        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(self.connect_timeout));

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(connector);
        let client = LegacyClient::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .http2_only(self.http2_only)
            .build(https);
        Ok(HyperTransport { client })
    }
}
