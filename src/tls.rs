use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::Result;
use crate::error::Error;

#[derive(Clone)]
struct ClientIdentity {
    cert_chain_pem: Vec<u8>,
    private_key_pem: Vec<u8>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClientIdentity")
            .field("cert_chain_pem_len", &self.cert_chain_pem.len())
            .finish_non_exhaustive()
    }
}

/// Trust anchors and client identity for the rustls connector.
///
/// The webpki roots are trusted unless disabled; extra PEM roots are added on
/// top of them.
#[derive(Clone, Debug)]
pub struct TlsOptions {
    webpki_roots: bool,
    root_certificates_pem: Vec<Vec<u8>>,
    client_identity: Option<ClientIdentity>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            webpki_roots: true,
            root_certificates_pem: Vec::new(),
            client_identity: None,
        }
    }
}

impl TlsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn webpki_roots(mut self, enabled: bool) -> Self {
        self.webpki_roots = enabled;
        self
    }

    pub fn add_root_certificate_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.root_certificates_pem.push(pem.into());
        self
    }

    /// Reads a PEM bundle from disk. The contents are parsed when the
    /// transport is built.
    pub fn add_root_certificates_pem_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|source| Error::ReadCertificate {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.add_root_certificate_pem(pem))
    }

    pub fn client_identity_pem(
        mut self,
        cert_chain_pem: impl Into<Vec<u8>>,
        private_key_pem: impl Into<Vec<u8>>,
    ) -> Self {
        self.client_identity = Some(ClientIdentity {
            cert_chain_pem: cert_chain_pem.into(),
            private_key_pem: private_key_pem.into(),
        });
        self
    }
}

fn tls_config_error(message: impl Into<String>) -> Error {
    Error::TlsConfig {
        message: message.into(),
    }
}

fn parse_certificates(pem: &[u8], what: &str) -> Result<Vec<CertificateDer<'static>>> {
    let mut parsed = Vec::new();
    for item in CertificateDer::pem_slice_iter(pem) {
        let certificate =
            item.map_err(|source| tls_config_error(format!("failed to parse {what}: {source}")))?;
        parsed.push(certificate);
    }
    if parsed.is_empty() {
        return Err(tls_config_error(format!("no certificate blocks found in {what}")));
    }
    Ok(parsed)
}

fn build_root_store(options: &TlsOptions) -> Result<rustls::RootCertStore> {
    let mut root_store = if options.webpki_roots {
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned())
    } else {
        rustls::RootCertStore::empty()
    };
    for pem in &options.root_certificates_pem {
        let parsed = parse_certificates(pem, "PEM root certificate")?;
        let (added, _ignored) = root_store.add_parsable_certificates(parsed);
        if added == 0 {
            return Err(tls_config_error("failed to parse PEM root certificate(s)"));
        }
    }
    if root_store.is_empty() {
        return Err(tls_config_error("no trusted root certificates configured"));
    }
    Ok(root_store)
}

pub(crate) fn build_rustls_config(options: &TlsOptions) -> Result<rustls::ClientConfig> {
    let root_store = build_root_store(options)?;
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config_builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|source| tls_config_error(source.to_string()))?
        .with_root_certificates(root_store);

    let Some(identity) = &options.client_identity else {
        return Ok(config_builder.with_no_client_auth());
    };
    let cert_chain = parse_certificates(&identity.cert_chain_pem, "client certificate chain PEM")?;
    let private_key =
        PrivateKeyDer::from_pem_slice(&identity.private_key_pem).map_err(|source| {
            tls_config_error(format!("failed to parse client private key PEM: {source}"))
        })?;
    config_builder
        .with_client_auth_cert(cert_chain, private_key)
        .map_err(|source| {
            tls_config_error(format!("failed to configure client identity: {source}"))
        })
}
