use std::{fmt, io, sync::Arc};

use async_trait::async_trait;
use common::stream::{LoggedStream, StreamKind};
use rustls::{ClientConfig, RootCertStore, pki_types::ServerName};
use tokio_rustls::TlsConnector;
use tracing::{instrument, trace, warn};

/// Layers TLS on top of an established stream.
#[async_trait]
pub trait TlsConnect: fmt::Debug + Send + Sync + 'static {
    async fn connect(&self, server_name: &str, stream: LoggedStream) -> io::Result<LoggedStream>;
}

#[derive(Clone)]
pub struct RustlsConnector {
    connector: TlsConnector,
}
impl RustlsConnector {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            connector: TlsConnector::from(config),
        }
    }

    /// Verifies servers against the Mozilla root store; offers HTTP/1.1 over ALPN.
    pub fn with_webpki_roots() -> Result<Self, rustls::Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(Self::new(Arc::new(config)))
    }
}
impl fmt::Debug for RustlsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RustlsConnector").finish_non_exhaustive()
    }
}

#[async_trait]
impl TlsConnect for RustlsConnector {
    #[instrument(skip_all, fields(server_name = %server_name))]
    async fn connect(&self, server_name: &str, stream: LoggedStream) -> io::Result<LoggedStream> {
        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let peer = stream.peer().clone();
        let (stream, close_log) = stream.into_parts();
        let stream = self
            .connector
            .connect(name, stream)
            .await
            .inspect_err(|e| warn!(?e, %peer, "TLS handshake failed"))?;
        trace!(%peer, "TLS established");
        Ok(close_log.attach(stream, StreamKind::Secure))
    }
}
