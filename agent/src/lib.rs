use std::sync::Arc;

use common::stream::LoggedStream;
use tracing::instrument;

pub mod config;
pub mod connect;
pub mod descriptor;
pub mod error;
pub mod forward;
pub mod http_agent;
pub mod http_tunnel;
pub mod https_agent;
pub mod request;
pub mod socks;
pub mod strategy;
pub mod tls;

pub use config::{AgentConfig, AgentOptions, BuildError, HeaderFn, HeaderProvider, ProxyOptions};
pub use descriptor::{ParseProxyError, ProxyDescriptor, ProxyProtocol};
pub use error::ConnectError;
pub use http_agent::HttpAgent;
pub use https_agent::HttpsAgent;
pub use request::{ConnectRequest, TargetProtocol};

use socks::{SocksConnect, TokioSocks};
use tls::{RustlsConnector, TlsConnect};

/// Hands out one fresh stream per call.
pub trait CreateConnection {
    fn create_connection(
        &self,
        req: &ConnectRequest,
    ) -> impl Future<Output = Result<LoggedStream, ConnectError>> + Send;
}

/// The agent pair: [`HttpAgent`] for `http` targets and [`HttpsAgent`] for `https` targets.
#[derive(Debug, Clone)]
pub struct ProxyAgent {
    pub http: HttpAgent,
    pub https: HttpsAgent,
}
impl ProxyAgent {
    pub fn new(options: AgentOptions) -> Result<Self, BuildError> {
        let config = options.build()?;
        let tls = Arc::new(RustlsConnector::with_webpki_roots()?);
        Ok(Self::with_capabilities(config, tls, Arc::new(TokioSocks)))
    }

    pub fn with_capabilities(
        config: AgentConfig,
        tls: Arc<dyn TlsConnect>,
        socks: Arc<dyn SocksConnect>,
    ) -> Self {
        let http = HttpAgent::new(config.clone(), Arc::clone(&tls), Arc::clone(&socks));
        let https = HttpsAgent::new(config, tls, socks);
        Self { http, https }
    }
}

impl CreateConnection for ProxyAgent {
    #[instrument(skip_all, fields(scheme = %req.target))]
    async fn create_connection(&self, req: &ConnectRequest) -> Result<LoggedStream, ConnectError> {
        match req.target {
            TargetProtocol::Http => self.http.create_connection(req).await,
            TargetProtocol::Https => self.https.create_connection(req).await,
        }
    }
}
