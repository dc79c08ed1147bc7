use std::sync::Arc;

use common::stream::LoggedStream;
use tracing::{info, instrument, warn};

use crate::{
    CreateConnection,
    config::AgentConfig,
    connect,
    error::ConnectError,
    http_tunnel,
    request::{ConnectRequest, TargetProtocol},
    socks::{self, SocksConnect},
    strategy::{AgentKind, Strategy},
    tls::TlsConnect,
};

/// Agent for `https` targets. Always tunnels; TLS to the target runs inside the tunnel.
#[derive(Debug, Clone)]
pub struct HttpsAgent {
    config: Arc<AgentConfig>,
    tls: Arc<dyn TlsConnect>,
    socks: Arc<dyn SocksConnect>,
}
impl HttpsAgent {
    pub fn new(
        mut config: AgentConfig,
        tls: Arc<dyn TlsConnect>,
        socks: Arc<dyn SocksConnect>,
    ) -> Self {
        config.tunnel = true;
        match &config.proxy {
            Some(proxy) => info!(%proxy, "Created HTTPS agent"),
            None => info!("Created HTTPS agent without proxy"),
        }
        Self {
            config: Arc::new(config),
            tls,
            socks,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn secure(
        &self,
        req: &ConnectRequest,
        stream: LoggedStream,
    ) -> Result<LoggedStream, ConnectError> {
        if req.target != TargetProtocol::Https {
            warn!(scheme = %req.target, "Plain target on the HTTPS agent");
            drop(stream);
            return Err(ConnectError::ProtocolMismatch {
                agent: AgentKind::Secure,
                target: req.target,
            });
        }
        self.tls
            .connect(req.server_name(), stream)
            .await
            .map_err(ConnectError::Tls)
    }
}

impl CreateConnection for HttpsAgent {
    #[instrument(skip_all, fields(dst = %req.authority()))]
    async fn create_connection(&self, req: &ConnectRequest) -> Result<LoggedStream, ConnectError> {
        let req = self.config.effective_request(req);
        match self.config.strategy() {
            Strategy::Direct => {
                let stream = connect::direct(&req).await?;
                self.tls
                    .connect(req.server_name(), stream)
                    .await
                    .map_err(ConnectError::Tls)
            }
            Strategy::Forward { proxy } | Strategy::HttpTunnel { proxy } => {
                let stream = http_tunnel::connect(
                    &req,
                    proxy,
                    &self.config.proxy_options,
                    self.tls.as_ref(),
                )
                .await?;
                self.secure(&req, stream).await
            }
            Strategy::SocksTunnel { proxy } => {
                let stream = socks::connect(&req, proxy, self.socks.as_ref()).await?;
                self.secure(&req, stream).await
            }
        }
    }
}
