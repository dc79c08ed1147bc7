use std::sync::Arc;

use common::stream::LoggedStream;
use hyper::Request;
use tracing::{info, instrument, warn};

use crate::{
    CreateConnection,
    config::AgentConfig,
    connect,
    error::ConnectError,
    forward::{self, RewriteError},
    http_tunnel,
    request::{ConnectRequest, TargetProtocol},
    socks::{self, SocksConnect},
    strategy::{AgentKind, Strategy},
    tls::TlsConnect,
};

/// Agent for `http` targets.
///
/// With an HTTP(S) proxy it forwards by default and tunnels only when asked to.
/// SOCKS proxies always tunnel.
#[derive(Debug, Clone)]
pub struct HttpAgent {
    config: Arc<AgentConfig>,
    tls: Arc<dyn TlsConnect>,
    socks: Arc<dyn SocksConnect>,
}
impl HttpAgent {
    pub fn new(
        mut config: AgentConfig,
        tls: Arc<dyn TlsConnect>,
        socks: Arc<dyn SocksConnect>,
    ) -> Self {
        match &config.proxy {
            Some(proxy) => {
                if !proxy.protocol.is_http() {
                    config.tunnel = true;
                }
                info!(%proxy, tunnel = config.tunnel, "Created HTTP agent");
            }
            None => info!("Created HTTP agent without proxy"),
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

    /// Readies `req` for the connection [`CreateConnection::create_connection`] hands out.
    ///
    /// Only forward mode changes the request.
    pub fn add_request<B>(
        &self,
        req: &mut Request<B>,
        conn: &ConnectRequest,
    ) -> Result<(), RewriteError> {
        let Strategy::Forward { proxy } = self.config.strategy() else {
            return Ok(());
        };
        let conn = self.config.effective_request(conn);
        forward::rewrite(
            req,
            &conn,
            proxy,
            &self.config.proxy_options,
            conn.keep_alive,
        )
    }
}

impl CreateConnection for HttpAgent {
    #[instrument(skip_all, fields(dst = %req.authority()))]
    async fn create_connection(&self, req: &ConnectRequest) -> Result<LoggedStream, ConnectError> {
        let req = self.config.effective_request(req);
        let stream = match self.config.strategy() {
            Strategy::Direct => return connect::direct(&req).await,
            Strategy::Forward { proxy } => {
                let timeout = self.config.proxy_options.timeout.or(req.timeout);
                return connect::proxy_hop(&req, proxy, timeout, self.tls.as_ref()).await;
            }
            Strategy::HttpTunnel { proxy } => {
                http_tunnel::connect(
                    &req,
                    proxy,
                    &self.config.proxy_options,
                    self.tls.as_ref(),
                )
                .await?
            }
            Strategy::SocksTunnel { proxy } => {
                socks::connect(&req, proxy, self.socks.as_ref()).await?
            }
        };
        if req.target != TargetProtocol::Http {
            warn!(scheme = %req.target, "Secure target on the HTTP agent");
            drop(stream);
            return Err(ConnectError::ProtocolMismatch {
                agent: AgentKind::Plain,
                target: req.target,
            });
        }
        Ok(stream)
    }
}
