use std::{fmt, io, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use common::{
    addr::{InternetAddr, InternetAddrKind, Lookup},
    stream::{LoggedStream, StreamKind, tcp},
};
use thiserror::Error;
use tokio_io_timeout::TimeoutStream;
use tokio_socks::{
    TargetAddr,
    tcp::{Socks4Stream, Socks5Stream},
};
use tracing::{instrument, trace, warn};

use crate::{
    descriptor::{ProxyDescriptor, ProxyProtocol, SocksVersion},
    error::ConnectError,
    request::ConnectRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    Connect,
}

/// Everything a SOCKS client needs for one handshake.
#[derive(Debug, Clone)]
pub struct SocksConnectSpec {
    pub proxy: ProxyDescriptor,
    /// A resolved IP when the lookup happens locally, the name otherwise
    pub destination: InternetAddr,
    pub command: SocksCommand,
    pub timeout: Option<Duration>,
}

/// Performs the SOCKS handshake and returns the tunneled stream.
#[async_trait]
pub trait SocksConnect: fmt::Debug + Send + Sync + 'static {
    async fn connect(
        &self,
        spec: &SocksConnectSpec,
        lookup: &dyn Lookup,
    ) -> Result<LoggedStream, SocksError>;
}

#[derive(Debug, Error)]
pub enum SocksError {
    #[error("Failed to reach SOCKS proxy: {0}")]
    Io(#[from] io::Error),
    #[error("SOCKS handshake failed: {0}")]
    Handshake(#[from] tokio_socks::Error),
    #[error("SOCKS handshake timed out")]
    Timeout,
    #[error("`{0}` is not a SOCKS proxy")]
    NotSocks(ProxyProtocol),
}

/// SOCKS client over `tokio-socks`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSocks;

#[async_trait]
impl SocksConnect for TokioSocks {
    async fn connect(
        &self,
        spec: &SocksConnectSpec,
        lookup: &dyn Lookup,
    ) -> Result<LoggedStream, SocksError> {
        let version = spec
            .proxy
            .protocol
            .socks_version()
            .ok_or(SocksError::NotSocks(spec.proxy.protocol))?;
        let handshake = async {
            let proxy_addr = spec.proxy.address()?;
            let upstream = tcp::connect(&proxy_addr, lookup, None).await?;
            let target = target_addr(&spec.destination);
            let username = spec.proxy.username.as_deref();
            let password = spec.proxy.password.as_deref().unwrap_or_default();
            let upstream = match (version, username) {
                (SocksVersion::V4, None) => Socks4Stream::connect_with_socket(upstream, target)
                    .await?
                    .into_inner(),
                (SocksVersion::V4, Some(user_id)) => {
                    Socks4Stream::connect_with_userid_and_socket(upstream, target, user_id)
                        .await?
                        .into_inner()
                }
                (SocksVersion::V5, None) => Socks5Stream::connect_with_socket(upstream, target)
                    .await?
                    .into_inner(),
                (SocksVersion::V5, Some(username)) => {
                    Socks5Stream::connect_with_password_and_socket(
                        upstream, target, username, password,
                    )
                    .await?
                    .into_inner()
                }
            };
            Ok::<_, SocksError>(upstream)
        };
        let upstream = match spec.timeout {
            Some(timeout) => tokio::time::timeout(timeout, handshake)
                .await
                .map_err(|_| SocksError::Timeout)??,
            None => handshake.await?,
        };
        Ok(LoggedStream::new(
            upstream,
            StreamKind::Socks,
            spec.destination.clone(),
        ))
    }
}

fn target_addr(addr: &InternetAddr) -> TargetAddr<'_> {
    match &**addr {
        InternetAddrKind::SocketAddr(addr) => TargetAddr::Ip(*addr),
        InternetAddrKind::DomainName { addr, port } => TargetAddr::Domain(addr.as_ref().into(), *port),
    }
}

/// Tunnels to the request target through a SOCKS proxy.
///
/// The destination name is resolved locally for `socks4` and `socks5` and passed through otherwise.
/// With a request timeout the returned stream also errors after that long without traffic.
#[instrument(skip_all, fields(dst = %conn.authority(), proxy = %proxy))]
pub async fn connect(
    conn: &ConnectRequest,
    proxy: &ProxyDescriptor,
    socks: &dyn SocksConnect,
) -> Result<LoggedStream, ConnectError> {
    let destination = conn.address()?;
    let destination = if proxy.protocol.client_side_lookup() {
        // SOCKS4 only carries IPv4 destinations
        let sock_addr = match proxy.protocol.socks_version() {
            Some(SocksVersion::V4) => destination
                .to_socket_addr_v4(conn.lookup())
                .await
                .map(SocketAddr::V4),
            _ => destination.to_socket_addr(conn.lookup()).await,
        }
        .inspect_err(|e| warn!(?e, %destination, "Failed to resolve destination"))?;
        InternetAddr::from(sock_addr)
    } else {
        destination
    };
    trace!(%destination, "SOCKS destination");

    let spec = SocksConnectSpec {
        proxy: proxy.clone(),
        destination,
        command: SocksCommand::Connect,
        timeout: conn.timeout,
    };
    let stream = socks
        .connect(&spec, conn.lookup())
        .await
        .inspect_err(|e| warn!(?e, "SOCKS connect failed"))?;

    let Some(timeout) = conn.timeout else {
        return Ok(stream);
    };
    Ok(stream.map(|inner| {
        let mut stream = TimeoutStream::new(inner);
        stream.set_read_timeout(Some(timeout));
        stream.set_write_timeout(Some(timeout));
        Box::pin(stream)
    }))
}
