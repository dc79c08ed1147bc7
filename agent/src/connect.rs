use std::time::Duration;

use common::stream::{LoggedStream, StreamKind, tcp};
use tracing::{instrument, trace};

use crate::{
    descriptor::{ProxyDescriptor, ProxyProtocol},
    error::ConnectError,
    request::ConnectRequest,
    tls::TlsConnect,
};

/// TCP straight to the target.
#[instrument(skip_all, fields(addr = %req.authority()))]
pub async fn direct(req: &ConnectRequest) -> Result<LoggedStream, ConnectError> {
    let addr = req.address()?;
    let stream = tcp::connect(&addr, req.lookup(), req.timeout).await?;
    trace!("Connected");
    Ok(LoggedStream::new(stream, StreamKind::Direct, addr))
}

/// TCP to the proxy itself, with TLS on top for an `https` proxy.
#[instrument(skip_all, fields(proxy = %proxy))]
pub async fn proxy_hop(
    req: &ConnectRequest,
    proxy: &ProxyDescriptor,
    timeout: Option<Duration>,
    tls: &dyn TlsConnect,
) -> Result<LoggedStream, ConnectError> {
    let addr = proxy.address()?;
    let stream = tcp::connect(&addr, req.lookup(), timeout).await?;
    let stream = LoggedStream::new(stream, StreamKind::Proxy, addr);
    match proxy.protocol {
        ProxyProtocol::Https => tls
            .connect(&proxy.host, stream)
            .await
            .map_err(ConnectError::Tls),
        _ => Ok(stream),
    }
}
