use std::{io, time::Duration};

use bytes::Bytes;
use common::{
    header::{PROXY_CONNECTION, connection_value, omit},
    stream::{LoggedStream, StreamKind},
};
use http_body_util::Empty;
use hyper::{
    Method, Request, StatusCode,
    header::{CONNECTION, HOST, PROXY_AUTHORIZATION},
};
use hyper_util::rt::TokioIo;
use tokio_util::task::AbortOnDropHandle;
use tracing::{instrument, trace, warn};

use crate::{
    config::ProxyOptions, connect::proxy_hop, descriptor::ProxyDescriptor, error::ConnectError,
    request::ConnectRequest, tls::TlsConnect,
};

/// Opens an HTTP `CONNECT` tunnel to the request target through `proxy`.
///
/// The whole exchange is bounded by the hop timeout, falling back to the request timeout.
/// On any failure the connection to the proxy is closed before the error is returned.
#[instrument(skip_all, fields(dst = %conn.authority(), proxy = %proxy))]
pub async fn connect(
    conn: &ConnectRequest,
    proxy: &ProxyDescriptor,
    options: &ProxyOptions,
    tls: &dyn TlsConnect,
) -> Result<LoggedStream, ConnectError> {
    let timeout = options.timeout.or(conn.timeout);
    let establish = establish(conn, proxy, options, tls, timeout);
    let Some(timeout) = timeout else {
        return establish.await;
    };
    match tokio::time::timeout(timeout, establish).await {
        Ok(res) => res,
        Err(_) => {
            warn!(?timeout, "Proxy timeout");
            Err(io::Error::new(io::ErrorKind::TimedOut, "Proxy timeout").into())
        }
    }
}

async fn establish(
    conn: &ConnectRequest,
    proxy: &ProxyDescriptor,
    options: &ProxyOptions,
    tls: &dyn TlsConnect,
    timeout: Option<Duration>,
) -> Result<LoggedStream, ConnectError> {
    let upstream = proxy_hop(conn, proxy, timeout, tls).await?;
    let req = connect_request(conn, proxy, options)?;

    let (mut sender, connection) = hyper::client::conn::http1::Builder::new()
        .title_case_headers(true)
        .handshake(TokioIo::new(upstream))
        .await
        .inspect_err(|e| warn!(?e, "Failed to establish HTTP/1 handshake to proxy"))?;
    // Dropping the driver closes the connection to the proxy
    let driver = AbortOnDropHandle::new(tokio::spawn(async move {
        if let Err(e) = connection.with_upgrades().await {
            trace!(?e, "Proxy connection ended");
        }
    }));

    let resp = sender
        .send_request(req)
        .await
        .inspect_err(|e| warn!(?e, "Failed to send CONNECT to proxy"))?;
    let status = resp.status();
    if status != StatusCode::OK {
        warn!(%status, "Proxy rejected CONNECT");
        drop(driver);
        return Err(ConnectError::TunnelRejected(status));
    }

    let upgraded = hyper::upgrade::on(resp)
        .await
        .inspect_err(|e| warn!(?e, "Failed to take over the tunnel"))?;
    drop(driver);
    trace!("Tunnel established");
    Ok(LoggedStream::new(
        TokioIo::new(upgraded),
        StreamKind::Tunnel,
        conn.address()?,
    ))
}

/// ```text
/// CONNECT www.domain.com:443 HTTP/1.1
/// Host: www.domain.com:443
/// Proxy-Connection: Keep-Alive
/// ```
fn connect_request(
    conn: &ConnectRequest,
    proxy: &ProxyDescriptor,
    options: &ProxyOptions,
) -> Result<Request<Empty<Bytes>>, ConnectError> {
    let authority = conn.authority();
    let mut req = Request::builder()
        .method(Method::CONNECT)
        .uri(authority.as_str())
        .header(HOST, authority.as_str())
        .body(Empty::new())?;

    let headers = req.headers_mut();
    let hop = omit(
        &options.hop_headers(),
        &[HOST, CONNECTION, PROXY_CONNECTION, PROXY_AUTHORIZATION],
    );
    headers.extend(hop);
    let connection = connection_value(conn.keep_alive);
    headers.insert(PROXY_CONNECTION, connection.clone());
    headers.insert(CONNECTION, connection);
    if let Some(auth) = proxy.proxy_authorization() {
        headers.insert(PROXY_AUTHORIZATION, auth);
    }
    Ok(req)
}
