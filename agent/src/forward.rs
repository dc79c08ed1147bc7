use common::header::{PROXY_CONNECTION, apply_non_empty, authority, connection_value};
use hyper::{
    Request, Uri,
    header::{CONNECTION, HOST, PROXY_AUTHORIZATION},
    http::{
        HeaderValue,
        header::InvalidHeaderValue,
        uri::{Authority, InvalidUri},
    },
};
use thiserror::Error;
use tracing::trace;

use crate::{
    config::ProxyOptions,
    descriptor::{ProxyDescriptor, ProxyProtocol},
    request::ConnectRequest,
};

/// Where a forwarded request is actually sent.
///
/// Stored in the request extensions by [`rewrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHop {
    pub protocol: ProxyProtocol,
    /// `host[:port]`, the port left out when it is 80 or 443
    pub authority: String,
}

/// Turns `req` into an absolute-form request addressed to `proxy`.
///
/// ref: <https://datatracker.ietf.org/doc/html/rfc9112#name-absolute-form>
pub fn rewrite<B>(
    req: &mut Request<B>,
    conn: &ConnectRequest,
    proxy: &ProxyDescriptor,
    options: &ProxyOptions,
    keep_alive: bool,
) -> Result<(), RewriteError> {
    let elide_port = conn.target.is_default_port(conn.port);

    let host = base_host(req);
    let path = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    let uri = format!(
        "{}://{}{path}",
        conn.target.scheme(),
        authority(&host, conn.port, elide_port),
    );
    *req.uri_mut() = uri.parse::<Uri>()?;

    let host = HeaderValue::try_from(authority(&conn.host, conn.port, elide_port))?;
    req.headers_mut().insert(HOST, host);

    let hop = ProxyHop {
        protocol: proxy.protocol,
        authority: proxy.hop_authority(),
    };
    trace!(uri = %req.uri(), ?hop, "Forwarding through proxy");
    req.extensions_mut().insert(hop);

    let mut headers = options.hop_headers();
    if let Some(auth) = proxy.proxy_authorization() {
        headers.insert(PROXY_AUTHORIZATION, auth);
    }
    let connection = connection_value(keep_alive);
    headers.insert(PROXY_CONNECTION, connection.clone());
    headers.insert(CONNECTION, connection);
    apply_non_empty(req.headers_mut(), headers);
    Ok(())
}

fn base_host<B>(req: &Request<B>) -> String {
    if let Some(host) = req.uri().host() {
        return host.to_owned();
    }
    let from_header = req
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Authority>().ok());
    match from_header {
        Some(authority) => authority.host().to_owned(),
        None => "localhost".to_owned(),
    }
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("Invalid absolute URI: {0}")]
    Uri(#[from] InvalidUri),
    #[error("Invalid header value: {0}")]
    HeaderValue(#[from] InvalidHeaderValue),
}
