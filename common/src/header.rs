//! Header and field helpers shared by the proxy hop builders.

use base64::{Engine, engine::general_purpose::STANDARD};
use hyper::http::{HeaderMap, HeaderName, HeaderValue};

pub const PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");

/// `Basic` credentials for `Proxy-Authorization`.
///
/// The value is marked sensitive so it stays out of debug output.
pub fn basic_auth(username: &str, password: &str) -> HeaderValue {
    let encoded = STANDARD.encode(format!("{username}:{password}"));
    let mut value = HeaderValue::try_from(format!("Basic {encoded}"))
        .expect("base64 is always a valid header value");
    value.set_sensitive(true);
    value
}

/// Value for both `Connection` and `Proxy-Connection`.
pub fn connection_value(keep_alive: bool) -> HeaderValue {
    if keep_alive {
        HeaderValue::from_static("Keep-Alive")
    } else {
        HeaderValue::from_static("close")
    }
}

/// Copy of `headers` without the fields named in `names`.
pub fn omit(headers: &HeaderMap, names: &[HeaderName]) -> HeaderMap {
    let mut kept = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if names.contains(name) {
            continue;
        }
        kept.append(name.clone(), value.clone());
    }
    kept
}

/// Sets every field of `headers` onto `target`, skipping empty values.
///
/// A field present in both maps is replaced, not merged.
pub fn apply_non_empty(target: &mut HeaderMap, headers: HeaderMap) {
    let mut current: Option<HeaderName> = None;
    for (name, value) in headers {
        match name {
            Some(name) => {
                current = Some(name.clone());
                if value.is_empty() {
                    continue;
                }
                target.insert(name, value);
            }
            None => {
                let Some(name) = current.clone() else {
                    continue;
                };
                if value.is_empty() {
                    continue;
                }
                target.append(name, value);
            }
        }
    }
}

/// `host[:port]`; IPv6 literals are bracketed.
pub fn authority(host: &str, port: u16, elide_port: bool) -> String {
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    };
    if elide_port {
        host
    } else {
        format!("{host}:{port}")
    }
}
