use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use hyper::http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{InvalidHeaderName, InvalidHeaderValue},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::{
    descriptor::ProxyDescriptor,
    request::ConnectRequest,
    strategy::{self, Strategy},
};

/// Source of the extra headers sent to the proxy.
///
/// Called once per connection attempt.
pub trait HeaderProvider: fmt::Debug + Send + Sync + 'static {
    fn headers(&self) -> HeaderMap;
}
impl HeaderProvider for HeaderMap {
    fn headers(&self) -> HeaderMap {
        self.clone()
    }
}

/// Headers produced by a closure.
pub struct HeaderFn<F>(pub F);
impl<F> fmt::Debug for HeaderFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HeaderFn").finish()
    }
}
impl<F> HeaderProvider for HeaderFn<F>
where
    F: Fn() -> HeaderMap + Send + Sync + 'static,
{
    fn headers(&self) -> HeaderMap {
        (self.0)()
    }
}

/// Options that apply to the proxy hop only.
#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    pub headers: Option<Arc<dyn HeaderProvider>>,
    pub timeout: Option<Duration>,
}
impl ProxyOptions {
    pub fn hop_headers(&self) -> HeaderMap {
        match &self.headers {
            Some(headers) => headers.headers(),
            None => HeaderMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ProxySpec {
    Url(String),
    Descriptor(ProxyDescriptor),
}
impl ProxySpec {
    pub fn resolve(self) -> Option<ProxyDescriptor> {
        match self {
            Self::Url(url) => match url.parse::<ProxyDescriptor>() {
                Ok(proxy) => Some(proxy),
                Err(e) => {
                    warn!(?e, "Invalid proxy, connecting directly");
                    None
                }
            },
            Self::Descriptor(proxy) => Some(proxy.normalized()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyOptionsConfig {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: Option<u64>,
}
impl ProxyOptionsConfig {
    pub fn build(self) -> Result<ProxyOptions, BuildError> {
        let headers = if self.headers.is_empty() {
            None
        } else {
            let mut map = HeaderMap::with_capacity(self.headers.len());
            for (name, value) in self.headers {
                let name = HeaderName::try_from(name)?;
                let value = HeaderValue::try_from(value)?;
                map.append(name, value);
            }
            Some(Arc::new(map) as Arc<dyn HeaderProvider>)
        };
        Ok(ProxyOptions {
            headers,
            timeout: millis(self.timeout_ms),
        })
    }
}

/// Agent options as written in a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentOptions {
    pub proxy: Option<ProxySpec>,
    #[serde(default)]
    pub proxy_opts: ProxyOptionsConfig,
    pub tunnel: Option<bool>,
    #[serde(default)]
    pub keep_alive: bool,
    pub max_sockets: Option<usize>,
    pub max_free_sockets: Option<usize>,
    pub timeout_ms: Option<u64>,
}
impl AgentOptions {
    pub fn build(self) -> Result<AgentConfig, BuildError> {
        let proxy = self.proxy.and_then(ProxySpec::resolve);
        let proxy_options = self.proxy_opts.build()?;
        Ok(AgentConfig {
            proxy,
            tunnel: self.tunnel.unwrap_or(false),
            proxy_options,
            keep_alive: self.keep_alive,
            timeout: millis(self.timeout_ms),
            max_sockets: self.max_sockets,
            max_free_sockets: self.max_free_sockets,
        })
    }
}

fn millis(ms: Option<u64>) -> Option<Duration> {
    ms.filter(|ms| *ms != 0).map(Duration::from_millis)
}

/// Immutable per-agent configuration.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub proxy: Option<ProxyDescriptor>,
    pub tunnel: bool,
    pub proxy_options: ProxyOptions,
    pub keep_alive: bool,
    pub timeout: Option<Duration>,
    /// Left to the connection pool
    pub max_sockets: Option<usize>,
    /// Left to the connection pool
    pub max_free_sockets: Option<usize>,
}
impl AgentConfig {
    pub fn with_proxy(proxy: ProxyDescriptor) -> Self {
        Self {
            proxy: Some(proxy.normalized()),
            ..Default::default()
        }
    }

    pub fn strategy(&self) -> Strategy<'_> {
        strategy::select(self.proxy.as_ref(), self.tunnel)
    }

    /// Fills the request's unset timeout with the agent timeout.
    pub fn effective_request(&self, req: &ConnectRequest) -> ConnectRequest {
        let mut req = req.clone();
        if req.timeout.is_none() {
            req.timeout = self.timeout;
        }
        req.keep_alive |= self.keep_alive;
        req
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid proxy header name: {0}")]
    HeaderName(#[from] InvalidHeaderName),
    #[error("Invalid proxy header value: {0}")]
    HeaderValue(#[from] InvalidHeaderValue),
    #[error("Failed to build TLS config: {0}")]
    Tls(#[from] rustls::Error),
}
