use std::fmt;

use crate::descriptor::ProxyDescriptor;

/// How a connection reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy<'a> {
    Direct,
    /// The proxy receives the full request in absolute form
    Forward { proxy: &'a ProxyDescriptor },
    /// `CONNECT` through an HTTP(S) proxy
    HttpTunnel { proxy: &'a ProxyDescriptor },
    SocksTunnel { proxy: &'a ProxyDescriptor },
}

pub fn select(proxy: Option<&ProxyDescriptor>, tunnel: bool) -> Strategy<'_> {
    let Some(proxy) = proxy else {
        return Strategy::Direct;
    };
    if !proxy.protocol.is_http() {
        return Strategy::SocksTunnel { proxy };
    }
    if !tunnel {
        return Strategy::Forward { proxy };
    }
    Strategy::HttpTunnel { proxy }
}

/// The target protocol an agent serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Plain,
    Secure,
}
impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "http"),
            Self::Secure => write!(f, "https"),
        }
    }
}
