use std::io;

use hyper::StatusCode;
use thiserror::Error;

use crate::{request::TargetProtocol, socks::SocksError, strategy::AgentKind};

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Bad response: {}", .0.as_u16())]
    TunnelRejected(StatusCode),
    #[error("Cannot serve `{target}` target from the `{agent}` agent over a tunnel")]
    ProtocolMismatch {
        agent: AgentKind,
        target: TargetProtocol,
    },
    #[error("Transport: {0}")]
    Transport(#[from] io::Error),
    #[error("HTTP: {0}")]
    Http(#[from] hyper::Error),
    #[error("SOCKS: {0}")]
    Socks(#[from] SocksError),
    #[error("TLS: {0}")]
    Tls(#[source] io::Error),
    #[error("Invalid request: {0}")]
    Request(#[from] hyper::http::Error),
}

impl ConnectError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) | Self::Tls(e) => e.kind() == io::ErrorKind::TimedOut,
            Self::Socks(SocksError::Timeout) => true,
            _ => false,
        }
    }
}
