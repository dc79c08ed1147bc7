use std::{fmt, sync::Arc, time::Duration};

use common::{
    addr::{InternetAddr, Lookup, SystemLookup, strip_brackets},
    header::authority,
};
use hyper::Uri;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetProtocol {
    Http,
    Https,
}
impl TargetProtocol {
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "http" | "ws" => Some(Self::Http),
            "https" | "wss" => Some(Self::Https),
            _ => None,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    pub fn is_default_port(&self, port: u16) -> bool {
        self.default_port() == port
    }
}
impl fmt::Display for TargetProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

static SYSTEM_LOOKUP: SystemLookup = SystemLookup;

/// One connection attempt to a target.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub host: Arc<str>,
    pub port: u16,
    pub target: TargetProtocol,
    /// SNI override for secure targets
    pub servername: Option<Arc<str>>,
    pub keep_alive: bool,
    pub timeout: Option<Duration>,
    pub lookup: Option<Arc<dyn Lookup>>,
}
impl ConnectRequest {
    pub fn new(target: TargetProtocol, host: &str, port: u16) -> Self {
        Self {
            host: strip_brackets(host).into(),
            port,
            target,
            servername: None,
            keep_alive: false,
            timeout: None,
            lookup: None,
        }
    }

    pub fn from_uri(uri: &Uri) -> Result<Self, RequestError> {
        let scheme = uri.scheme_str().unwrap_or("http");
        let target = TargetProtocol::from_scheme(scheme)
            .ok_or_else(|| RequestError::UnsupportedScheme(scheme.into()))?;
        let host = uri.host().ok_or(RequestError::NoHost)?;
        let port = uri.port_u16().unwrap_or(target.default_port());
        Ok(Self::new(target, host, port))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn Lookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_servername(mut self, servername: &str) -> Self {
        self.servername = Some(servername.into());
        self
    }

    /// `host:port`, IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        authority(&self.host, self.port, false)
    }

    pub fn address(&self) -> std::io::Result<InternetAddr> {
        InternetAddr::from_host_and_port(&self.host, self.port)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    }

    pub fn lookup(&self) -> &dyn Lookup {
        match &self.lookup {
            Some(lookup) => lookup.as_ref(),
            None => &SYSTEM_LOOKUP,
        }
    }

    /// Name presented for TLS server name indication.
    pub fn server_name(&self) -> &str {
        self.servername.as_deref().unwrap_or(&*self.host)
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("URI has no host")]
    NoHost,
    #[error("Unsupported scheme `{0}`")]
    UnsupportedScheme(Arc<str>),
}
