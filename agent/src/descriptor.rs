use std::{fmt, io, str::FromStr, sync::Arc};

use common::{
    addr::{InternetAddr, strip_brackets},
    header::{authority, basic_auth},
};
use hyper::http::HeaderValue;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks,
    Socks4,
    Socks4a,
    Socks5,
    Socks5h,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocksVersion {
    V4,
    V5,
}

impl ProxyProtocol {
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        Some(match scheme {
            "http" => Self::Http,
            "https" => Self::Https,
            "socks" => Self::Socks,
            "socks4" => Self::Socks4,
            "socks4a" => Self::Socks4a,
            "socks5" => Self::Socks5,
            "socks5h" => Self::Socks5h,
            _ => return None,
        })
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks => "socks",
            Self::Socks4 => "socks4",
            Self::Socks4a => "socks4a",
            Self::Socks5 => "socks5",
            Self::Socks5h => "socks5h",
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }

    pub fn socks_version(&self) -> Option<SocksVersion> {
        match self {
            Self::Http | Self::Https => None,
            Self::Socks4 | Self::Socks4a => Some(SocksVersion::V4),
            Self::Socks | Self::Socks5 | Self::Socks5h => Some(SocksVersion::V5),
        }
    }

    /// Whether the destination name is resolved locally before the SOCKS handshake.
    pub fn client_side_lookup(&self) -> bool {
        matches!(self, Self::Socks4 | Self::Socks5)
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
            _ => 1080,
        }
    }
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// An upstream proxy.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyDescriptor {
    pub protocol: ProxyProtocol,
    pub host: Arc<str>,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: Option<Arc<str>>,
    #[serde(default)]
    pub password: Option<Arc<str>>,
}

impl ProxyDescriptor {
    pub fn new(protocol: ProxyProtocol, host: &str, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            username: None,
            password: None,
        }
        .normalized()
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Strips IPv6 brackets off the host and fills in the default port.
    pub fn normalized(mut self) -> Self {
        let host = strip_brackets(&self.host);
        if host.len() != self.host.len() {
            self.host = host.into();
        }
        if self.port == 0 {
            self.port = self.protocol.default_port();
        }
        self
    }

    pub fn from_url(url: &Url) -> Result<Self, ParseProxyError> {
        let scheme = url.scheme();
        let protocol = match ProxyProtocol::from_scheme(scheme) {
            Some(protocol) => protocol,
            None => {
                warn!(scheme, "Unrecognized proxy protocol, using SOCKS5");
                ProxyProtocol::Socks
            }
        };
        let host = match url.host_str() {
            Some(host) if !host.is_empty() => strip_brackets(host),
            _ => return Err(ParseProxyError::NoHost),
        };
        let port = url.port().unwrap_or(protocol.default_port());
        let username = Some(url.username())
            .filter(|username| !username.is_empty())
            .map(decode);
        let password = url.password().map(decode);
        Ok(Self {
            protocol,
            host: host.into(),
            port,
            username,
            password,
        })
    }

    /// `host[:port]` of the proxy, the port left out when it is 80 or 443.
    pub fn hop_authority(&self) -> String {
        authority(&self.host, self.port, matches!(self.port, 80 | 443))
    }

    pub fn address(&self) -> io::Result<InternetAddr> {
        InternetAddr::from_host_and_port(&self.host, self.port)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }

    pub fn proxy_authorization(&self) -> Option<HeaderValue> {
        if !self.has_credentials() {
            return None;
        }
        let username = self.username.as_deref().unwrap_or_default();
        let password = self.password.as_deref().unwrap_or_default();
        Some(basic_auth(username, password))
    }
}

fn decode(s: &str) -> Arc<str> {
    percent_decode_str(s).decode_utf8_lossy().into()
}

impl FromStr for ProxyDescriptor {
    type Err = ParseProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s)?;
        Self::from_url(&url)
    }
}

impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.protocol)?;
        if let Some(username) = &self.username {
            write!(f, "{username}")?;
            if self.password.is_some() {
                write!(f, ":***")?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}", authority(&self.host, self.port, false))
    }
}

impl fmt::Debug for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyDescriptor")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ParseProxyError {
    #[error("Malformed proxy URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Proxy URL has no host")]
    NoHost,
}
