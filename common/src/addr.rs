use std::{
    fmt::{self, Display},
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4},
    ops::Deref,
    str::FromStr,
    sync::Arc,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::lookup_host;

/// Resolves a host name to a single IP address.
#[async_trait]
pub trait Lookup: fmt::Debug + Send + Sync + 'static {
    async fn lookup(&self, host: &str) -> io::Result<IpAddr>;

    /// Resolves to an IPv4 address; an IPv6 answer is an error.
    async fn lookup_v4(&self, host: &str) -> io::Result<Ipv4Addr> {
        match self.lookup(host).await? {
            IpAddr::V4(ip) => Ok(ip),
            IpAddr::V6(ip) => Err(no_ipv4(host, Some(ip.into()))),
        }
    }
}

fn no_ipv4(host: &str, got: Option<IpAddr>) -> io::Error {
    let msg = match got {
        Some(ip) => format!("No IPv4 address for `{host}`, got {ip}"),
        None => format!("No IPv4 address for `{host}`"),
    };
    io::Error::new(io::ErrorKind::AddrNotAvailable, msg)
}

/// Resolution through the operating system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLookup;
#[async_trait]
impl Lookup for SystemLookup {
    async fn lookup(&self, host: &str) -> io::Result<IpAddr> {
        let mut addrs = lookup_host((host, 0)).await?;
        addrs.next().map(|addr| addr.ip()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("No address for `{host}`"))
        })
    }

    async fn lookup_v4(&self, host: &str) -> io::Result<Ipv4Addr> {
        let mut addrs = lookup_host((host, 0)).await?;
        addrs
            .find_map(|addr| match addr.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| no_ipv4(host, None))
    }
}

/// Trims the brackets off an IPv6 literal.
pub fn strip_brackets(host: &str) -> &str {
    let host = host.strip_prefix('[').unwrap_or(host);
    host.strip_suffix(']').unwrap_or(host)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternetAddr(InternetAddrKind);

impl Deref for InternetAddr {
    type Target = InternetAddrKind;

    fn deref(&self) -> &Self::Target {
        let Self(kind) = self;
        kind
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InternetAddrKind {
    SocketAddr(SocketAddr),
    DomainName { addr: Arc<str>, port: u16 },
}

impl Display for InternetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self(InternetAddrKind::SocketAddr(addr)) => write!(f, "{addr}"),
            Self(InternetAddrKind::DomainName { addr, port }) => write!(f, "{addr}:{port}"),
        }
    }
}

impl From<SocketAddr> for InternetAddr {
    fn from(addr: SocketAddr) -> Self {
        Self(InternetAddrKind::SocketAddr(addr))
    }
}

impl FromStr for InternetAddr {
    type Err = ParseInternetAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self(InternetAddrKind::SocketAddr(addr)));
        }

        let mut parts = s.split(':');
        let addr = parts.next().ok_or(ParseInternetAddrError)?;
        let port = parts.next().ok_or(ParseInternetAddrError)?;
        let port = port.parse().map_err(|_| ParseInternetAddrError)?;
        if parts.next().is_some() {
            return Err(ParseInternetAddrError);
        }
        Self::from_host_and_port(addr, port)
    }
}

#[derive(Debug, Error, Clone, Copy)]
#[error("Failed to parse Internet address")]
pub struct ParseInternetAddrError;

impl InternetAddr {
    pub fn from_host_and_port(host: &str, port: u16) -> Result<Self, ParseInternetAddrError> {
        let host = strip_brackets(host);
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Self(InternetAddrKind::SocketAddr(SocketAddr::new(
                ip, port,
            ))));
        }

        if host.is_empty() || host.contains(':') {
            return Err(ParseInternetAddrError);
        }
        Ok(Self(InternetAddrKind::DomainName {
            addr: host.into(),
            port,
        }))
    }

    /// Resolves a domain name with `lookup`; IP literals are returned as they are.
    pub async fn to_socket_addr(&self, lookup: &dyn Lookup) -> io::Result<SocketAddr> {
        match self.deref() {
            InternetAddrKind::SocketAddr(addr) => Ok(*addr),
            InternetAddrKind::DomainName { addr, port } => {
                let ip = lookup.lookup(addr).await?;
                Ok(SocketAddr::new(ip, *port))
            }
        }
    }

    /// Like [`Self::to_socket_addr`] but only yields IPv4 addresses.
    pub async fn to_socket_addr_v4(&self, lookup: &dyn Lookup) -> io::Result<SocketAddrV4> {
        match self.deref() {
            InternetAddrKind::SocketAddr(SocketAddr::V4(addr)) => Ok(*addr),
            InternetAddrKind::SocketAddr(SocketAddr::V6(addr)) => {
                Err(no_ipv4(&addr.to_string(), None))
            }
            InternetAddrKind::DomainName { addr, port } => {
                let ip = lookup.lookup_v4(addr).await?;
                Ok(SocketAddrV4::new(ip, *port))
            }
        }
    }
}
