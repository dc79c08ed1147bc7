//! In-process upstream proxies that record what the agent sends them.

use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use common::{addr::Lookup, stream::LoggedStream};
use proxy_agent::{
    AgentOptions, ProxyAgent,
    socks::TokioSocks,
    tls::TlsConnect,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_log() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Builds the agent pair with the real SOCKS client and `tls` in place of rustls.
pub fn agent(options: &str, tls: Arc<dyn TlsConnect>) -> ProxyAgent {
    let options: AgentOptions = toml::from_str(options).unwrap();
    ProxyAgent::with_capabilities(options.build().unwrap(), tls, Arc::new(TokioSocks))
}

/// Hands the stream back untouched and remembers the server names it was asked for.
#[derive(Debug, Default)]
pub struct RecordingTls {
    pub server_names: Mutex<Vec<String>>,
}
#[async_trait]
impl TlsConnect for RecordingTls {
    async fn connect(&self, server_name: &str, stream: LoggedStream) -> io::Result<LoggedStream> {
        self.server_names.lock().unwrap().push(server_name.to_owned());
        Ok(stream)
    }
}

#[derive(Debug)]
pub struct FixedLookup {
    pub ip: IpAddr,
    pub hosts: Mutex<Vec<String>>,
}
impl FixedLookup {
    pub fn new(ip: &str) -> Self {
        Self {
            ip: ip.parse().unwrap(),
            hosts: Mutex::new(vec![]),
        }
    }
}
#[async_trait]
impl Lookup for FixedLookup {
    async fn lookup(&self, host: &str) -> io::Result<IpAddr> {
        self.hosts.lock().unwrap().push(host.to_owned());
        Ok(self.ip)
    }
}

async fn read_head<S>(stream: &mut S) -> io::Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut head = vec![];
    let mut byte = [0; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).await? == 0 {
            break;
        }
        head.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

/// Echoes until the peer goes away.
async fn echo<S>(stream: &mut S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if stream.write_all(&buf[..n]).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// An HTTP proxy serving one connection.
///
/// It reads the request head, writes `reply` if any, then echoes until EOF.
/// The handle resolves to the request head once the agent has closed the connection.
pub async fn spawn_http_proxy(reply: Option<&'static str>) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await.unwrap();
        if let Some(reply) = reply {
            stream.write_all(reply.as_bytes()).await.unwrap();
        }
        echo(&mut stream).await;
        head
    });
    (addr, handle)
}

/// A plain echo server serving one connection.
pub async fn spawn_echo() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        echo(&mut stream).await;
    });
    (addr, handle)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    pub atyp: u8,
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

/// A SOCKS5 proxy serving one connection.
///
/// Answers the CONNECT with `rep`; on success it echoes until EOF.
pub async fn spawn_socks5_proxy(rep: u8) -> (SocketAddr, JoinHandle<SocksRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let req = socks5_handshake(&mut stream, rep).await.unwrap();
        if rep == 0 {
            echo(&mut stream).await;
        }
        req
    });
    (addr, handle)
}

async fn socks5_handshake(stream: &mut TcpStream, rep: u8) -> io::Result<SocksRequest> {
    // Method selection
    let mut header = [0; 2];
    stream.read_exact(&mut header).await?;
    assert_eq!(header[0], 5);
    let mut methods = vec![0; header[1] as usize];
    stream.read_exact(&mut methods).await?;
    let credentials = if methods.contains(&2) {
        stream.write_all(&[5, 2]).await?;
        let mut version = [0; 1];
        stream.read_exact(&mut version).await?;
        let username = read_short_string(stream).await?;
        let password = read_short_string(stream).await?;
        stream.write_all(&[1, 0]).await?;
        Some((username, password))
    } else {
        stream.write_all(&[5, 0]).await?;
        None
    };

    // Request
    let mut header = [0; 4];
    stream.read_exact(&mut header).await?;
    assert_eq!(&header[..3], &[5, 1, 0]);
    let atyp = header[3];
    let host = match atyp {
        1 => {
            let mut ip = [0; 4];
            stream.read_exact(&mut ip).await?;
            IpAddr::from(ip).to_string()
        }
        3 => read_short_string(stream).await?,
        4 => {
            let mut ip = [0; 16];
            stream.read_exact(&mut ip).await?;
            IpAddr::from(ip).to_string()
        }
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "Bad ATYP")),
    };
    let port = stream.read_u16().await?;
    stream.write_all(&[5, rep, 0, 1, 0, 0, 0, 0, 0, 0]).await?;
    Ok(SocksRequest {
        atyp,
        host,
        port,
        credentials,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks4Request {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub user_id: String,
    /// Destination name sent in the SOCKS4a form
    pub domain: Option<String>,
}

/// A SOCKS4/4a proxy serving one connection; grants the request and echoes until EOF.
pub async fn spawn_socks4_proxy() -> (SocketAddr, JoinHandle<Socks4Request>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let req = socks4_handshake(&mut stream).await.unwrap();
        echo(&mut stream).await;
        req
    });
    (addr, handle)
}

async fn socks4_handshake(stream: &mut TcpStream) -> io::Result<Socks4Request> {
    let mut header = [0; 8];
    stream.read_exact(&mut header).await?;
    assert_eq!(&header[..2], &[4, 1]);
    let port = u16::from_be_bytes([header[2], header[3]]);
    let ip = Ipv4Addr::new(header[4], header[5], header[6], header[7]);
    let user_id = read_nul_string(stream).await?;
    // 0.0.0.x with x != 0 announces a trailing name
    let octets = ip.octets();
    let domain = if octets[..3] == [0, 0, 0] && octets[3] != 0 {
        Some(read_nul_string(stream).await?)
    } else {
        None
    };
    stream.write_all(&[0, 0x5a, 0, 0, 0, 0, 0, 0]).await?;
    Ok(Socks4Request {
        ip,
        port,
        user_id,
        domain,
    })
}

async fn read_nul_string(stream: &mut TcpStream) -> io::Result<String> {
    let mut buf = vec![];
    loop {
        let byte = stream.read_u8().await?;
        if byte == 0 {
            break;
        }
        buf.push(byte);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn read_short_string(stream: &mut TcpStream) -> io::Result<String> {
    let len = stream.read_u8().await?;
    let mut buf = vec![0; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub async fn round_trip<S>(stream: &mut S, msg: &[u8])
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(msg).await.unwrap();
    let mut buf = vec![0; msg.len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, msg);
}
