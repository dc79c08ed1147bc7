use std::{io, time::Duration};

use tokio::net::TcpStream;
use tracing::{error, trace};

use crate::addr::{InternetAddr, Lookup};

/// Opens a TCP connection to `addr`, resolving it with `lookup` first.
///
/// `timeout` covers both the resolution and the handshake.
pub async fn connect(
    addr: &InternetAddr,
    lookup: &dyn Lookup,
    timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    let connect = async {
        let sock_addr = addr.to_socket_addr(lookup).await?;
        trace!(%addr, ?sock_addr, "Connecting");
        TcpStream::connect(sock_addr).await
    };
    let res = match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, connect).await {
            Ok(res) => res,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "Timed out")),
        },
        None => connect.await,
    };
    let stream = res.inspect_err(|e| error!(?e, %addr, "Failed to connect to address"))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}
