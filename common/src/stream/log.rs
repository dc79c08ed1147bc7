use std::{
    fmt, io,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::info;

use crate::addr::InternetAddr;

use super::IoStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Plain connection to the destination
    Direct,
    /// Connection to the proxy itself
    Proxy,
    /// HTTP CONNECT tunnel
    Tunnel,
    /// SOCKS tunnel
    Socks,
    /// TLS layered on another stream
    Secure,
}
impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Direct => "direct",
            Self::Proxy => "proxy",
            Self::Tunnel => "tunnel",
            Self::Socks => "socks",
            Self::Secure => "secure",
        };
        f.write_str(s)
    }
}

/// A boxed stream that logs when it is closed.
pub struct LoggedStream {
    stream: Box<dyn IoStream>,
    close_log: CloseLog,
}
impl LoggedStream {
    pub fn new<S>(stream: S, kind: StreamKind, peer: InternetAddr) -> Self
    where
        S: IoStream,
    {
        Self {
            stream: Box::new(stream),
            close_log: CloseLog {
                kind,
                peer,
                start: Instant::now(),
            },
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.close_log.kind
    }

    pub fn peer(&self) -> &InternetAddr {
        &self.close_log.peer
    }

    /// Wraps the inner stream while keeping the same close log.
    pub fn map<S, F>(self, f: F) -> Self
    where
        S: IoStream,
        F: FnOnce(Box<dyn IoStream>) -> S,
    {
        let Self { stream, close_log } = self;
        Self {
            stream: Box::new(f(stream)),
            close_log,
        }
    }

    /// Separates the inner stream from its close log.
    ///
    /// The close is logged once, when the [`CloseLog`] or the stream rebuilt from it drops.
    pub fn into_parts(self) -> (Box<dyn IoStream>, CloseLog) {
        let Self { stream, close_log } = self;
        (stream, close_log)
    }
}
impl fmt::Debug for LoggedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggedStream")
            .field("kind", &self.close_log.kind)
            .field("peer", &self.close_log.peer)
            .finish()
    }
}

#[derive(Debug)]
pub struct CloseLog {
    kind: StreamKind,
    peer: InternetAddr,
    start: Instant,
}
impl CloseLog {
    /// Puts `stream` under this log with a new kind.
    pub fn attach<S>(mut self, stream: S, kind: StreamKind) -> LoggedStream
    where
        S: IoStream,
    {
        self.kind = kind;
        LoggedStream {
            stream: Box::new(stream),
            close_log: self,
        }
    }
}
impl Drop for CloseLog {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        info!(kind = %self.kind, peer = %self.peer, ?duration, "Socket closed");
    }
}

impl AsyncRead for LoggedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for LoggedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.stream.is_write_vectored()
    }
}
