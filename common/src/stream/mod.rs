use tokio::io::{AsyncRead, AsyncWrite};

pub mod log;
pub mod tcp;

pub use log::{CloseLog, LoggedStream, StreamKind};

pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
impl<T> IoStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
