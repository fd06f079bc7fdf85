//! Byte-stream source abstraction.
//!
//! [`ByteStreamSource`] opens a [`Connection`]; a connection hands back one
//! [`RecvOutcome`] per receive. The measurement loop only ever sees these two
//! traits, so tests can drive it with a scripted source instead of a socket.
//! [`TcpSource`] is the production implementation on top of tokio.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{ProbeError, Result};

/// Result of a single bounded receive
#[derive(Debug)]
pub enum RecvOutcome {
    /// At least one byte arrived
    Data(Vec<u8>),
    /// Peer closed the stream (zero-length read)
    Closed,
    /// Nothing arrived within the receive timeout
    Timeout,
    /// Transport-level failure
    IoError(io::Error),
}

/// An open byte stream to the peer.
pub trait Connection: Send {
    /// Wait up to `timeout` for at most `max_bytes` bytes.
    fn receive(
        &mut self,
        max_bytes: usize,
        timeout: Duration,
    ) -> impl Future<Output = RecvOutcome> + Send;

    /// Release the connection. Idempotent; failures are logged, not returned.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Something that can open a [`Connection`] to an address.
pub trait ByteStreamSource {
    type Conn: Connection;

    fn open(
        &self,
        address: &str,
        connect_timeout: Duration,
    ) -> impl Future<Output = Result<Self::Conn>> + Send;
}

// ---------------------------------------------------------------------------
// TCP
// ---------------------------------------------------------------------------

/// Opens plain TCP connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpSource;

impl ByteStreamSource for TcpSource {
    type Conn = TcpConnection;

    async fn open(&self, address: &str, connect_timeout: Duration) -> Result<TcpConnection> {
        match timeout(connect_timeout, TcpStream::connect(address)).await {
            Err(_) => Err(ProbeError::ConnectTimeout {
                address: address.to_string(),
                timeout: connect_timeout,
            }),
            Ok(Err(e)) => Err(ProbeError::Connect {
                address: address.to_string(),
                reason: e.to_string(),
            }),
            Ok(Ok(stream)) => {
                // Small units should not sit in Nagle buffers on our side either.
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Failed to set TCP_NODELAY on {}: {}", address, e);
                }
                Ok(TcpConnection::new(address, stream))
            }
        }
    }
}

/// A TCP stream owned by one measurement run.
///
/// The socket is also released when the value is dropped, so a panic between
/// open and [`Connection::close`] does not leak it.
#[derive(Debug)]
pub struct TcpConnection {
    peer: String,
    stream: Option<TcpStream>,
    buf: Vec<u8>,
}

impl TcpConnection {
    pub fn new(peer: &str, stream: TcpStream) -> Self {
        Self {
            peer: peer.to_string(),
            stream: Some(stream),
            buf: Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl Connection for TcpConnection {
    async fn receive(&mut self, max_bytes: usize, recv_timeout: Duration) -> RecvOutcome {
        let Some(stream) = self.stream.as_mut() else {
            return RecvOutcome::Closed;
        };
        let max_bytes = max_bytes.max(1);
        if self.buf.len() < max_bytes {
            self.buf.resize(max_bytes, 0);
        }

        match timeout(recv_timeout, stream.read(&mut self.buf[..max_bytes])).await {
            Err(_) => RecvOutcome::Timeout,
            Ok(Ok(0)) => RecvOutcome::Closed,
            Ok(Ok(n)) => RecvOutcome::Data(self.buf[..n].to_vec()),
            Ok(Err(e)) => RecvOutcome::IoError(e),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            tracing::info!("Closing connection to {}", self.peer);
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("Shutdown of {} failed: {}", self.peer, e);
            }
        }
    }
}
