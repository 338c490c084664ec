use crate::error::{Result, SwarmError};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Largest frame body accepted from a peer. A block is 16 KiB; bitfields stay far below this.
pub const MAX_FRAME_LEN: usize = 1 << 20;

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// One TCP connection to a peer. Reads are buffered, so a read timeout in the
/// middle of a frame keeps the bytes received so far for the next call.
pub struct Transport<S = TcpStream> {
    stream: S,
    read_buf: BytesMut,
    read_timeout: Duration,
}

impl Transport<TcpStream> {
    /// Connect with a bounded wait, telling a timeout apart from a refusal
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        debug!("Connecting to {}", addr);

        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                SwarmError::Timeout(format!("connect to {} after {:?}", addr, connect_timeout))
            })??;
        stream.set_nodelay(true)?;

        Ok(Self::new(stream, read_timeout))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Transport<S> {
    pub fn new(stream: S, read_timeout: Duration) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(32 * 1024),
            read_timeout,
        }
    }

    /// Write every byte of `data`; short writes are continued, a zero write means the peer is gone
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let n = timeout(WRITE_TIMEOUT, self.stream.write(&data[written..]))
                .await
                .map_err(|_| SwarmError::Timeout("write".to_string()))??;
            if n == 0 {
                return Err(SwarmError::ConnectionClosed);
            }
            written += n;
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Exactly `n` bytes, used for the fixed-size handshake
    pub async fn receive_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        self.fill(n).await?;
        Ok(self.read_buf.split_to(n).to_vec())
    }

    /// One length-prefixed frame without its prefix. A keep-alive yields an empty frame.
    pub async fn receive_framed(&mut self) -> Result<Vec<u8>> {
        self.fill(4).await?;
        let len = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]) as usize;

        if len > MAX_FRAME_LEN {
            return Err(SwarmError::ProtocolError(format!(
                "frame of {} bytes exceeds limit of {}",
                len, MAX_FRAME_LEN
            )));
        }

        self.fill(4 + len).await?;
        self.read_buf.advance(4);
        Ok(self.read_buf.split_to(len).to_vec())
    }

    async fn fill(&mut self, n: usize) -> Result<()> {
        if self.read_buf.len() < n {
            self.read_buf.reserve(n - self.read_buf.len());
        }

        while self.read_buf.len() < n {
            let read = timeout(self.read_timeout, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| SwarmError::Timeout(format!("read after {:?}", self.read_timeout)))??;

            if read == 0 {
                return Err(SwarmError::ConnectionClosed);
            }
        }

        Ok(())
    }
}
