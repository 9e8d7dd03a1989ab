//! Framed connection.
//!
//! A framed integer is `[u64 LE]`; a framed byte array is
//! `[u64 LE length][payload]`. Every message on the wire is a sequence of
//! these two.

use super::error::{Result, WireError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

/// Upper bound for one byte-array frame.
pub const MAX_FRAME_LEN: u64 = 1 << 30;

/// One request/response exchange over a buffered stream.
pub struct FrameConn<S> {
    stream: BufStream<S>,
}

impl FrameConn<TcpStream> {
    /// Dial a loopback port.
    pub async fn connect(port: u16) -> Result<Self> {
        let addr = format!("127.0.0.1:{}", port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| WireError::Connect { addr, source })?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> FrameConn<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    pub async fn read_u64(&mut self) -> Result<u64> {
        Ok(self.stream.read_u64_le().await?)
    }

    pub async fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u64().await?;
        if len > MAX_FRAME_LEN {
            return Err(WireError::FrameTooLarge(len));
        }
        let mut buf = vec![0u8; len as usize];
        self.stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    pub async fn read_string(&mut self) -> Result<String> {
        String::from_utf8(self.read_bytes().await?).map_err(|_| WireError::InvalidUtf8)
    }

    pub async fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u64().await? != 0)
    }

    /// Read a byte-array frame and decode it as JSON.
    pub async fn read_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.read_bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn write_u64(&mut self, value: u64) -> Result<()> {
        self.stream.write_u64_le(value).await?;
        Ok(())
    }

    pub async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_u64(bytes.len() as u64).await?;
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    pub async fn write_str(&mut self, text: &str) -> Result<()> {
        self.write_bytes(text.as_bytes()).await
    }

    pub async fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u64(u64::from(value)).await
    }

    pub async fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.write_bytes(&bytes).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.stream.flush().await?;
        Ok(())
    }

    /// Wait until the peer closes its side. Used after commands that have no
    /// reply, so the caller knows the receiver finished handling them.
    pub async fn wait_closed(&mut self) -> Result<()> {
        let mut sink = [0u8; 64];
        loop {
            if self.stream.read(&mut sink).await? == 0 {
                return Ok(());
            }
        }
    }
}
