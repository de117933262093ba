//! TCP transport implementation for live link endpoints
//!
//! One wrapper pair serves all three framings so the endpoint loops stay
//! identical whichever convention the peer speaks.

use crate::transport::{AsyncReader, AsyncWriter};
use async_trait::async_trait;
use dcc_link_core::config::MAX_FRAME_SIZE;
use dcc_link_core::{Framing, LinkConfig, LinkError, Result};
use std::io::ErrorKind;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Split a connected stream into framed read/write halves
pub fn split(stream: TcpStream, config: &LinkConfig) -> Result<(TcpReadWrapper, TcpWriteWrapper)> {
    // Disable Nagle's algorithm for low latency
    stream
        .set_nodelay(true)
        .map_err(|e| LinkError::Transport(format!("Failed to set TCP_NODELAY: {}", e)))?;

    let (read_half, write_half) = stream.into_split();
    Ok((
        TcpReadWrapper::new(read_half, config.framing, config.read_buffer_size),
        TcpWriteWrapper::new(write_half, config.framing),
    ))
}

/// TCP read wrapper
pub struct TcpReadWrapper {
    inner: BufReader<OwnedReadHalf>,
    framing: Framing,
    buffer_size: usize,
}

impl TcpReadWrapper {
    pub fn new(half: OwnedReadHalf, framing: Framing, buffer_size: usize) -> Self {
        Self {
            inner: BufReader::new(half),
            framing,
            buffer_size: buffer_size.max(1),
        }
    }

    async fn read_length_prefixed(&mut self) -> Result<Option<Vec<u8>>> {
        // Read 4-byte length prefix (little-endian)
        let mut len_bytes = [0u8; 4];
        match self.inner.read_exact(&mut len_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => {
                return Err(LinkError::Transport(format!("TCP read length failed: {}", e)));
            }
        }
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(LinkError::Protocol(format!("Message too large: {} bytes", len)));
        }

        let mut data = vec![0u8; len];
        self.inner
            .read_exact(&mut data)
            .await
            .map_err(|e| LinkError::Transport(format!("TCP read data failed: {}", e)))?;

        Ok(Some(data))
    }

    async fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let mut line = Vec::new();
            let read = (&mut self.inner)
                .take(MAX_FRAME_SIZE as u64 + 1)
                .read_until(b'\n', &mut line)
                .await
                .map_err(|e| LinkError::Transport(format!("TCP read line failed: {}", e)))?;

            if read == 0 {
                return Ok(None);
            }
            if line.len() > MAX_FRAME_SIZE {
                return Err(LinkError::Protocol(format!(
                    "Line exceeds {} bytes",
                    MAX_FRAME_SIZE
                )));
            }

            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(line));
        }
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut data = vec![0u8; self.buffer_size];
        let read = self
            .inner
            .read(&mut data)
            .await
            .map_err(|e| LinkError::Transport(format!("TCP read failed: {}", e)))?;

        if read == 0 {
            return Ok(None);
        }
        data.truncate(read);
        Ok(Some(data))
    }
}

#[async_trait]
impl AsyncReader for TcpReadWrapper {
    async fn read_message(&mut self) -> Result<Option<Vec<u8>>> {
        match self.framing {
            Framing::LengthPrefixed => self.read_length_prefixed().await,
            Framing::Newline => self.read_line().await,
            Framing::Unframed => self.read_chunk().await,
        }
    }
}

/// TCP write wrapper
pub struct TcpWriteWrapper {
    inner: OwnedWriteHalf,
    framing: Framing,
}

impl TcpWriteWrapper {
    pub fn new(half: OwnedWriteHalf, framing: Framing) -> Self {
        Self { inner: half, framing }
    }
}

#[async_trait]
impl AsyncWriter for TcpWriteWrapper {
    async fn write_message(&mut self, data: &[u8]) -> Result<()> {
        match self.framing {
            Framing::LengthPrefixed => {
                if data.len() > MAX_FRAME_SIZE {
                    return Err(LinkError::Protocol(format!(
                        "Message too large: {} bytes",
                        data.len()
                    )));
                }
                let len = (data.len() as u32).to_le_bytes();
                self.inner
                    .write_all(&len)
                    .await
                    .map_err(|e| LinkError::Transport(format!("TCP write length failed: {}", e)))?;
                self.inner
                    .write_all(data)
                    .await
                    .map_err(|e| LinkError::Transport(format!("TCP write data failed: {}", e)))?;
            }
            Framing::Newline => {
                if data.contains(&b'\n') {
                    return Err(LinkError::Protocol(
                        "Newline framing cannot carry embedded newlines".into(),
                    ));
                }
                self.inner
                    .write_all(data)
                    .await
                    .map_err(|e| LinkError::Transport(format!("TCP write data failed: {}", e)))?;
                self.inner
                    .write_all(b"\n")
                    .await
                    .map_err(|e| LinkError::Transport(format!("TCP write newline failed: {}", e)))?;
            }
            Framing::Unframed => {
                self.inner
                    .write_all(data)
                    .await
                    .map_err(|e| LinkError::Transport(format!("TCP write data failed: {}", e)))?;
            }
        }

        // Flush to ensure data is sent
        self.inner
            .flush()
            .await
            .map_err(|e| LinkError::Transport(format!("TCP flush failed: {}", e)))?;

        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| LinkError::Transport(format!("TCP shutdown failed: {}", e)))
    }
}
