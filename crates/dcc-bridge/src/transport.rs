//! Transport abstractions for live link endpoints
//!
//! Provides AsyncReader/AsyncWriter traits so the server and client loops do
//! not care how frames are delimited on the wire.

use async_trait::async_trait;
use dcc_link_core::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Trait for async reading from a transport
#[async_trait]
pub trait AsyncReader: Send {
    /// Read one complete message.
    ///
    /// Returns `Ok(None)` when the peer closed its write side.
    async fn read_message(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Trait for async writing to a transport
#[async_trait]
pub trait AsyncWriter: Send + Sync {
    /// Write one complete message
    async fn write_message(&mut self, data: &[u8]) -> Result<()>;

    /// Close the write side. Calling it twice is harmless.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Writer shared between a receiver loop and broadcasters
pub type SharedWriter = Arc<Mutex<Box<dyn AsyncWriter>>>;

/// Short printable prefix of a frame for debug logs
pub fn preview(data: &[u8]) -> String {
    String::from_utf8_lossy(data).chars().take(200).collect()
}
