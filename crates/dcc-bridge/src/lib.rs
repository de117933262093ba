//! Shared bridge infrastructure for DCC live link endpoints
//!
//! This crate provides:
//! - Transport abstractions (AsyncReader/AsyncWriter traits)
//! - Framed TCP transport (length-prefixed, newline, or legacy unframed)
//! - Main-thread marshalling for hosts that only allow API calls from one thread

pub mod main_thread;
pub mod sync;
pub mod tcp;
pub mod transport;

pub use main_thread::{MainThread, MainThreadPump, main_thread_channel};
pub use tcp::{TcpReadWrapper, TcpWriteWrapper, split};
pub use transport::{AsyncReader, AsyncWriter, SharedWriter, preview};
