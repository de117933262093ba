//! Error types for the live link

use thiserror::Error;

/// Result type for live link operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Live link error types
#[derive(Debug, Error)]
pub enum LinkError {
    /// Socket bind/connect/accept/read/write failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Envelope or frame did not follow the protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Host application API call failed
    #[error("Host error: {0}")]
    Host(String),

    /// Asset import failed
    #[error("Import error: {0}")]
    Import(String),

    /// No live connection
    #[error("Not connected")]
    NotConnected,

    /// Client already holds a connection
    #[error("Already connected")]
    AlreadyConnected,

    /// Server already listening
    #[error("Server is already running")]
    AlreadyRunning,

    /// The privileged thread dropped the call or stopped pumping
    #[error("Main thread call did not complete")]
    MainThreadUnavailable,

    /// Cooperative cancellation was requested
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Transport(err.to_string())
    }
}
