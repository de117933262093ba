//! Endpoint configuration shared by server and client

use crate::error::LinkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12112;
/// Byte cap for a single read in unframed mode
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;
/// Upper bound on a length-prefixed or newline frame
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// How JSON documents are delimited on the byte stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// 4-byte little-endian length followed by the JSON body
    #[default]
    LengthPrefixed,
    /// One JSON document per `\n`-terminated line
    Newline,
    /// One read is one document. Only safe for small messages on loopback.
    Unframed,
}

impl Framing {
    pub fn as_str(self) -> &'static str {
        match self {
            Framing::LengthPrefixed => "length_prefixed",
            Framing::Newline => "newline",
            Framing::Unframed => "unframed",
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framing {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "length_prefixed" | "length" => Ok(Framing::LengthPrefixed),
            "newline" | "ndjson" | "lines" => Ok(Framing::Newline),
            "unframed" | "raw" | "legacy" => Ok(Framing::Unframed),
            other => Err(LinkError::Protocol(format!("Unknown framing: {}", other))),
        }
    }
}

/// Address and wire settings for one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Host to bind or connect to (default: 127.0.0.1)
    pub host: String,
    /// TCP port (default: 12112)
    pub port: u16,
    /// Frame delimiting (default: length-prefixed)
    pub framing: Framing,
    /// Read size used in unframed mode
    pub read_buffer_size: usize,
    /// How often the acceptor re-checks the running flag
    pub poll_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            framing: Framing::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl LinkConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// `host:port` for bind/connect
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
