//! # dcc-link-core
//!
//! Core types for the DCC live link protocol.
//!
//! This crate provides the foundational types shared by both endpoints:
//! - Command and response envelopes
//! - Command catalog and payload schemas
//! - Endpoint configuration and framing selection
//! - Error types

pub mod commands;
pub mod config;
pub mod envelope;
pub mod error;

pub use commands::{GetTransformParams, ImportAlembic, MaterialImportMethod, Transform};
pub use config::{Framing, LinkConfig};
pub use envelope::{CommandEnvelope, CommandId, Inbound, ResponseEnvelope, Status};
pub use error::{LinkError, Result};
