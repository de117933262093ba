//! Live link endpoint embedded in the animation tool
//!
//! This crate provides:
//! - A TCP server answering editor commands (ping, selection, transforms)
//! - Broadcast of notifications to every connected editor
//! - Geometry-cache export followed by an `import_alembic` notification
//!
//! Scene access goes through the [`SceneHost`] trait and always runs on the
//! host's main thread via [`dcc_bridge::MainThread`].

pub mod export;
pub mod handlers;
pub mod host;
pub mod server;

#[cfg(test)]
mod testing;

pub use export::{AbcExportJob, AlembicExporter, CancelFlag, ExportConfig, ExportOutcome};
pub use host::SceneHost;
pub use server::{BridgeServer, ConnectionId};
