//! Live link endpoint embedded in the game editor
//!
//! This crate provides:
//! - A TCP client that sends commands and correlates responses by id
//! - A main-thread tick that processes queued messages
//! - The geometry-cache import pipeline driven by `import_alembic`

pub mod client;
pub mod editor;
pub mod import;

pub use client::{BridgeClient, ResponseCallback};
pub use editor::{
    AbcConversionSettings, AbcImportSettings, AbcMaterialSettings, AlembicImportType, AssetData,
    AssetImportTask, EditorHost,
};
pub use import::{ImportOutcome, import_alembic, normalize_content_path};
