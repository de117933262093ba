//! Editor host interface
//!
//! The game editor's content-browser and asset-tools API, reduced to what
//! the import pipeline needs. Called only from [`BridgeClient::tick`], which
//! the editor runs on its main thread.
//!
//! [`BridgeClient::tick`]: crate::BridgeClient::tick

use dcc_link_core::{MaterialImportMethod, Result};
use std::path::{Path, PathBuf};

/// Existing asset found in the content database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetData {
    /// e.g. `/Game/Characters/export_20240101_120000`
    pub package_name: String,
    /// Folder containing the package, e.g. `/Game/Characters`
    pub package_path: String,
}

/// What an Alembic file is imported as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlembicImportType {
    StaticMesh,
    GeometryCache,
    Skeletal,
}

/// Source-to-editor axis conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbcConversionSettings {
    pub flip_u: bool,
    pub flip_v: bool,
    pub scale: [f64; 3],
    pub rotation: [f64; 3],
}

impl Default for AbcConversionSettings {
    /// Y-up right-handed source into the editor's Z-up left-handed space
    fn default() -> Self {
        Self {
            flip_u: false,
            flip_v: true,
            scale: [1.0, -1.0, 1.0],
            rotation: [90.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbcMaterialSettings {
    pub find_materials: bool,
    pub create_materials: bool,
}

impl From<MaterialImportMethod> for AbcMaterialSettings {
    fn from(method: MaterialImportMethod) -> Self {
        Self {
            find_materials: method == MaterialImportMethod::Find,
            create_materials: method == MaterialImportMethod::Create,
        }
    }
}

/// Alembic import options
#[derive(Debug, Clone, PartialEq)]
pub struct AbcImportSettings {
    /// `None` keeps whatever type the existing asset has
    pub import_type: Option<AlembicImportType>,
    /// Import Alembic velocities as motion vectors
    pub velocities_as_motion_vectors: bool,
    pub conversion: AbcConversionSettings,
    pub materials: AbcMaterialSettings,
}

/// One automated import request
#[derive(Debug, Clone, PartialEq)]
pub struct AssetImportTask {
    pub filename: PathBuf,
    pub destination_path: String,
    pub replace_existing: bool,
    pub automated: bool,
    pub save: bool,
    pub options: AbcImportSettings,
}

/// Editor-side collaborator for the live link client
pub trait EditorHost {
    /// Folders selected in the content browser's path view
    fn selected_path_view_folders(&mut self) -> Vec<String>;

    /// Folders selected in the content browser's asset view
    fn selected_folder_paths(&mut self) -> Vec<String>;

    /// Look up an asset by object path (`/Game/Folder/Name`)
    fn find_asset(&mut self, asset_path: &str) -> Option<AssetData>;

    /// Run import tasks synchronously
    fn import_asset_tasks(&mut self, tasks: Vec<AssetImportTask>) -> Result<()>;

    fn file_exists(&mut self, path: &Path) -> bool {
        path.exists()
    }
}
