//! Scene host interface
//!
//! The animation tool's scene API, reduced to the calls the live link
//! makes. Every method is invoked on the host's main thread through
//! [`dcc_bridge::MainThread`], never from a socket worker.

use crate::export::AbcExportJob;
use dcc_link_core::{MaterialImportMethod, Result, Transform};
use tracing::warn;

/// Scene-side collaborator for the live link server
pub trait SceneHost: 'static {
    /// Currently selected objects, short names
    fn selection(&mut self) -> Result<Vec<String>>;

    /// Fully qualified name of an object, if the host can resolve it
    fn long_name(&mut self, name: &str) -> Result<Option<String>>;

    fn object_exists(&mut self, name: &str) -> bool;

    /// World-space translation, rotation and scale
    fn world_transform(&mut self, name: &str) -> Result<Transform>;

    /// First and last frame of the playback range
    fn playback_range(&mut self) -> Result<(f64, f64)>;

    /// Write a geometry cache to `job.file`
    fn export_geometry_cache(&mut self, job: &AbcExportJob) -> Result<()>;

    /// Ask the user how the editor should treat materials.
    /// `None` cancels the export.
    fn prompt_material_import_method(&mut self) -> Option<MaterialImportMethod> {
        Some(MaterialImportMethod::Find)
    }

    /// Export progress, 0..=100
    fn report_progress(&mut self, _percent: u8) {}

    /// Surface a warning to the user
    fn warn(&mut self, message: &str) {
        warn!("{}", message);
    }

    /// Export ended, successfully or not. Hosts re-enable their UI here.
    fn export_finished(&mut self, _success: bool) {}
}
