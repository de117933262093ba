//! Geometry-cache export and editor notification
//!
//! Exports the selection over the playback range to an Alembic file, then
//! broadcasts `import_alembic` so every connected editor pulls it in.

use crate::host::SceneHost;
use crate::server::BridgeServer;
use chrono::{DateTime, Local, TimeZone};
use dcc_bridge::MainThread;
use dcc_link_core::{ImportAlembic, LinkError, MaterialImportMethod, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const NO_SELECTION: &str = "No objects selected for Alembic export";

/// Where export files are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    pub export_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_dir: std::env::temp_dir().join("dcc-link-exports"),
        }
    }
}

/// One geometry-cache export request handed to the host
#[derive(Debug, Clone, PartialEq)]
pub struct AbcExportJob {
    pub start_frame: f64,
    pub end_frame: f64,
    /// Objects to export, one `-root` each
    pub roots: Vec<String>,
    pub file: PathBuf,
}

impl AbcExportJob {
    /// Job string in the form the AbcExport command takes
    pub fn to_job_string(&self) -> String {
        let mut job = format!(
            "-frameRange {} {} -attr motionVectorColorSet -stripNamespaces -uvWrite \
             -writeColorSets -writeFaceSets -worldSpace -writeUVSets -dataFormat ogawa",
            self.start_frame, self.end_frame
        );
        for root in &self.roots {
            job.push_str(" -root ");
            job.push_str(root);
        }
        job.push_str(" -file ");
        job.push_str(&self.file.to_string_lossy());
        job
    }
}

/// `export_YYYYMMDD_HHMMSS.abc`
pub fn export_file_name<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("export_{}.abc", at.format("%Y%m%d_%H%M%S"))
}

/// Cancel button state shared with the host UI
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A finished export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub file_path: PathBuf,
    pub objects: Vec<String>,
    pub material_import_method: MaterialImportMethod,
    /// Editors that received the import notification
    pub delivered: usize,
}

/// Runs exports against a scene host and notifies editors through a server
pub struct AlembicExporter<H> {
    server: BridgeServer<H>,
    main_thread: MainThread<H>,
    config: ExportConfig,
    cancel: CancelFlag,
}

impl<H> Clone for AlembicExporter<H> {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            main_thread: self.main_thread.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<H: SceneHost> AlembicExporter<H> {
    pub fn new(server: BridgeServer<H>, config: ExportConfig) -> Self {
        let main_thread = server.main_thread().clone();
        Self {
            server,
            main_thread,
            config,
            cancel: CancelFlag::default(),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Flag the host UI flips to abort a running export
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Export in the background so the host UI stays responsive
    pub fn spawn_export_selection(&self) -> JoinHandle<Result<ExportOutcome>> {
        let this = self.clone();
        tokio::spawn(async move { this.export_selection().await })
    }

    /// Export whatever is currently selected in the scene
    pub async fn export_selection(&self) -> Result<ExportOutcome> {
        let selected = self
            .main_thread
            .call(|host: &mut H| host.selection())
            .await??;
        self.export(selected).await
    }

    /// Export `selected` and broadcast the import request
    pub async fn export(&self, selected: Vec<String>) -> Result<ExportOutcome> {
        if selected.is_empty() {
            self.main_thread.post(|host| host.warn(NO_SELECTION))?;
            return Err(LinkError::Host(NO_SELECTION.into()));
        }

        self.cancel.reset();
        let result = self.run(selected).await;

        let success = result.is_ok();
        match &result {
            Ok(outcome) => info!("Alembic exported successfully to: {}", outcome.file_path.display()),
            Err(LinkError::Cancelled) => {
                info!("Alembic export cancelled");
                let _ = self.main_thread.post(|host| host.warn("Alembic export cancelled"));
            }
            Err(e) => {
                error!("Error exporting Alembic: {}", e);
                let message = format!("Error exporting Alembic: {}", e);
                let _ = self.main_thread.post(move |host| host.warn(&message));
            }
        }
        let _ = self.main_thread.post(move |host| host.export_finished(success));

        result
    }

    async fn run(&self, selected: Vec<String>) -> Result<ExportOutcome> {
        self.progress(0)?;
        self.progress(10)?;

        let method = self
            .main_thread
            .call(|host: &mut H| host.prompt_material_import_method())
            .await?;
        let Some(material_import_method) = method else {
            return Err(LinkError::Cancelled);
        };
        self.check_cancelled()?;

        let (start_frame, end_frame) = self
            .main_thread
            .call(|host: &mut H| host.playback_range())
            .await??;
        self.progress(30)?;
        self.check_cancelled()?;

        let file_path = next_export_path(&self.config.export_dir).await?;
        let job = AbcExportJob {
            start_frame,
            end_frame,
            roots: selected.clone(),
            file: file_path.clone(),
        };
        self.progress(50)?;

        info!("Exporting geometry cache: {}", job.to_job_string());
        self.main_thread
            .call(move |host: &mut H| host.export_geometry_cache(&job))
            .await??;
        self.progress(80)?;
        self.check_cancelled()?;

        let notification = ImportAlembic {
            file_path: file_path.to_string_lossy().into_owned(),
            objects: selected.clone(),
            material_import_method,
        };
        let delivered = self.server.broadcast(&notification.to_envelope()?).await?;
        if delivered == 0 {
            warn!("No editor connected; import request was not delivered");
        }
        self.progress(100)?;

        Ok(ExportOutcome {
            file_path,
            objects: selected,
            material_import_method,
            delivered,
        })
    }

    fn progress(&self, percent: u8) -> Result<()> {
        self.main_thread.post(move |host| host.report_progress(percent))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LinkError::Cancelled);
        }
        Ok(())
    }
}

/// Absolute path for a new export file, creating the directory if needed
async fn next_export_path(export_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(export_dir).await?;
    let dir = std::path::absolute(export_dir)?;
    Ok(dir.join(export_file_name(&Local::now())))
}
