//! Test doubles: an in-memory scene and a thread that pumps it

use crate::export::{AbcExportJob, CancelFlag};
use crate::host::SceneHost;
use dcc_bridge::MainThreadPump;
use dcc_link_core::{LinkError, MaterialImportMethod, Result, Transform};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeScene {
    /// short name -> (long name, transform)
    pub objects: HashMap<String, (String, Transform)>,
    pub selected: Vec<String>,
    pub range: (f64, f64),
    pub method: Option<MaterialImportMethod>,
    pub fail_selection: bool,
    pub fail_export: bool,
    pub panic_on_transform: bool,
    /// Flipped right after the cache is written
    pub cancel_during_export: Option<CancelFlag>,
    pub exports: Vec<AbcExportJob>,
    pub progress: Vec<u8>,
    pub warnings: Vec<String>,
    pub finished: Vec<bool>,
}

impl Default for FakeScene {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
            selected: Vec::new(),
            range: (1.0, 120.0),
            method: Some(MaterialImportMethod::Find),
            fail_selection: false,
            fail_export: false,
            panic_on_transform: false,
            cancel_during_export: None,
            exports: Vec::new(),
            progress: Vec::new(),
            warnings: Vec::new(),
            finished: Vec::new(),
        }
    }
}

impl FakeScene {
    pub fn with_object(mut self, short: &str, long: &str, transform: Transform) -> Self {
        self.objects
            .insert(short.to_string(), (long.to_string(), transform));
        self
    }

    pub fn with_selection(mut self, names: &[&str]) -> Self {
        self.selected = names.iter().map(|n| n.to_string()).collect();
        self
    }

    fn resolve(&self, name: &str) -> Option<&(String, Transform)> {
        self.objects
            .get(name)
            .or_else(|| self.objects.values().find(|(long, _)| long == name))
    }
}

impl SceneHost for FakeScene {
    fn selection(&mut self) -> Result<Vec<String>> {
        if self.fail_selection {
            return Err(LinkError::Host("selection unavailable".into()));
        }
        Ok(self.selected.clone())
    }

    fn long_name(&mut self, name: &str) -> Result<Option<String>> {
        Ok(self.objects.get(name).map(|(long, _)| long.clone()))
    }

    fn object_exists(&mut self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    fn world_transform(&mut self, name: &str) -> Result<Transform> {
        if self.panic_on_transform {
            panic!("transform query exploded");
        }
        self.resolve(name)
            .map(|(_, transform)| *transform)
            .ok_or_else(|| LinkError::Host(format!("No object matches name: {}", name)))
    }

    fn playback_range(&mut self) -> Result<(f64, f64)> {
        Ok(self.range)
    }

    fn export_geometry_cache(&mut self, job: &AbcExportJob) -> Result<()> {
        if self.fail_export {
            return Err(LinkError::Host("AbcExport failed".into()));
        }
        std::fs::write(&job.file, b"ogawa")?;
        self.exports.push(job.clone());
        if let Some(flag) = &self.cancel_during_export {
            flag.cancel();
        }
        Ok(())
    }

    fn prompt_material_import_method(&mut self) -> Option<MaterialImportMethod> {
        self.method
    }

    fn report_progress(&mut self, percent: u8) {
        self.progress.push(percent);
    }

    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn export_finished(&mut self, success: bool) {
        self.finished.push(success);
    }
}

/// Stands in for the host's main thread: pumps jobs until joined
pub struct HostThread<H: Send + 'static> {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<H>>,
}

impl<H: Send + 'static> HostThread<H> {
    pub fn spawn(mut host: H, mut pump: MainThreadPump<H>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                pump.run_pending(&mut host);
                std::thread::sleep(Duration::from_millis(1));
            }
            pump.run_pending(&mut host);
            host
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop pumping and hand the host back for inspection
    pub fn join(mut self) -> H {
        self.stop.store(true, Ordering::SeqCst);
        self.handle
            .take()
            .expect("host thread already joined")
            .join()
            .expect("host thread panicked")
    }
}

impl<H: Send + 'static> Drop for HostThread<H> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
