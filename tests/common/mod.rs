//! Shared test helpers: a scripted detection backend and coordinator setup.

#![allow(dead_code)]

use pure_glance_lib::config::CoordinatorConfig;
use pure_glance_lib::detector::{BackendKind, DetectionBackend};
use pure_glance_lib::protocol::{
    BoundingBox, Detection, DetectionResult, Inbound, JobId, Outbound, TabId,
};
use pure_glance_lib::queue::DetectionJob;
use pure_glance_lib::settings::{Settings, SettingsStore};
use pure_glance_lib::{Coordinator, CoordinatorHandle, Error, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// What the backend saw, shared with the test body.
#[derive(Default)]
pub struct BackendLog {
    pub starts: u32,
    pub releases: u32,
    pub submitted: Vec<JobId>,
    /// Every event handle the coordinator issued, oldest first.
    pub handles: Vec<CoordinatorHandle>,
    /// Number of upcoming starts that should fail.
    pub failing_starts: u32,
    /// Number of upcoming submits the backend should reject.
    pub failing_submits: u32,
}

/// Backend that reports ready immediately and never answers on its own;
/// tests deliver results by hand.
pub struct ScriptedBackend {
    log: Arc<Mutex<BackendLog>>,
}

impl ScriptedBackend {
    pub fn new() -> (Self, Arc<Mutex<BackendLog>>) {
        let log = Arc::new(Mutex::new(BackendLog::default()));
        (Self { log: Arc::clone(&log) }, log)
    }
}

impl DetectionBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InProcess
    }

    async fn start(&mut self, events: CoordinatorHandle) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.starts += 1;
        if log.failing_starts > 0 {
            log.failing_starts -= 1;
            return Err(Error::BackendUnavailable("model failed to load".to_string()));
        }
        events.send(Inbound::BackendReady)?;
        log.handles.push(events);
        Ok(())
    }

    async fn submit(&mut self, job: &DetectionJob) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.failing_submits > 0 {
            log.failing_submits -= 1;
            return Err(Error::BackendUnavailable("surface pipe closed".to_string()));
        }
        log.submitted.push(job.id.clone());
        Ok(())
    }

    async fn release(&mut self) {
        self.log.lock().unwrap().releases += 1;
    }
}

pub struct Harness {
    pub coordinator: Coordinator<ScriptedBackend>,
    pub handle: CoordinatorHandle,
    pub backend: Arc<Mutex<BackendLog>>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub settings_path: PathBuf,
}

impl Harness {
    /// Fresh coordinator with default settings stored under a per-test path.
    pub fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join("pure-glance-flow-test").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        let settings_path = dir.join("settings.json");

        let config = CoordinatorConfig {
            settings_path: settings_path.clone(),
            ..CoordinatorConfig::default()
        };
        let (backend, log) = ScriptedBackend::new();
        let (tx, outbound) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(config, SettingsStore::at(&settings_path), backend, tx);
        let handle = coordinator.handle();

        Self {
            coordinator,
            handle,
            backend: log,
            outbound,
            settings_path,
        }
    }

    pub async fn save_settings(&self, settings: &Settings) {
        SettingsStore::at(&self.settings_path)
            .save(settings)
            .await
            .unwrap();
    }

    pub async fn send(&mut self, msg: Inbound) {
        self.handle.send(msg).unwrap();
        self.coordinator.process_pending().await;
    }

    pub async fn queue(&mut self, id: &str, tab_id: TabId) {
        self.send(queue_detection(id, tab_id)).await;
    }

    pub async fn deliver(&mut self, result: DetectionResult) {
        self.send(Inbound::DetectionResult(result)).await;
    }

    pub fn submitted(&self) -> Vec<String> {
        self.backend
            .lock()
            .unwrap()
            .submitted
            .iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    pub fn queued(&self) -> Vec<String> {
        self.coordinator
            .queued_ids()
            .iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = self.outbound.try_recv() {
            out.push(msg);
        }
        out
    }
}

pub fn queue_detection(id: &str, tab_id: TabId) -> Inbound {
    Inbound::QueueDetection {
        id: JobId::new(id),
        data_url: Some("data:image/jpeg;base64,AAAA".to_string()),
        url: None,
        orig_width: Some(1280),
        orig_height: Some(720),
        sender_tab_id: Some(tab_id),
    }
}

/// Result with `faces` small faces on a 320x180 thumbnail of a 1280x720 image.
pub fn result_with_faces(id: &str, faces: usize) -> DetectionResult {
    DetectionResult {
        id: JobId::new(id),
        detections: (0..faces)
            .map(|i| Detection::from(BoundingBox::new(10.0 * i as f64, 10.0, 5.0, 5.0)))
            .collect(),
        image_width: 320,
        image_height: 180,
        orig_width: Some(1280),
        orig_height: Some(720),
    }
}
