//! Face detection backends.
//!
//! The coordinator never talks to a model directly. It owns exactly one
//! `DetectionBackend`, chosen once at startup:
//!
//! - **offscreen**: a separate surface process hosting the model, reached
//!   over NDJSON on its stdio (at most one live per process)
//! - **in-process**: a `FaceDetect` built once and reused
//!
//! Both report readiness and results asynchronously by posting
//! `Inbound::BackendReady` / `Inbound::DetectionResult` to the coordinator.

pub mod image_source;
pub mod in_process;
pub mod manager;
pub mod offscreen;
pub mod surface;

pub use in_process::InProcessDetector;
pub use manager::{BackendState, DetectorManager};
pub use offscreen::OffscreenSurface;

use crate::config::CoordinatorConfig;
use crate::coordinator::CoordinatorHandle;
use crate::error::Result;
use crate::protocol::BoundingBox;
use crate::queue::DetectionJob;
use image::DynamicImage;
use std::future::Future;
use std::sync::Arc;

/// The external face-detection model: image in, bounding boxes out.
pub trait FaceDetect: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> std::result::Result<Vec<BoundingBox>, String>;
}

impl<F> FaceDetect for F
where
    F: Fn(&DynamicImage) -> std::result::Result<Vec<BoundingBox>, String> + Send + Sync,
{
    fn detect(&self, image: &DynamicImage) -> std::result::Result<Vec<BoundingBox>, String> {
        self(image)
    }
}

/// Detector that never finds a face. Used when no model is wired in, so
/// everything stays visible.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaceDetector;

impl FaceDetect for NoFaceDetector {
    fn detect(&self, _image: &DynamicImage) -> std::result::Result<Vec<BoundingBox>, String> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Offscreen,
    InProcess,
}

/// Capability the resource manager drives.
///
/// `start` only begins initialization; readiness is signalled later through
/// the coordinator handle. `submit` succeeding means the backend accepted
/// the job, not that detection finished.
pub trait DetectionBackend: Send {
    fn kind(&self) -> BackendKind;

    fn start(&mut self, events: CoordinatorHandle) -> impl Future<Output = Result<()>> + Send;

    fn submit(&mut self, job: &DetectionJob) -> impl Future<Output = Result<()>> + Send;

    fn release(&mut self) -> impl Future<Output = ()> + Send;
}

/// The backend variant chosen at startup.
pub enum Backend {
    Offscreen(OffscreenSurface),
    InProcess(InProcessDetector),
}

impl DetectionBackend for Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Backend::Offscreen(b) => b.kind(),
            Backend::InProcess(b) => b.kind(),
        }
    }

    async fn start(&mut self, events: CoordinatorHandle) -> Result<()> {
        match self {
            Backend::Offscreen(b) => b.start(events).await,
            Backend::InProcess(b) => b.start(events).await,
        }
    }

    async fn submit(&mut self, job: &DetectionJob) -> Result<()> {
        match self {
            Backend::Offscreen(b) => b.submit(job).await,
            Backend::InProcess(b) => b.submit(job).await,
        }
    }

    async fn release(&mut self) {
        match self {
            Backend::Offscreen(b) => b.release().await,
            Backend::InProcess(b) => b.release().await,
        }
    }
}

/// Pick the backend once, based on whether a surface process can be
/// launched on this host.
pub fn select_backend(config: &CoordinatorConfig, fallback: Arc<dyn FaceDetect>) -> Backend {
    if let Some(command) = &config.surface_command {
        match which::which(command) {
            Ok(path) => {
                log::info!("[DETECTOR] Using offscreen surface: {}", path.display());
                return Backend::Offscreen(OffscreenSurface::new(
                    path.to_string_lossy().to_string(),
                    config.surface_args.clone(),
                ));
            }
            Err(e) => {
                log::warn!(
                    "[DETECTOR] Surface command '{}' not found ({}), falling back to in-process detector",
                    command,
                    e
                );
            }
        }
    } else {
        log::info!("[DETECTOR] No surface configured, using in-process detector");
    }

    Backend::InProcess(InProcessDetector::new(fallback))
}
