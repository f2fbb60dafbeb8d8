//! In-process backend: the `FaceDetect` lives in this process and is
//! reused across restarts. Used when no surface process is available.

use super::image_source::{self, ImageSource};
use super::{BackendKind, DetectionBackend, FaceDetect};
use crate::coordinator::CoordinatorHandle;
use crate::error::{Error, Result};
use crate::protocol::Inbound;
use crate::queue::DetectionJob;
use image::DynamicImage;
use std::sync::Arc;

pub struct InProcessDetector {
    detector: Arc<dyn FaceDetect>,
    source: ImageSource,
    events: Option<CoordinatorHandle>,
    warmed_up: bool,
}

impl InProcessDetector {
    pub fn new(detector: Arc<dyn FaceDetect>) -> Self {
        Self {
            detector,
            source: ImageSource::new(),
            events: None,
            warmed_up: false,
        }
    }

    /// Run one throwaway detection so the first real thumbnail doesn't pay
    /// the model's cold-start cost.
    async fn warm_up(&mut self) -> Result<()> {
        let detector = Arc::clone(&self.detector);
        let started = std::time::Instant::now();
        tokio::task::spawn_blocking(move || detector.detect(&DynamicImage::new_rgb8(16, 16)))
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Warm-up task failed: {}", e)))?
            .map_err(|e| Error::BackendUnavailable(format!("Detector warm-up failed: {}", e)))?;
        log::info!(
            "[DETECTOR] In-process detector warm-up complete in {}ms",
            started.elapsed().as_millis()
        );
        self.warmed_up = true;
        Ok(())
    }
}

impl DetectionBackend for InProcessDetector {
    fn kind(&self) -> BackendKind {
        BackendKind::InProcess
    }

    async fn start(&mut self, events: CoordinatorHandle) -> Result<()> {
        if !self.warmed_up {
            self.warm_up().await?;
        }
        events.send(Inbound::BackendReady)?;
        self.events = Some(events);
        Ok(())
    }

    async fn submit(&mut self, job: &DetectionJob) -> Result<()> {
        let events = self
            .events
            .clone()
            .ok_or_else(|| Error::BackendUnavailable("In-process detector not started".to_string()))?;

        let detector = Arc::clone(&self.detector);
        let source = self.source.clone();
        let request = job.to_request();
        tokio::spawn(async move {
            let result = image_source::run_detection(detector, &source, &request).await;
            if events.send(Inbound::DetectionResult(result)).is_err() {
                log::debug!("[DETECTOR] Coordinator gone, dropping result for {}", request.id);
            }
        });
        Ok(())
    }

    async fn release(&mut self) {
        // The detector itself is kept for reuse; only the event link goes.
        self.events = None;
        log::info!("[DETECTOR] In-process detector released");
    }
}
