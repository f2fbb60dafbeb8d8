//! Detection job coordinator.
//!
//! One owned `Coordinator` per process. It processes one event at a time
//! from an unbounded channel, so queue/state mutations never interleave.
//! Everything else (host pumps, backend reader tasks, timers) only posts
//! events through a cloneable `CoordinatorHandle`.
//!
//! Flow for a thumbnail:
//! QUEUE_DETECTION → enqueue → drain → backend start (if needed) →
//! ready → dispatch → detection-result → classify → HIDE_VIDEO + count.

use crate::classify::{self, Classification};
use crate::config::CoordinatorConfig;
use crate::detector::{BackendState, DetectionBackend, DetectorManager};
use crate::error::{Error, Result};
use crate::protocol::{DetectionResult, Inbound, JobId, Outbound, TabId};
use crate::queue::{DetectionJob, ImagePayload, JobQueue};
use crate::session::TabSessions;
use crate::settings::{Settings, SettingsStore};
use crate::sites;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Units of work for the coordinator task.
#[derive(Debug)]
pub(crate) enum Event {
    Message(Inbound),
    BackendExited { epoch: Option<u64>, reason: String },
    IdleExpired { generation: u64 },
    RetryDue { generation: u64 },
    CountQuery { tab_id: TabId, reply: oneshot::Sender<u32> },
    Shutdown,
}

/// Cloneable sender side of the coordinator's event channel.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Event>,
    /// Backend start this handle was issued for, if any.
    epoch: Option<u64>,
}

impl CoordinatorHandle {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, epoch: None }, rx)
    }

    pub(crate) fn with_epoch(&self, epoch: u64) -> Self {
        Self {
            tx: self.tx.clone(),
            epoch: Some(epoch),
        }
    }

    fn post(&self, event: Event) -> Result<()> {
        self.tx.send(event).map_err(|_| Error::CoordinatorClosed)
    }

    pub fn send(&self, msg: Inbound) -> Result<()> {
        self.post(Event::Message(msg))
    }

    /// Report that the backend instance behind this handle went away.
    pub fn backend_exited(&self, reason: impl Into<String>) -> Result<()> {
        self.post(Event::BackendExited {
            epoch: self.epoch,
            reason: reason.into(),
        })
    }

    /// Current hidden-video count for a tab.
    pub async fn hidden_video_count(&self, tab_id: TabId) -> Result<u32> {
        let (reply, rx) = oneshot::channel();
        self.post(Event::CountQuery { tab_id, reply })?;
        rx.await.map_err(|_| Error::CoordinatorClosed)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.post(Event::Shutdown)
    }
}

/// Cancellable one-shot timer that posts an event carrying its generation.
#[derive(Default)]
struct Timer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Timer {
    fn arm(&mut self, after: Duration, handle: &CoordinatorHandle, make: fn(u64) -> Event) {
        self.cancel();
        let generation = self.generation;
        let handle = handle.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = handle.post(make(generation));
        }));
    }

    fn cancel(&mut self) {
        self.generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Accept a firing only if it belongs to the current arming.
    fn fired(&mut self, generation: u64) -> bool {
        if self.task.is_some() && generation == self.generation {
            self.task = None;
            true
        } else {
            false
        }
    }
}

pub struct Coordinator<B> {
    config: CoordinatorConfig,
    settings: SettingsStore,
    detector: DetectorManager<B>,
    queue: JobQueue,
    /// Dispatched jobs awaiting a result: job id → origin tab.
    ownership: HashMap<JobId, TabId>,
    /// The single job currently with the backend.
    in_flight: Option<DetectionJob>,
    sessions: TabSessions,
    outbound: mpsc::UnboundedSender<Outbound>,
    handle: CoordinatorHandle,
    events: mpsc::UnboundedReceiver<Event>,
    idle_timer: Timer,
    retry_timer: Timer,
    retry_backoff: Duration,
}

impl<B: DetectionBackend> Coordinator<B> {
    pub fn new(
        config: CoordinatorConfig,
        settings: SettingsStore,
        backend: B,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let (handle, events) = CoordinatorHandle::channel();
        let retry_backoff = config.retry_backoff_initial;
        Self {
            config,
            settings,
            detector: DetectorManager::new(backend),
            queue: JobQueue::new(),
            ownership: HashMap::new(),
            in_flight: None,
            sessions: TabSessions::new(outbound.clone()),
            outbound,
            handle,
            events,
            idle_timer: Timer::default(),
            retry_timer: Timer::default(),
            retry_backoff,
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn backend_state(&self) -> BackendState {
        self.detector.state()
    }

    pub fn backend(&self) -> &B {
        self.detector.backend()
    }

    pub fn queued_ids(&self) -> Vec<JobId> {
        self.queue.ids()
    }

    pub fn in_flight(&self) -> Option<&JobId> {
        self.in_flight.as_ref().map(|j| &j.id)
    }

    pub fn owner_of(&self, id: &JobId) -> Option<TabId> {
        self.ownership.get(id).copied()
    }

    pub fn hidden_count(&self, tab_id: TabId) -> u32 {
        self.sessions.get(tab_id)
    }

    pub fn idle_timer_armed(&self) -> bool {
        self.idle_timer.is_armed()
    }

    // ── Event loop ──────────────────────────────────────────────────

    /// Process events until shutdown, then release the backend.
    pub async fn run(mut self) {
        log::info!("[QUEUE] Coordinator running ({:?} backend)", self.detector.kind());
        while self.step().await {}
        self.stop().await;
    }

    /// Wait for and handle one event. Returns `false` once the coordinator
    /// should stop.
    pub async fn step(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => self.handle_event(event).await,
            None => false,
        }
    }

    /// Handle every event that is already queued, without waiting.
    /// Returns how many were handled.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            handled += 1;
            if !self.handle_event(event).await {
                break;
            }
        }
        handled
    }

    pub async fn stop(&mut self) {
        self.idle_timer.cancel();
        self.retry_timer.cancel();
        self.detector.release().await;
        log::info!("[QUEUE] Coordinator stopped");
    }

    async fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Message(msg) => self.handle_message(msg).await,
            Event::BackendExited { epoch, reason } => self.on_backend_exited(epoch, reason).await,
            Event::IdleExpired { generation } => {
                if self.idle_timer.fired(generation) {
                    self.on_idle_expired().await;
                }
            }
            Event::RetryDue { generation } => {
                if self.retry_timer.fired(generation) {
                    log::info!("[QUEUE] Retrying after backend failure");
                    self.drain().await;
                }
            }
            Event::CountQuery { tab_id, reply } => {
                let _ = reply.send(self.sessions.get(tab_id));
            }
            Event::Shutdown => return false,
        }
        true
    }

    async fn handle_message(&mut self, msg: Inbound) {
        match msg {
            Inbound::QueueDetection {
                id,
                data_url,
                url,
                orig_width,
                orig_height,
                sender_tab_id,
            } => {
                let Some(tab_id) = sender_tab_id else {
                    log::debug!("[QUEUE] Ignoring {} without a sender tab", id);
                    return;
                };
                let Some(image) = ImagePayload::from_parts(data_url, url) else {
                    log::warn!("[QUEUE] Ignoring {} from tab {}: no image data", id, tab_id);
                    return;
                };
                self.enqueue(DetectionJob {
                    id,
                    tab_id,
                    image,
                    original_width: orig_width,
                    original_height: orig_height,
                    logging: false,
                })
                .await;
            }
            Inbound::BackendReady => {
                if self.detector.mark_ready() {
                    self.retry_backoff = self.config.retry_backoff_initial;
                    self.drain().await;
                }
            }
            Inbound::DetectionResult(result) => self.on_detection_result(result).await,
            Inbound::GetHiddenVideoCount { tab_id, request_id } => {
                let count = tab_id.map_or(0, |t| self.sessions.get(t));
                self.emit(Outbound::HiddenVideoCountResponse {
                    request_id,
                    tab_id,
                    count,
                });
            }
            Inbound::ResetCount { sender_tab_id } => {
                if let Some(tab_id) = sender_tab_id {
                    self.sessions.reset(tab_id);
                }
            }
            Inbound::HistoryStateUpdated {
                tab_id,
                frame_id,
                url,
            } => {
                if frame_id == 0 && sites::is_recognized(&url) {
                    log::debug!("[SESSION] Tab {} navigated to {}", tab_id, url);
                    self.sessions.reset(tab_id);
                    self.emit(Outbound::UrlChanged { tab_id });
                }
            }
            Inbound::TabRemoved { tab_id } => self.sessions.forget(tab_id),
            Inbound::GetSettings { request_id } => {
                let reply = match self.settings.load().await {
                    Ok(settings) => Outbound::Settings {
                        request_id,
                        settings,
                    },
                    Err(e) => Outbound::SettingsError {
                        request_id,
                        message: e.to_string(),
                    },
                };
                self.emit(reply);
            }
            Inbound::SetSettings { request_id, values } => {
                let reply = match self.settings.update(values).await {
                    Ok(settings) => Outbound::Settings {
                        request_id,
                        settings,
                    },
                    Err(e) => {
                        log::warn!("[SETTINGS] Update failed: {}", e);
                        Outbound::SettingsError {
                            request_id,
                            message: e.to_string(),
                        }
                    }
                };
                self.emit(reply);
            }
        }
    }

    /// Settings for this unit of work; storage trouble degrades to defaults.
    async fn current_settings(&self) -> Settings {
        match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("[SETTINGS] {}, using defaults", e);
                Settings::default()
            }
        }
    }

    async fn enqueue(&mut self, mut job: DetectionJob) {
        let settings = self.current_settings().await;
        if !settings.is_enabled {
            log::debug!("[QUEUE] Extension disabled, dropping {}", job.id);
            return;
        }
        job.logging = settings.is_logging_enabled;

        log::log!(
            crate::job_log_level(job.logging),
            "[QUEUE] Queued item {} for detection ({})",
            job.id,
            job.image.describe()
        );
        self.queue.enqueue(job);
        self.drain().await;
    }

    /// Dispatch the next job if the backend can take one.
    async fn drain(&mut self) {
        self.idle_timer.cancel();

        if self.in_flight.is_some() {
            return;
        }

        if self.queue.is_empty() {
            self.idle_timer
                .arm(self.config.idle_timeout, &self.handle, |generation| Event::IdleExpired {
                    generation,
                });
            return;
        }

        if !self.detector.is_ready() {
            if self.detector.state() == BackendState::Initializing {
                return;
            }
            if let Err(e) = self.detector.ensure_started(&self.handle).await {
                log::warn!("[QUEUE] {} ({} job(s) waiting)", e, self.queue.len());
                self.schedule_retry();
            }
            return;
        }

        let Some(job) = self.queue.dequeue_next() else {
            return;
        };
        self.ownership.insert(job.id.clone(), job.tab_id);

        match self.detector.submit(&job).await {
            Ok(()) => {
                log::log!(
                    crate::job_log_level(job.logging),
                    "[QUEUE] Dispatched {} ({} waiting)",
                    job.id,
                    self.queue.len()
                );
                self.in_flight = Some(job);
            }
            Err(e) => {
                log::error!("[QUEUE] Failed to send {} to backend, re-queueing: {}", job.id, e);
                self.ownership.remove(&job.id);
                self.queue.restore_front(job);
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        let delay = self.retry_backoff;
        self.retry_backoff = (self.retry_backoff * 2).min(self.config.retry_backoff_max);
        log::debug!("[QUEUE] Next backend attempt in {}ms", delay.as_millis());
        self.retry_timer
            .arm(delay, &self.handle, |generation| Event::RetryDue { generation });
    }

    async fn on_detection_result(&mut self, result: DetectionResult) {
        if self.in_flight.as_ref().map(|j| &j.id) == Some(&result.id) {
            self.in_flight = None;
        }

        match self.ownership.remove(&result.id) {
            Some(tab_id) => self.apply_result(tab_id, &result).await,
            None => log::debug!("[QUEUE] No owner for result {}, ignoring", result.id),
        }

        self.drain().await;
    }

    async fn apply_result(&mut self, tab_id: TabId, result: &DetectionResult) {
        let settings = self.current_settings().await;
        let level = crate::job_log_level(settings.is_logging_enabled);

        log::log!(
            level,
            "[CLASSIFY] Received detection result for {} on tab {}. Detections: {}",
            result.id,
            tab_id,
            result.detections.len()
        );

        if let Classification::Hide(reason) = classify::classify(result, &settings.policy()) {
            log::log!(level, "[CLASSIFY] Hiding video {} on tab {} {}.", result.id, tab_id, reason);
            self.sessions.increment(tab_id);
            self.emit(Outbound::HideVideo {
                tab_id,
                id: result.id.clone(),
            });
        }
    }

    async fn on_backend_exited(&mut self, epoch: Option<u64>, reason: String) {
        if epoch.is_some_and(|e| e != self.detector.epoch()) {
            log::debug!("[DETECTOR] Ignoring exit of a previous backend instance: {}", reason);
            return;
        }
        if self.detector.state() == BackendState::Uninitialized {
            return;
        }

        log::warn!("[DETECTOR] Backend exited: {}", reason);
        self.detector.fault().await;

        if let Some(job) = self.in_flight.take() {
            log::warn!("[QUEUE] Re-queueing {} abandoned by the backend", job.id);
            self.ownership.remove(&job.id);
            self.queue.restore_front(job);
        }

        if !self.queue.is_empty() {
            self.schedule_retry();
        }
    }

    async fn on_idle_expired(&mut self) {
        if !self.queue.is_empty() || self.in_flight.is_some() {
            return;
        }
        log::info!(
            "[QUEUE] Queue idle for {}s, releasing backend",
            self.config.idle_timeout.as_secs()
        );
        self.detector.release().await;
    }

    fn emit(&self, msg: Outbound) {
        if self.outbound.send(msg).is_err() {
            log::debug!("[HOST] Outbound channel closed, dropping message");
        }
    }
}
