//! Detector resource manager: owns the backend and its readiness state.
//!
//! ```text
//! Uninitialized ──start──▶ Initializing ──ready──▶ Ready
//!       ▲                     │    ▲                 │
//!    release            fail  ▼    │ start      submit fails
//!       │                  Unavailable ◀─────────────┘
//! ```
//!
//! Only one start may be in flight: demand while `Initializing` (or
//! `Ready`) is a no-op.

use super::{BackendKind, DetectionBackend};
use crate::coordinator::CoordinatorHandle;
use crate::error::{Error, Result};
use crate::queue::DetectionJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Uninitialized,
    Initializing,
    Ready,
    Unavailable,
}

pub struct DetectorManager<B> {
    backend: B,
    state: BackendState,
    /// Bumped on every start so exit reports from an old instance can be
    /// told apart from the current one.
    epoch: u64,
}

impl<B: DetectionBackend> DetectorManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: BackendState::Uninitialized,
            epoch: 0,
        }
    }

    pub fn state(&self) -> BackendState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == BackendState::Ready
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Begin initialization unless it's already under way or done.
    pub async fn ensure_started(&mut self, events: &CoordinatorHandle) -> Result<()> {
        match self.state {
            BackendState::Initializing | BackendState::Ready => return Ok(()),
            BackendState::Uninitialized | BackendState::Unavailable => {}
        }

        self.epoch += 1;
        self.state = BackendState::Initializing;
        log::info!(
            "[DETECTOR] Starting {:?} backend (epoch {})",
            self.backend.kind(),
            self.epoch
        );

        match self.backend.start(events.with_epoch(self.epoch)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::error!("[DETECTOR] Backend failed to start: {}", e);
                self.state = BackendState::Unavailable;
                self.backend.release().await;
                Err(e)
            }
        }
    }

    /// Handle the backend's ready signal. Returns whether the state moved
    /// to `Ready`.
    pub fn mark_ready(&mut self) -> bool {
        match self.state {
            BackendState::Initializing => {
                self.state = BackendState::Ready;
                log::info!("[DETECTOR] Backend ready");
                true
            }
            BackendState::Ready => false,
            other => {
                log::debug!("[DETECTOR] Ignoring ready signal while {:?}", other);
                false
            }
        }
    }

    /// Hand a job to the backend. A rejection faults the backend.
    pub async fn submit(&mut self, job: &DetectionJob) -> Result<()> {
        if self.state != BackendState::Ready {
            return Err(Error::BackendUnavailable(format!(
                "Backend is {:?}, cannot dispatch {}",
                self.state, job.id
            )));
        }
        match self.backend.submit(job).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fault().await;
                Err(e)
            }
        }
    }

    /// Treat the backend as broken: release it and wait for new demand.
    pub async fn fault(&mut self) {
        self.state = BackendState::Unavailable;
        self.backend.release().await;
    }

    /// Idle teardown.
    pub async fn release(&mut self) {
        if self.state == BackendState::Uninitialized {
            return;
        }
        log::info!("[DETECTOR] Releasing idle backend");
        self.backend.release().await;
        self.state = BackendState::Uninitialized;
    }
}
