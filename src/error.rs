//! Error taxonomy for the coordinator.
//!
//! None of these are fatal to the coordinator itself: backend faults are
//! retried, image failures degrade to "no detections", and storage failures
//! are reported to whoever asked for the settings operation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Backend failed to start, rejected a job, or exited.
    #[error("detection backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Fetching or decoding a thumbnail failed.
    #[error("failed to acquire image: {0}")]
    ImageAcquisition(String),

    /// Settings could not be read, parsed or written.
    #[error("settings storage error: {0}")]
    Storage(String),

    /// A message on the wire could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("coordinator is no longer running")]
    CoordinatorClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
