//! Pending detection jobs, in arrival order.

use crate::protocol::{DetectRequest, JobId, TabId, OFFSCREEN_TARGET};
use std::collections::VecDeque;

/// Where the detector should get the thumbnail from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Inline `data:` URL produced by the page's canvas.
    DataUrl(String),
    /// Source URL, used when the canvas was tainted or the image failed to
    /// load in the page.
    Url(String),
}

impl ImagePayload {
    /// Prefer the inline image when the page sent both.
    pub fn from_parts(data_url: Option<String>, url: Option<String>) -> Option<Self> {
        match (data_url, url) {
            (Some(d), _) if !d.is_empty() => Some(ImagePayload::DataUrl(d)),
            (_, Some(u)) if !u.is_empty() => Some(ImagePayload::Url(u)),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ImagePayload::DataUrl(_) => "dataUrl".to_string(),
            ImagePayload::Url(u) => format!("URL: {}", u),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionJob {
    pub id: JobId,
    pub tab_id: TabId,
    pub image: ImagePayload,
    pub original_width: Option<u32>,
    pub original_height: Option<u32>,
    /// Snapshot of `isLoggingEnabled` at enqueue time.
    pub logging: bool,
}

impl DetectionJob {
    /// Surface-protocol request for this job.
    pub fn to_request(&self) -> DetectRequest {
        let (data_url, url) = match &self.image {
            ImagePayload::DataUrl(d) => (Some(d.clone()), None),
            ImagePayload::Url(u) => (None, Some(u.clone())),
        };
        DetectRequest {
            target: OFFSCREEN_TARGET.to_string(),
            id: self.id.clone(),
            data_url,
            url,
            orig_width: self.original_width,
            orig_height: self.original_height,
            is_logging_enabled: self.logging,
        }
    }
}

/// FIFO of jobs waiting for the detector.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<DetectionJob>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. No de-duplication: the page's id discipline is
    /// trusted.
    pub fn enqueue(&mut self, job: DetectionJob) {
        self.jobs.push_back(job);
    }

    pub fn dequeue_next(&mut self) -> Option<DetectionJob> {
        self.jobs.pop_front()
    }

    /// Put a job that could not be dispatched back at the head so it keeps
    /// its place ahead of everything enqueued after it.
    pub fn restore_front(&mut self, job: DetectionJob) {
        self.jobs.push_front(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(|j| j.id.clone()).collect()
    }
}
