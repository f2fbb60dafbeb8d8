//! Wire types for the coordinator message contract.
//!
//! Every message is a JSON object tagged by `type`. On stdio each message
//! occupies exactly one line (NDJSON). The same types are used for:
//! - page/UI/browser → coordinator (`Inbound`)
//! - coordinator → page/UI (`Outbound`)
//! - coordinator → surface process (`SurfaceRequest`); the surface answers
//!   with `Inbound::BackendReady` and `Inbound::DetectionResult`.

use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Browser tab identifier.
pub type TabId = u32;

/// Job identifier assigned by the page (e.g. `pg-17`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Detection results ───────────────────────────────────────────────

/// Face bounding box in detected-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    #[serde(default, alias = "x")]
    pub origin_x: f64,
    #[serde(default, alias = "y")]
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(origin_x: f64, origin_y: f64, width: f64, height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            width,
            height,
        }
    }
}

/// One detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub bounding_box: BoundingBox,
}

impl From<BoundingBox> for Detection {
    fn from(bounding_box: BoundingBox) -> Self {
        Self { bounding_box }
    }
}

/// Backend answer for one job.
///
/// `image_width`/`image_height` describe the image the detector actually
/// saw (usually a downscaled thumbnail); `orig_*` are the natural size the
/// page reported at enqueue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub id: JobId,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub image_width: u32,
    #[serde(default)]
    pub image_height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_height: Option<u32>,
}

impl DetectionResult {
    /// Result reported when the image could not be acquired or decoded.
    pub fn empty(id: JobId, orig_width: Option<u32>, orig_height: Option<u32>) -> Self {
        Self {
            id,
            detections: Vec::new(),
            image_width: 0,
            image_height: 0,
            orig_width,
            orig_height,
        }
    }
}

// ── Inbound ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    /// A page asks for a thumbnail to be checked.
    #[serde(rename = "QUEUE_DETECTION", rename_all = "camelCase")]
    QueueDetection {
        id: JobId,
        #[serde(default)]
        data_url: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        orig_width: Option<u32>,
        #[serde(default)]
        orig_height: Option<u32>,
        #[serde(default)]
        sender_tab_id: Option<TabId>,
    },

    /// The detection backend finished initializing.
    #[serde(rename = "offscreen-ready", alias = "backend-ready")]
    BackendReady,

    #[serde(rename = "detection-result")]
    DetectionResult(DetectionResult),

    #[serde(rename = "get-hidden-video-count", rename_all = "camelCase")]
    GetHiddenVideoCount {
        #[serde(default)]
        tab_id: Option<TabId>,
        #[serde(default)]
        request_id: Option<u64>,
    },

    #[serde(rename = "RESET_COUNT", rename_all = "camelCase")]
    ResetCount {
        #[serde(default)]
        sender_tab_id: Option<TabId>,
    },

    /// History API navigation observed by the browser.
    #[serde(rename = "history-state-updated", rename_all = "camelCase")]
    HistoryStateUpdated {
        tab_id: TabId,
        #[serde(default)]
        frame_id: i64,
        url: String,
    },

    #[serde(rename = "tab-removed", rename_all = "camelCase")]
    TabRemoved { tab_id: TabId },

    #[serde(rename = "get-settings", rename_all = "camelCase")]
    GetSettings {
        #[serde(default)]
        request_id: Option<u64>,
    },

    #[serde(rename = "set-settings", rename_all = "camelCase")]
    SetSettings {
        #[serde(default)]
        request_id: Option<u64>,
        values: serde_json::Map<String, serde_json::Value>,
    },
}

// ── Outbound ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Outbound {
    #[serde(rename = "HIDE_VIDEO", rename_all = "camelCase")]
    HideVideo { tab_id: TabId, id: JobId },

    #[serde(rename = "URL_CHANGED", rename_all = "camelCase")]
    UrlChanged { tab_id: TabId },

    /// Pushed whenever a tab's counter changes.
    #[serde(rename = "hidden-video-count", rename_all = "camelCase")]
    HiddenVideoCount { count: u32, tab_id: TabId },

    #[serde(rename = "get-hidden-video-count-response", rename_all = "camelCase")]
    HiddenVideoCountResponse {
        request_id: Option<u64>,
        tab_id: Option<TabId>,
        count: u32,
    },

    #[serde(rename = "settings", rename_all = "camelCase")]
    Settings {
        request_id: Option<u64>,
        settings: Settings,
    },

    #[serde(rename = "settings-error", rename_all = "camelCase")]
    SettingsError {
        request_id: Option<u64>,
        message: String,
    },
}

// ── Surface protocol ────────────────────────────────────────────────

/// Request sent to the offscreen surface process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SurfaceRequest {
    #[serde(rename = "detect-face")]
    DetectFace(DetectRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    #[serde(default = "offscreen_target")]
    pub target: String,
    pub id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_height: Option<u32>,
    #[serde(default)]
    pub is_logging_enabled: bool,
}

pub const OFFSCREEN_TARGET: &str = "offscreen";

fn offscreen_target() -> String {
    OFFSCREEN_TARGET.to_string()
}
