//! Hide/keep decision for a detection result.
//!
//! Two independent policies, checked in order:
//! 1. face count: more faces than the configured threshold
//! 2. face area : any single face covering at least `threshold`% of the
//!    thumbnail, measured in the thumbnail's original resolution
//!
//! `classify` is pure: the caller reads the policy from settings and passes
//! it in.

use crate::protocol::DetectionResult;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationPolicy {
    pub area_ratio_threshold_percent: f64,
    pub face_count_threshold: u32,
    pub area_policy_enabled: bool,
    pub count_policy_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HideReason {
    FaceCount { count: usize, threshold: u32 },
    AreaRatio { ratio: f64, threshold: f64 },
}

impl fmt::Display for HideReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HideReason::FaceCount { count, threshold } => {
                write!(f, "due to face count ({} > {})", count, threshold)
            }
            HideReason::AreaRatio { ratio, threshold } => {
                write!(f, "due to large face ratio ({:.4} >= {})", ratio, threshold)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    Hide(HideReason),
    Keep,
}

/// A reported dimension of 0 means "unknown".
fn known(dim: Option<u32>) -> Option<f64> {
    dim.filter(|d| *d > 0).map(f64::from)
}

pub fn classify(result: &DetectionResult, policy: &ClassificationPolicy) -> Classification {
    let count = result.detections.len();

    if policy.count_policy_enabled && count > 0 && count > policy.face_count_threshold as usize {
        return Classification::Hide(HideReason::FaceCount {
            count,
            threshold: policy.face_count_threshold,
        });
    }

    if !policy.area_policy_enabled {
        return Classification::Keep;
    }

    let detected_w = f64::from(result.image_width);
    let detected_h = f64::from(result.image_height);
    let orig_w = known(result.orig_width);
    let orig_h = known(result.orig_height);

    let image_area = match (orig_w, orig_h) {
        (Some(w), Some(h)) => w * h,
        _ => detected_w * detected_h,
    };
    if image_area <= 0.0 {
        log::debug!(
            "[CLASSIFY] {}: image area is zero, skipping area check",
            result.id
        );
        return Classification::Keep;
    }

    let scale_x = orig_w.map_or(1.0, |w| w / detected_w);
    let scale_y = orig_h.map_or(1.0, |h| h / detected_h);
    let threshold = policy.area_ratio_threshold_percent / 100.0;

    for detection in &result.detections {
        let bbox = detection.bounding_box;
        let face_area = (bbox.width * scale_x) * (bbox.height * scale_y);
        let ratio = face_area / image_area;
        if !ratio.is_finite() {
            continue;
        }
        log::trace!(
            "[CLASSIFY] {}: face area {:.0} ({}x{} scaled), image area {}, ratio {:.4}",
            result.id,
            face_area,
            bbox.width,
            bbox.height,
            image_area,
            ratio
        );
        if ratio >= threshold {
            return Classification::Hide(HideReason::AreaRatio { ratio, threshold });
        }
    }

    Classification::Keep
}
