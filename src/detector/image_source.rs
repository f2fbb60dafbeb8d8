//! Thumbnail acquisition: inline data URLs or remote URLs, decoded with
//! the `image` crate.
//!
//! Failures here never propagate past `run_detection`: an image we can't
//! read produces an empty result, so the video stays visible.

use super::FaceDetect;
use crate::error::{Error, Result};
use crate::protocol::{Detection, DetectRequest, DetectionResult};
use crate::queue::ImagePayload;
use base64::Engine;
use image::{DynamicImage, GenericImageView};
use std::sync::Arc;

/// Fetch timeout for remote thumbnails (seconds).
const FETCH_TIMEOUT_SECS: u64 = 10;

/// Decode the bytes of a `data:` URL. Only base64 payloads are supported,
/// which is what `canvas.toDataURL()` produces.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| Error::ImageAcquisition("Not a data URL".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::ImageAcquisition("Data URL has no payload".to_string()))?;
    if !meta.ends_with(";base64") {
        return Err(Error::ImageAcquisition(format!(
            "Unsupported data URL encoding: {}",
            meta
        )));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::ImageAcquisition(format!("Invalid base64 payload: {}", e)))
}

#[derive(Debug, Clone)]
pub struct ImageSource {
    client: reqwest::Client,
}

impl Default for ImageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSource {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub async fn acquire(&self, payload: &ImagePayload) -> Result<DynamicImage> {
        let bytes = match payload {
            ImagePayload::DataUrl(data_url) => decode_data_url(data_url)?,
            ImagePayload::Url(url) => self.fetch(url).await?,
        };
        image::load_from_memory(&bytes)
            .map_err(|e| Error::ImageAcquisition(format!("Decode failed: {}", e)))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::ImageAcquisition(format!("Fetch {} failed: {}", url, e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::ImageAcquisition(format!("Read {} failed: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Acquire the request's image and run the detector on the blocking pool.
///
/// Always yields a result for `request.id`; any failure yields no
/// detections and zero image dimensions.
pub async fn run_detection(
    detector: Arc<dyn FaceDetect>,
    source: &ImageSource,
    request: &DetectRequest,
) -> DetectionResult {
    match detect(detector, source, request).await {
        Ok(result) => result,
        Err(e) => {
            log::log!(
                crate::job_log_level(request.is_logging_enabled),
                "[DETECTOR] Failed to process thumbnail {}: {}",
                request.id,
                e
            );
            DetectionResult::empty(request.id.clone(), request.orig_width, request.orig_height)
        }
    }
}

async fn detect(
    detector: Arc<dyn FaceDetect>,
    source: &ImageSource,
    request: &DetectRequest,
) -> Result<DetectionResult> {
    let payload = ImagePayload::from_parts(request.data_url.clone(), request.url.clone())
        .ok_or_else(|| Error::ImageAcquisition("No image data provided".to_string()))?;
    let image = source.acquire(&payload).await?;
    let (width, height) = image.dimensions();

    log::log!(
        crate::job_log_level(request.is_logging_enabled),
        "[DETECTOR] {}: decoded {}x{} image for detection",
        request.id,
        width,
        height
    );

    let boxes = tokio::task::spawn_blocking(move || detector.detect(&image))
        .await
        .map_err(|e| Error::ImageAcquisition(format!("Detector task failed: {}", e)))?
        .map_err(Error::ImageAcquisition)?;

    Ok(DetectionResult {
        id: request.id.clone(),
        detections: boxes.into_iter().map(Detection::from).collect(),
        image_width: width,
        image_height: height,
        orig_width: request.orig_width,
        orig_height: request.orig_height,
    })
}
