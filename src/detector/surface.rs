//! Surface side of the offscreen protocol.
//!
//! Runs inside the `pure-glance-surface` process: announce readiness, then
//! answer each `detect-face` request with a `detection-result`. Requests
//! are handled one at a time, in order.

use super::image_source::{self, ImageSource};
use super::FaceDetect;
use crate::error::Result;
use crate::protocol::{Inbound, SurfaceRequest, OFFSCREEN_TARGET};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Serve requests from `input` until EOF.
pub async fn serve<R, W>(detector: Arc<dyn FaceDetect>, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let source = ImageSource::new();
    write_message(&mut output, &Inbound::BackendReady).await?;
    log::info!("[SURFACE] Detector ready");

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<SurfaceRequest>(trimmed) {
            Ok(SurfaceRequest::DetectFace(req)) if req.target == OFFSCREEN_TARGET => req,
            Ok(SurfaceRequest::DetectFace(req)) => {
                log::debug!("[SURFACE] Ignoring request for target '{}'", req.target);
                continue;
            }
            Err(e) => {
                log::debug!("[SURFACE] Ignoring unparseable line: {}", e);
                continue;
            }
        };

        let result = image_source::run_detection(Arc::clone(&detector), &source, &request).await;
        log::log!(
            crate::job_log_level(request.is_logging_enabled),
            "[SURFACE] {}: {} face(s) on {}x{}",
            result.id,
            result.detections.len(),
            result.image_width,
            result.image_height
        );
        write_message(&mut output, &Inbound::DetectionResult(result)).await?;
    }

    log::info!("[SURFACE] Input closed, shutting down");
    Ok(())
}

async fn write_message<W: AsyncWrite + Unpin>(output: &mut W, msg: &Inbound) -> Result<()> {
    let mut line = serde_json::to_string(msg)
        .map_err(|e| crate::error::Error::Protocol(format!("JSON serialize failed: {}", e)))?;
    line.push('\n');
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}
