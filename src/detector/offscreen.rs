//! Offscreen backend: a surface process hosting the model, spoken to with
//! NDJSON over stdio.
//!
//! Lifecycle: spawn → surface announces `offscreen-ready` → `detect-face`
//! requests go down stdin, `detection-result` lines come back on stdout.
//! A background reader task forwards everything the surface says to the
//! coordinator and reports the process exiting.
//!
//! Only one surface may be live per process.

use super::{BackendKind, DetectionBackend};
use crate::coordinator::CoordinatorHandle;
use crate::error::{Error, Result};
use crate::protocol::{Inbound, SurfaceRequest};
use crate::queue::DetectionJob;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;

/// Grace period for the surface to exit after stdin closes (seconds).
const SHUTDOWN_GRACE_SECS: u64 = 3;

static SURFACE_LIVE: AtomicBool = AtomicBool::new(false);

/// Held while a surface process exists; clears the process-wide flag on drop.
struct LiveGuard;

impl LiveGuard {
    fn claim() -> Option<Self> {
        SURFACE_LIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| LiveGuard)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        SURFACE_LIVE.store(false, Ordering::SeqCst);
    }
}

struct SurfaceProcess {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    reader: JoinHandle<()>,
    _live: LiveGuard,
}

pub struct OffscreenSurface {
    command: String,
    args: Vec<String>,
    process: Option<SurfaceProcess>,
}

impl OffscreenSurface {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            process: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.process.is_some()
    }

    fn spawn(&self, live: LiveGuard, events: CoordinatorHandle) -> Result<SurfaceProcess> {
        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::BackendUnavailable(format!("Failed to spawn surface '{}': {}", self.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::BackendUnavailable("No stdin for surface".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::BackendUnavailable("No stdout for surface".to_string()))?;

        let reader = tokio::spawn(forward_surface_output(BufReader::new(stdout), events));

        log::info!(
            "[DETECTOR] Surface spawned (pid {})",
            child.id().map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
        );

        Ok(SurfaceProcess {
            child,
            stdin: BufWriter::new(stdin),
            reader,
            _live: live,
        })
    }
}

impl DetectionBackend for OffscreenSurface {
    fn kind(&self) -> BackendKind {
        BackendKind::Offscreen
    }

    async fn start(&mut self, events: CoordinatorHandle) -> Result<()> {
        if self.process.is_some() {
            // Already spawned; its ready message is on the way.
            return Ok(());
        }
        let live = LiveGuard::claim().ok_or_else(|| {
            Error::BackendUnavailable("Another surface process is already live".to_string())
        })?;
        self.process = Some(self.spawn(live, events)?);
        Ok(())
    }

    async fn submit(&mut self, job: &DetectionJob) -> Result<()> {
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| Error::BackendUnavailable("Surface is not running".to_string()))?;

        let request = SurfaceRequest::DetectFace(job.to_request());
        let mut line = serde_json::to_string(&request)
            .map_err(|e| Error::Protocol(format!("JSON serialize failed: {}", e)))?;
        line.push('\n');

        process
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Surface stdin write failed: {}", e)))?;
        process
            .stdin
            .flush()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Surface stdin flush failed: {}", e)))?;
        Ok(())
    }

    /// Close stdin → wait briefly → kill.
    async fn release(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        // Stop forwarding first so an intentional shutdown isn't reported
        // as a crash.
        process.reader.abort();
        let _ = process.stdin.shutdown().await;

        match tokio::time::timeout(
            std::time::Duration::from_secs(SHUTDOWN_GRACE_SECS),
            process.child.wait(),
        )
        .await
        {
            Ok(Ok(status)) => log::info!("[DETECTOR] Surface exited: {}", status),
            _ => {
                log::warn!("[DETECTOR] Surface did not exit gracefully, killing");
                let _ = process.child.kill().await;
            }
        }
    }
}

/// Read surface stdout until EOF, forwarding ready/result messages.
async fn forward_surface_output(mut stdout: BufReader<ChildStdout>, events: CoordinatorHandle) {
    let mut line = String::new();
    let reason = loop {
        line.clear();
        match stdout.read_line(&mut line).await {
            Ok(0) => break "stdout closed (process exited?)".to_string(),
            Ok(_) => {}
            Err(e) => break format!("stdout read failed: {}", e),
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Inbound>(trimmed) {
            Ok(msg @ (Inbound::BackendReady | Inbound::DetectionResult(_))) => {
                if events.send(msg).is_err() {
                    return;
                }
            }
            Ok(other) => {
                log::debug!("[DETECTOR] Ignoring unexpected surface message: {:?}", other);
            }
            Err(_) => {
                // Surface log output, not protocol
                log::debug!(
                    "[DETECTOR] Ignoring non-JSON surface line: {}",
                    trimmed.chars().take(100).collect::<String>()
                );
            }
        }
    };

    log::warn!("[DETECTOR] Surface {}", reason);
    let _ = events.backend_exited(reason);
}
