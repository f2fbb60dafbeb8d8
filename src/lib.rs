//! PureGlance: detection job coordinator.
//!
//! Wires the pieces together: host messages come in on stdin, the
//! coordinator queues thumbnails for a face detector, classifies results
//! and sends hide instructions and per-tab counts back out on stdout.
//!
//! Modules:
//!   - coordinator.rs : event loop: queue, dispatch, idle teardown, retries
//!   - detector/      : backend lifecycle (offscreen surface or in-process)
//!   - classify.rs    : hide/keep decision for a detection result
//!   - session.rs     : per-tab hidden video counters
//!   - settings.rs    : persisted user settings

pub mod classify;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod host;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod settings;
pub mod sites;

pub use coordinator::{Coordinator, CoordinatorHandle};
pub use error::{Error, Result};

use detector::NoFaceDetector;
use std::sync::Arc;

/// Per-job log level: `info` when the user turned logging on, else `debug`.
pub(crate) fn job_log_level(enabled: bool) -> log::Level {
    if enabled {
        log::Level::Info
    } else {
        log::Level::Debug
    }
}

/// Entry point for the `pure-glance` binary.
pub fn run() -> Result<()> {
    config::load_env_files();
    env_logger::init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let config = config::CoordinatorConfig::from_env();
        log::info!("PureGlance coordinator starting up");
        log::info!("[SETTINGS] Using {}", config.settings_path.display());

        let settings = settings::SettingsStore::at(config.settings_path.clone());
        let backend = detector::select_backend(&config, Arc::new(NoFaceDetector));

        let (out_tx, out_rx) = tokio::sync::mpsc::unbounded_channel();
        let coordinator = Coordinator::new(config, settings, backend, out_tx);
        let handle = coordinator.handle();

        let inbound = tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) = host::pump_inbound(stdin, handle).await {
                log::error!("[HOST] Input pump failed: {}", e);
            }
        });
        let outbound = tokio::spawn(async move {
            if let Err(e) = host::pump_outbound(out_rx, tokio::io::stdout()).await {
                log::error!("[HOST] Output pump failed: {}", e);
            }
        });

        coordinator.run().await;

        // Coordinator (and its outbound sender) is gone; let the writer
        // flush what's left.
        inbound.abort();
        let _ = outbound.await;
        Ok(())
    })
}
