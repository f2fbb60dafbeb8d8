//! Runtime configuration from the environment.
//!
//! Read once at startup. `.env.local` / `.env` next to the binary's
//! working directory are loaded first, so local overrides don't need to be
//! exported in the shell.

use crate::settings;
use std::path::PathBuf;
use std::time::Duration;

/// How long the backend may sit idle with an empty queue before release.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(25);

const RETRY_BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const RETRY_BACKOFF_MAX: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub idle_timeout: Duration,
    pub retry_backoff_initial: Duration,
    pub retry_backoff_max: Duration,
    /// Command that launches the surface process, if any.
    pub surface_command: Option<String>,
    pub surface_args: Vec<String>,
    pub settings_path: PathBuf,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            retry_backoff_initial: RETRY_BACKOFF_INITIAL,
            retry_backoff_max: RETRY_BACKOFF_MAX,
            surface_command: None,
            surface_args: Vec::new(),
            settings_path: settings::default_settings_path(),
        }
    }
}

impl CoordinatorConfig {
    /// Build from `PURE_GLANCE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(cmd) = std::env::var("PURE_GLANCE_SURFACE") {
            if !cmd.trim().is_empty() {
                config.surface_command = Some(cmd.trim().to_string());
            }
        }
        if let Ok(args) = std::env::var("PURE_GLANCE_SURFACE_ARGS") {
            config.surface_args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Ok(secs) = std::env::var("PURE_GLANCE_IDLE_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(s) => config.idle_timeout = Duration::from_secs(s),
                Err(e) => log::warn!(
                    "[CONFIG] Ignoring PURE_GLANCE_IDLE_SECS={:?}: {}",
                    secs,
                    e
                ),
            }
        }
        if let Ok(path) = std::env::var("PURE_GLANCE_SETTINGS") {
            if !path.trim().is_empty() {
                config.settings_path = PathBuf::from(path.trim());
            }
        }

        config
    }
}

/// Load `.env.local`, then `.env`, from the current directory. First hit wins.
pub fn load_env_files() {
    'env_load: for env_file in [".env.local", ".env"] {
        let path = std::path::Path::new(env_file);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(_) => eprintln!("[STARTUP] Loaded {}", path.display()),
                Err(e) => eprintln!("[STARTUP] Failed to load {}: {}", path.display(), e),
            }
            break 'env_load;
        }
    }
}
