//! Runtime configuration for Stylist.
//!
//! The file lives at `~/.stylist/config.toml`. Every field has a default, so
//! a missing file, a missing section, or a malformed file all produce a usable
//! configuration; only the last one is worth a warning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_CRASH_THRESHOLD: u32 = 2;
const DEFAULT_SUPPRESSION_SECS: u64 = 30;
const DEFAULT_MAX_SUPPRESSION_SECS: u64 = 300;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Consecutive crashes before a worker root is suppressed.
    pub crash_threshold: u32,
    /// Length of the first suppression window.
    pub suppression_secs: u64,
    /// Growth factor for repeated suppressions of the same root. 1.0 keeps the window fixed.
    pub suppression_backoff: f64,
    /// Upper bound for a grown suppression window.
    pub max_suppression_secs: u64,
    /// A worker that served no request for this long disposes itself. 0 disables eviction.
    pub worker_idle_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Executable hosting the worker script.
    pub worker_command: String,
    /// Worker entry script. Without it no worker can be started.
    pub worker_script: Option<PathBuf>,
    /// Marker file that identifies a package root.
    pub package_marker: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            crash_threshold: DEFAULT_CRASH_THRESHOLD,
            suppression_secs: DEFAULT_SUPPRESSION_SECS,
            suppression_backoff: 1.0,
            max_suppression_secs: DEFAULT_MAX_SUPPRESSION_SECS,
            worker_idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            worker_command: "node".to_string(),
            worker_script: None,
            package_marker: "package.json".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load from the default location, falling back to defaults.
    #[must_use]
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`, falling back to defaults when the file is absent or invalid.
    #[must_use]
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {}: {err}", path.display());
                return Self::default();
            }
        };

        match Self::parse(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Failed to parse config at {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let config: Self = toml::from_str(content)?;
        Ok(config.normalized())
    }

    /// Clamp values that would make the state machine degenerate.
    fn normalized(mut self) -> Self {
        self.crash_threshold = self.crash_threshold.max(1);
        if !self.suppression_backoff.is_finite() || self.suppression_backoff < 1.0 {
            self.suppression_backoff = 1.0;
        }
        self.max_suppression_secs = self.max_suppression_secs.max(self.suppression_secs);
        self
    }

    #[must_use]
    pub fn suppression_window(&self) -> Duration {
        Duration::from_secs(self.suppression_secs)
    }

    #[must_use]
    pub fn max_suppression_window(&self) -> Duration {
        Duration::from_secs(self.max_suppression_secs)
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_idle_timeout_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".stylist").join("config.toml"))
}
