use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised across the worker-process boundary.
///
/// `Crashed` and `Unavailable` are the two kinds the protocol layer treats
/// specially: a crash is surfaced unmodified, and an unavailable error asks
/// for a user-visible message only when `notify_user` is set.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("Linter worker for {} crashed: {message}", worker_root.display())]
    Crashed { worker_root: PathBuf, message: String },

    #[error(
        "Linter worker for {} is unavailable after repeated crashes; retrying in {}s",
        worker_root.display(),
        retry_after.as_secs()
    )]
    Unavailable {
        worker_root: PathBuf,
        retry_after: Duration,
        notify_user: bool,
    },

    /// The worker stayed alive but the linter reported an error.
    #[error("Linter error: {0}")]
    Failed(String),
}

impl WorkerError {
    pub fn crashed(worker_root: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Crashed {
            worker_root: worker_root.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::Crashed { .. })
    }

    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Whether the protocol layer should show this error to the user.
    #[must_use]
    pub fn notify_user(&self) -> bool {
        match self {
            Self::Unavailable { notify_user, .. } => *notify_user,
            Self::Crashed { .. } | Self::Failed(_) => false,
        }
    }
}
