use stylist_packages::FindRootError;
use stylist_types::WorkerError;
use thiserror::Error;

/// Failure of an orchestrated lint or resolve call.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Crash, suppression, or linter error; passed through unmodified.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// A directory on the way to the package root could not be inspected.
    #[error(transparent)]
    Filesystem(#[from] FindRootError),
}

impl RuntimeError {
    #[must_use]
    pub fn as_worker_error(&self) -> Option<&WorkerError> {
        match self {
            Self::Worker(e) => Some(e),
            Self::Filesystem(_) => None,
        }
    }

    /// Whether the protocol layer should show this error to the user.
    #[must_use]
    pub fn notify_user(&self) -> bool {
        match self {
            Self::Worker(e) => e.notify_user(),
            Self::Filesystem(_) => true,
        }
    }
}
