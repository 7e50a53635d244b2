//! Crash accounting for a worker root.
//!
//! Health belongs to the root, not the process: a crashed worker is replaced
//! by a fresh one for the same root, and the crash count must carry over.
//! Every transition takes `now` explicitly so time never comes from here.

use std::path::Path;
use std::time::{Duration, Instant};

use stylist_config::RuntimeConfig;
use stylist_types::WorkerError;

/// Stand-in expiry when `now + window` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CrashPolicy {
    threshold: u32,
    window: Duration,
    backoff: f64,
    max_window: Duration,
}

impl CrashPolicy {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            threshold: config.crash_threshold.max(1),
            window: config.suppression_window(),
            backoff: config.suppression_backoff.max(1.0),
            max_window: config.max_suppression_window().max(config.suppression_window()),
        }
    }

    /// Suppression length for the `suppressions`-th consecutive suppression (1-based).
    pub fn window_for(&self, suppressions: u32) -> Duration {
        let exponent = suppressions.saturating_sub(1).min(64) as i32;
        let secs = self.window.as_secs_f64() * self.backoff.powi(exponent);
        if !secs.is_finite() || secs >= self.max_window.as_secs_f64() {
            return self.max_window;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Point-in-time view of a root's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerHealth {
    Healthy,
    Degraded { crashes: u32 },
    Suppressed { remaining: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Healthy,
    Degraded(u32),
    Suppressed { until: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Health {
    state: State,
    /// Suppressions since the last success; drives the backoff.
    suppressions: u32,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            state: State::Healthy,
            suppressions: 0,
        }
    }
}

impl Health {
    /// Decide whether a call may go to the worker.
    ///
    /// Entering suppression is the only rejection that asks for a user
    /// notification; calls that land inside the window fail quietly.
    pub fn admit(
        &mut self,
        policy: &CrashPolicy,
        root: &Path,
        now: Instant,
    ) -> Result<(), WorkerError> {
        match self.state {
            State::Healthy => Ok(()),
            State::Degraded(crashes) if crashes < policy.threshold => Ok(()),
            State::Degraded(crashes) => {
                self.suppressions = self.suppressions.saturating_add(1);
                let window = policy.window_for(self.suppressions);
                self.state = State::Suppressed {
                    until: suppressed_until(now, window),
                };
                tracing::warn!(
                    root = %root.display(),
                    crashes,
                    window_secs = window.as_secs(),
                    "Worker keeps crashing, suppressing"
                );
                Err(WorkerError::Unavailable {
                    worker_root: root.to_path_buf(),
                    retry_after: window,
                    notify_user: true,
                })
            }
            State::Suppressed { until } if now < until => Err(WorkerError::Unavailable {
                worker_root: root.to_path_buf(),
                retry_after: until - now,
                notify_user: false,
            }),
            State::Suppressed { .. } => {
                // One more crash after the window re-enters suppression.
                self.state = degraded(policy.threshold - 1);
                tracing::debug!(root = %root.display(), "Suppression expired, retrying worker");
                Ok(())
            }
        }
    }

    pub fn record_crash(&mut self) {
        self.state = match self.state {
            State::Healthy => State::Degraded(1),
            State::Degraded(crashes) => State::Degraded(crashes.saturating_add(1)),
            // Late crashes from calls admitted before suppression don't extend it.
            suppressed @ State::Suppressed { .. } => suppressed,
        };
    }

    pub fn record_success(&mut self) {
        *self = Self::default();
    }

    pub fn is_healthy(&self) -> bool {
        self.state == State::Healthy
    }

    pub fn snapshot(&self, now: Instant) -> WorkerHealth {
        match self.state {
            State::Healthy => WorkerHealth::Healthy,
            State::Degraded(crashes) => WorkerHealth::Degraded { crashes },
            State::Suppressed { until } => WorkerHealth::Suppressed {
                remaining: until.saturating_duration_since(now),
            },
        }
    }
}

fn suppressed_until(now: Instant, window: Duration) -> Instant {
    now.checked_add(window)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

fn degraded(crashes: u32) -> State {
    if crashes == 0 {
        State::Healthy
    } else {
        State::Degraded(crashes)
    }
}
