//! WorkerRegistry: one worker process per working root, plus crash accounting.
//!
//! A slot per root holds the live worker (if any) and the root's health.
//! Health outlives the worker in the slot: a crashed worker is replaced, but
//! the crash still counts toward suppression. Nested workspace folders can
//! reach the same root, so a slot remembers every folder that used it and is
//! removed only once all of them are torn down.
//!
//! The slot map lock is never held across an await. Worker creation and
//! disposal happen outside it, and the result is reconciled under the lock
//! afterwards, so racing creators for one root leave exactly one worker
//! installed and dispose the rest.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use stylist_config::RuntimeConfig;
use stylist_types::{EnvironmentKey, PnpConfiguration, WorkerContext, WorkerError};

use crate::factory::WorkerFactory;
use crate::health::{CrashPolicy, Health, WorkerHealth};
use crate::worker::WorkerProcess;

#[derive(Clone)]
struct LiveWorker {
    process: Arc<dyn WorkerProcess>,
    environment_key: Option<EnvironmentKey>,
    pnp: Option<PnpConfiguration>,
}

impl LiveWorker {
    fn serves(&self, context: &WorkerContext) -> bool {
        self.environment_key.as_ref() == context.environment_key()
            && self.pnp.as_ref() == context.pnp()
            && !self.process.is_disposed()
    }
}

struct Slot {
    workspace_folders: BTreeSet<PathBuf>,
    worker: Option<LiveWorker>,
    health: Health,
}

impl Slot {
    fn new(workspace_folder: &Path) -> Self {
        Self {
            workspace_folders: BTreeSet::from([workspace_folder.to_path_buf()]),
            worker: None,
            health: Health::default(),
        }
    }

    fn claim(&mut self, workspace_folder: &Path) {
        if !self.workspace_folders.contains(workspace_folder) {
            self.workspace_folders.insert(workspace_folder.to_path_buf());
        }
    }

    fn belongs_to(&self, workspace_folder: &Path) -> bool {
        self.workspace_folders.contains(workspace_folder)
    }

    fn contains(&self, path: &Path) -> bool {
        self.workspace_folders
            .iter()
            .any(|folder| path.starts_with(folder))
    }
}

enum Installed {
    Ours(Option<LiveWorker>),
    Theirs(Arc<dyn WorkerProcess>),
}

pub struct WorkerRegistry {
    factory: Arc<dyn WorkerFactory>,
    policy: CrashPolicy,
    slots: Mutex<HashMap<PathBuf, Slot>>,
}

impl WorkerRegistry {
    #[must_use]
    pub fn new(factory: Arc<dyn WorkerFactory>, config: &RuntimeConfig) -> Self {
        Self {
            factory,
            policy: CrashPolicy::from_config(config),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<PathBuf, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `executor` against the current worker for `context.worker_root()`.
    ///
    /// The worker is created or replaced first when needed. Crashes are
    /// returned unmodified and counted; once the count reaches the threshold
    /// the root is suppressed and calls fail with [`WorkerError::Unavailable`]
    /// without reaching any worker.
    pub async fn run_with_worker<T, F, Fut>(
        &self,
        context: &WorkerContext,
        executor: F,
    ) -> Result<T, WorkerError>
    where
        F: FnOnce(Arc<dyn WorkerProcess>) -> Fut,
        Fut: Future<Output = Result<T, WorkerError>>,
    {
        let root = context.worker_root();
        {
            let mut slots = self.lock_slots();
            let slot = slots
                .entry(root.to_path_buf())
                .or_insert_with(|| Slot::new(context.workspace_folder()));
            slot.claim(context.workspace_folder());
            slot.health.admit(&self.policy, root, Instant::now())?;
        }

        let worker = match self.acquire(context).await {
            Ok(worker) => worker,
            Err(e) => {
                self.record_failure(root, None, &e).await;
                return Err(e);
            }
        };

        let result = executor(worker.clone()).await;
        match &result {
            Ok(_) => self.record_success(root),
            Err(e) => self.record_failure(root, Some(&worker), e).await,
        }
        result
    }

    async fn acquire(
        &self,
        context: &WorkerContext,
    ) -> Result<Arc<dyn WorkerProcess>, WorkerError> {
        let root = context.worker_root();
        let stale = {
            let mut slots = self.lock_slots();
            let slot = slots
                .entry(root.to_path_buf())
                .or_insert_with(|| Slot::new(context.workspace_folder()));
            if let Some(live) = &slot.worker
                && live.serves(context)
            {
                return Ok(live.process.clone());
            }
            slot.worker.take()
        };

        if let Some(stale) = stale {
            tracing::debug!(worker_root = %root.display(), "Replacing stale worker");
            stale.process.dispose().await;
        }

        let created = self.factory.create(context).await?;
        tracing::debug!(worker_root = %root.display(), "Worker created");

        let installed = {
            let mut slots = self.lock_slots();
            let slot = slots
                .entry(root.to_path_buf())
                .or_insert_with(|| Slot::new(context.workspace_folder()));
            if let Some(live) = &slot.worker
                && live.serves(context)
            {
                Installed::Theirs(live.process.clone())
            } else {
                Installed::Ours(slot.worker.replace(LiveWorker {
                    process: created.clone(),
                    environment_key: context.environment_key().cloned(),
                    pnp: context.pnp().cloned(),
                }))
            }
        };

        match installed {
            Installed::Theirs(winner) => {
                tracing::debug!(
                    worker_root = %root.display(),
                    "Lost creation race, disposing duplicate"
                );
                created.dispose().await;
                Ok(winner)
            }
            Installed::Ours(displaced) => {
                if let Some(displaced) = displaced {
                    displaced.process.dispose().await;
                }
                Ok(created)
            }
        }
    }

    fn record_success(&self, root: &Path) {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get_mut(root) {
            slot.health.record_success();
        }
    }

    /// Count a crash and evict the worker that produced it.
    async fn record_failure(
        &self,
        root: &Path,
        worker: Option<&Arc<dyn WorkerProcess>>,
        error: &WorkerError,
    ) {
        if !error.is_crash() {
            return;
        }
        tracing::warn!(worker_root = %root.display(), "{error}");

        let evicted = {
            let mut slots = self.lock_slots();
            let Some(slot) = slots.get_mut(root) else {
                return;
            };
            slot.health.record_crash();
            let current = match (worker, &slot.worker) {
                (Some(crashed), Some(live)) => Arc::ptr_eq(crashed, &live.process),
                _ => false,
            };
            if current {
                slot.worker.take()
            } else {
                None
            }
        };

        if let Some(evicted) = evicted {
            evicted.process.dispose().await;
        }
    }

    /// Release `workspace_folder`'s claim on its roots. Roots no other folder
    /// still uses are forgotten and their workers disposed.
    pub async fn dispose(&self, workspace_folder: &Path) {
        let removed = {
            let mut slots = self.lock_slots();
            let mut roots = Vec::new();
            for (root, slot) in slots.iter_mut() {
                if slot.workspace_folders.remove(workspace_folder)
                    && slot.workspace_folders.is_empty()
                {
                    roots.push(root.clone());
                }
            }
            roots
                .iter()
                .filter_map(|root| slots.remove(root))
                .collect::<Vec<_>>()
        };
        Self::dispose_slots(removed).await;
    }

    /// Dispose everything. Used at server shutdown.
    pub async fn dispose_all(&self) {
        let removed: Vec<Slot> = self.lock_slots().drain().map(|(_, slot)| slot).collect();
        Self::dispose_slots(removed).await;
    }

    async fn dispose_slots(slots: Vec<Slot>) {
        for slot in slots {
            if let Some(live) = slot.worker {
                live.process.dispose().await;
            }
        }
    }

    /// Clear crash state for every root of `workspace_folder`.
    pub fn notify_workspace_activity(&self, workspace_folder: &Path) -> usize {
        self.reset_where(|slot| slot.belongs_to(workspace_folder), "workspace activity")
    }

    /// Clear crash state for roots whose workspace folder contains `path`.
    pub fn notify_file_activity(&self, path: &Path) -> usize {
        self.reset_where(|slot| slot.contains(path), "file activity")
    }

    fn reset_where(&self, matches: impl Fn(&Slot) -> bool, cause: &str) -> usize {
        let mut slots = self.lock_slots();
        let mut reset = 0;
        for (root, slot) in slots.iter_mut() {
            if matches(slot) && !slot.health.is_healthy() {
                slot.health.record_success();
                tracing::info!(worker_root = %root.display(), "Worker re-enabled after {cause}");
                reset += 1;
            }
        }
        reset
    }

    #[must_use]
    pub fn health(&self, worker_root: &Path) -> Option<WorkerHealth> {
        let slots = self.lock_slots();
        slots
            .get(worker_root)
            .map(|slot| slot.health.snapshot(Instant::now()))
    }

    /// Number of installed workers that are still running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_slots()
            .values()
            .filter(|slot| {
                slot.worker
                    .as_ref()
                    .is_some_and(|live| !live.process.is_disposed())
            })
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
