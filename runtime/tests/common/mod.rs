//! Shared test utilities and fixtures
//!
//! In-process stand-ins for worker processes, so the registry and the
//! orchestrator can be driven without Node.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::json;
use stylist_config::RuntimeConfig;
use stylist_runtime::{
    CreateFut, DisposeFut, LintParams, ResolveParams, WorkerFactory, WorkerFut, WorkerProcess,
};
use stylist_types::{LintOutcome, ResolvedLinter, WorkerContext, WorkerError};
use tokio::time::sleep;

/// What every fake worker does when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Succeed,
    Crash,
    NotFound,
    Fail,
}

pub struct FakeWorker {
    pub id: usize,
    pub context: WorkerContext,
    behavior: Arc<Mutex<Behavior>>,
    calls: Arc<AtomicUsize>,
    disposed: AtomicBool,
    disposals: Arc<AtomicUsize>,
}

impl FakeWorker {
    fn respond<T>(&self, found: impl FnOnce() -> T) -> Result<Option<T>, WorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap_or_else(PoisonError::into_inner);
        match behavior {
            Behavior::Succeed => Ok(Some(found())),
            Behavior::NotFound => Ok(None),
            Behavior::Crash => Err(WorkerError::crashed(
                self.context.worker_root(),
                "worker exited with code 1",
            )),
            Behavior::Fail => Err(WorkerError::Failed("No configuration provided".to_string())),
        }
    }

    /// Simulate the process evicting itself for idleness.
    pub fn evict(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

impl WorkerProcess for FakeWorker {
    fn lint(&self, _params: LintParams) -> WorkerFut<'_, Option<LintOutcome>> {
        let id = self.id;
        Box::pin(async move {
            self.respond(|| LintOutcome {
                resolved_path: "/fake/node_modules/stylelint/lib/index.mjs".into(),
                linter_result: json!({ "worker": id, "results": [] }),
            })
        })
    }

    fn resolve(&self, _params: ResolveParams) -> WorkerFut<'_, Option<ResolvedLinter>> {
        Box::pin(async move {
            self.respond(|| ResolvedLinter {
                entry_path: "/fake/node_modules/stylelint".into(),
                resolved_path: "/fake/node_modules/stylelint/lib/index.mjs".into(),
                version: Some("16.2.1".to_string()),
            })
        })
    }

    fn dispose(&self) -> DisposeFut<'_> {
        Box::pin(async move {
            if !self.disposed.swap(true, Ordering::SeqCst) {
                self.disposals.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeFactory {
    behavior: Arc<Mutex<Behavior>>,
    calls: Arc<AtomicUsize>,
    disposals: Arc<AtomicUsize>,
    workers: Mutex<Vec<Arc<FakeWorker>>>,
    fail_create: AtomicBool,
    create_delay: Option<Duration>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creation takes `delay`, leaving room for racing callers.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            create_delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    pub fn fail_creation(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.workers().len()
    }

    /// Calls that reached any worker.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    pub fn worker(&self, index: usize) -> Arc<FakeWorker> {
        self.workers()[index].clone()
    }

    pub fn workers(&self) -> Vec<Arc<FakeWorker>> {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn live_workers(&self) -> usize {
        self.workers()
            .iter()
            .filter(|worker| !worker.is_disposed())
            .count()
    }
}

impl WorkerFactory for FakeFactory {
    fn create<'a>(&'a self, context: &'a WorkerContext) -> CreateFut<'a> {
        Box::pin(async move {
            if let Some(delay) = self.create_delay {
                sleep(delay).await;
            }
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(WorkerError::crashed(
                    context.worker_root(),
                    "node not found in PATH",
                ));
            }

            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            let worker = Arc::new(FakeWorker {
                id: workers.len(),
                context: context.clone(),
                behavior: self.behavior.clone(),
                calls: self.calls.clone(),
                disposed: AtomicBool::new(false),
                disposals: self.disposals.clone(),
            });
            workers.push(worker.clone());
            Ok(worker as Arc<dyn WorkerProcess>)
        })
    }
}

/// Default policy with a fixed 30s window.
pub fn config() -> RuntimeConfig {
    RuntimeConfig::default()
}

pub fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "{}").unwrap();
}
