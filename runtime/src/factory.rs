use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use stylist_config::RuntimeConfig;
use stylist_types::{WorkerContext, WorkerError};

use crate::stdio_worker::{StdioWorker, WorkerLaunch};
use crate::worker::WorkerProcess;

pub type CreateFut<'a> =
    Pin<Box<dyn Future<Output = Result<Arc<dyn WorkerProcess>, WorkerError>> + Send + 'a>>;

/// Creates worker processes for the registry.
///
/// A creation failure is treated like a crash of the root's worker.
pub trait WorkerFactory: Send + Sync {
    fn create<'a>(&'a self, context: &'a WorkerContext) -> CreateFut<'a>;
}

/// Starts `worker_command worker_script` as a child process per worker root.
#[derive(Debug, Clone)]
pub struct StdioWorkerFactory {
    config: RuntimeConfig,
}

impl StdioWorkerFactory {
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }
}

impl WorkerFactory for StdioWorkerFactory {
    fn create<'a>(&'a self, context: &'a WorkerContext) -> CreateFut<'a> {
        Box::pin(async move {
            let root = context.worker_root();
            let Some(script) = self.config.worker_script.clone() else {
                return Err(WorkerError::crashed(
                    root,
                    "no worker_script configured in ~/.stylist/config.toml",
                ));
            };

            let launch = WorkerLaunch {
                command: self.config.worker_command.clone(),
                script,
                root: root.to_path_buf(),
                pnp: context.pnp().cloned(),
                request_timeout: self.config.request_timeout(),
                idle_timeout: self.config.idle_timeout(),
            };

            match StdioWorker::start(launch).await {
                Ok(worker) => Ok(Arc::new(worker) as Arc<dyn WorkerProcess>),
                Err(e) => Err(WorkerError::crashed(root, format!("{e:#}"))),
            }
        })
    }
}
