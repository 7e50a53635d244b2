//! WorkspaceOrchestrator: the entry point the protocol layer calls.
//!
//! Each request is turned into a [`WorkerContext`] (root, PnP loader,
//! environment key) from the caches, then handed to the registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stylist_config::RuntimeConfig;
use stylist_packages::GlobalPathResolver;
use stylist_types::{
    RunnerOptions, WorkerContext, WorkspaceLintRequest, WorkspaceLintResult,
    WorkspaceResolveRequest, WorkspaceResolveResult,
};

use crate::environment::WorkerEnvironmentKey;
use crate::error::RuntimeError;
use crate::factory::{StdioWorkerFactory, WorkerFactory};
use crate::package_root_cache::PackageRootCache;
use crate::pnp_cache::PnpConfigurationCache;
use crate::registry::WorkerRegistry;
use crate::worker::{LintParams, ResolveParams};

pub struct WorkspaceOrchestrator {
    registry: WorkerRegistry,
    package_roots: PackageRootCache,
    pnp: PnpConfigurationCache,
    global_paths: Option<Arc<GlobalPathResolver>>,
}

impl WorkspaceOrchestrator {
    #[must_use]
    pub fn new(config: &RuntimeConfig, factory: Arc<dyn WorkerFactory>) -> Self {
        Self {
            registry: WorkerRegistry::new(factory, config),
            package_roots: PackageRootCache::new(config.package_marker.clone()),
            pnp: PnpConfigurationCache::new(),
            global_paths: None,
        }
    }

    /// Orchestrator backed by real worker processes.
    #[must_use]
    pub fn with_stdio_workers(config: &RuntimeConfig) -> Self {
        Self::new(config, Arc::new(StdioWorkerFactory::new(config.clone())))
    }

    /// Let workers fall back to the package manager's global module directory.
    #[must_use]
    pub fn with_global_paths(mut self, resolver: Arc<GlobalPathResolver>) -> Self {
        self.global_paths = Some(resolver);
        self
    }

    pub async fn lint(
        &self,
        request: WorkspaceLintRequest,
    ) -> Result<Option<WorkspaceLintResult>, RuntimeError> {
        let workspace_folder = request.workspace_folder.clone();
        let stylelint_path = request.runner_options.stylelint_path.clone();
        let context = self
            .context_for(
                &workspace_folder,
                request.code_filename(),
                stylelint_path.as_deref(),
            )
            .await?;
        let global_modules_path = self.global_modules_path(&request.runner_options).await;

        let params = LintParams {
            options: request.options,
            runner_options: request.runner_options,
            global_modules_path,
        };
        let outcome = self
            .registry
            .run_with_worker(&context, move |worker| async move { worker.lint(params).await })
            .await?;

        if outcome.is_none() {
            tracing::debug!(
                worker_root = %context.worker_root().display(),
                "No stylelint installation found, skipping lint"
            );
        }
        Ok(outcome)
    }

    pub async fn resolve(
        &self,
        request: WorkspaceResolveRequest,
    ) -> Result<Option<WorkspaceResolveResult>, RuntimeError> {
        let stylelint_path = request.stylelint_path().map(Path::to_path_buf);
        let context = self
            .context_for(
                &request.workspace_folder,
                request.code_filename.as_deref(),
                stylelint_path.as_deref(),
            )
            .await?;
        let global_modules_path = self.global_modules_path(&request.runner_options).await;

        let params = ResolveParams {
            stylelint_path,
            code_filename: request.code_filename,
            runner_options: request.runner_options,
            global_modules_path,
        };
        let resolved = self
            .registry
            .run_with_worker(&context, move |worker| async move {
                worker.resolve(params).await
            })
            .await?;

        if resolved.is_none() {
            tracing::debug!(
                worker_root = %context.worker_root().display(),
                "No stylelint installation found"
            );
        }
        Ok(resolved)
    }

    async fn context_for(
        &self,
        workspace_folder: &Path,
        code_filename: Option<&Path>,
        stylelint_path: Option<&Path>,
    ) -> Result<WorkerContext, RuntimeError> {
        let worker_root = self
            .package_roots
            .find_for_request(workspace_folder, code_filename, stylelint_path)
            .await?
            .unwrap_or_else(|| workspace_folder.to_path_buf());
        let pnp = self.pnp.find(workspace_folder, &worker_root).await?;
        let environment_key =
            WorkerEnvironmentKey::compute(workspace_folder, &worker_root, stylelint_path).await;

        Ok(WorkerContext::new(workspace_folder, worker_root)
            .with_pnp(pnp)
            .with_environment_key(Some(environment_key)))
    }

    async fn global_modules_path(&self, runner_options: &RunnerOptions) -> Option<PathBuf> {
        let resolver = self.global_paths.as_ref()?;
        resolver.resolve(runner_options.package_manager()).await
    }

    /// A document was opened or a folder added: give crashed workers another chance.
    pub fn notify_workspace_activity(&self, workspace_folder: &Path) {
        self.registry.notify_workspace_activity(workspace_folder);
    }

    /// A watched file changed: re-enable affected workers and drop stale lookups.
    pub fn notify_file_activity(&self, path: &Path) {
        self.registry.notify_file_activity(path);
        let roots = self.package_roots.invalidate_for_file(path);
        let loaders = self.pnp.invalidate_for_file(path);
        if roots + loaders > 0 {
            tracing::trace!(
                path = %path.display(),
                roots,
                loaders,
                "Invalidated cached lookups"
            );
        }
    }

    pub async fn dispose(&self, workspace_folder: &Path) {
        self.registry.dispose(workspace_folder).await;
        self.package_roots.clear_for_workspace(workspace_folder);
        self.pnp.clear_for_workspace(workspace_folder);
    }

    pub async fn dispose_all(&self) {
        self.registry.dispose_all().await;
        self.package_roots.clear();
        self.pnp.clear();
    }

    #[must_use]
    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    #[must_use]
    pub fn package_roots(&self) -> &PackageRootCache {
        &self.package_roots
    }
}
