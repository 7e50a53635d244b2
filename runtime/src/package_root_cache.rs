use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use stylist_packages::{FindRootError, find_package_root};

use crate::cache::{CacheKey, FileCache};

/// Memoized package-root lookups, scoped to a workspace folder.
///
/// A root outside the workspace folder does not count: the lookup then
/// yields `None` and the caller falls back further.
pub struct PackageRootCache {
    marker: String,
    cache: FileCache<Option<PathBuf>>,
    walks: AtomicUsize,
}

impl PackageRootCache {
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            cache: FileCache::new(),
            walks: AtomicUsize::new(0),
        }
    }

    /// The package root governing `path` within `workspace_folder`.
    pub async fn find(
        &self,
        workspace_folder: &Path,
        path: &Path,
    ) -> Result<Option<PathBuf>, FindRootError> {
        let key = CacheKey::new(workspace_folder, path);
        if let Some(root) = self.cache.get(&key) {
            return Ok(root);
        }

        self.walks.fetch_add(1, Ordering::Relaxed);
        let search = find_package_root(path, &self.marker).await?;
        let root = search
            .directory()
            .filter(|dir| dir.starts_with(workspace_folder))
            .map(Path::to_path_buf);
        tracing::trace!(
            path = %path.display(),
            root = ?root,
            "Resolved package root"
        );
        self.cache.insert(key, root.clone(), search.into_probed());
        Ok(root)
    }

    /// Root for a request: the code file's package first, then the package
    /// that installed the linter.
    pub async fn find_for_request(
        &self,
        workspace_folder: &Path,
        code_filename: Option<&Path>,
        stylelint_path: Option<&Path>,
    ) -> Result<Option<PathBuf>, FindRootError> {
        if let Some(file) = code_filename
            && let Some(root) = self.find(workspace_folder, file).await?
        {
            return Ok(Some(root));
        }
        if let Some(linter) = stylelint_path {
            let linter = absolutize(workspace_folder, linter);
            return self.find(workspace_folder, &installer_of(&linter)).await;
        }
        Ok(None)
    }

    pub fn invalidate_for_file(&self, path: &Path) -> usize {
        self.cache.invalidate_for_file(path)
    }

    pub fn clear_for_workspace(&self, workspace_folder: &Path) {
        self.cache.clear_for_workspace(workspace_folder);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Filesystem walks performed so far; cache hits don't count.
    #[must_use]
    pub fn walks(&self) -> usize {
        self.walks.load(Ordering::Relaxed)
    }
}

fn absolutize(workspace_folder: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace_folder.join(path)
    }
}

/// The directory that owns the `node_modules` a linter is installed in.
///
/// The linter's own `package.json` would otherwise win the upward walk.
fn installer_of(linter: &Path) -> PathBuf {
    let mut owner = None;
    let mut prefix = PathBuf::new();
    for component in linter.components() {
        if component == Component::Normal("node_modules".as_ref()) {
            owner = Some(prefix.clone());
        }
        prefix.push(component);
    }
    owner.unwrap_or_else(|| linter.to_path_buf())
}
