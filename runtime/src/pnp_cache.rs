use std::path::Path;

use stylist_packages::{FindRootError, find_pnp_configuration};
use stylist_types::PnpConfiguration;

use crate::cache::{CacheKey, FileCache};

/// Memoized Plug'n'Play discovery, with the same invalidation contract as
/// [`PackageRootCache`](crate::PackageRootCache).
pub struct PnpConfigurationCache {
    cache: FileCache<Option<PnpConfiguration>>,
}

impl PnpConfigurationCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: FileCache::new(),
        }
    }

    pub async fn find(
        &self,
        workspace_folder: &Path,
        path: &Path,
    ) -> Result<Option<PnpConfiguration>, FindRootError> {
        let key = CacheKey::new(workspace_folder, path);
        if let Some(configuration) = self.cache.get(&key) {
            return Ok(configuration);
        }

        let search = find_pnp_configuration(path).await?;
        if let Some(pnp) = &search.configuration {
            tracing::debug!(
                register = %pnp.register_path.display(),
                "Plug'n'Play configuration found"
            );
        }
        self.cache
            .insert(key, search.configuration.clone(), search.probed);
        Ok(search.configuration)
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
}

impl Default for PnpConfigurationCache {
    fn default() -> Self {
        Self::new()
    }
}
