//! Fingerprint over the files whose modification means a worker must restart.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use stylist_packages::find_package_root;
use stylist_types::EnvironmentKey;
use tokio::fs;

const MANIFEST: &str = "package.json";

/// Lockfiles and loaders that change what a worker would load.
const INSTALL_STATE_FILES: [&str; 4] = [
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    ".pnp.cjs",
];

/// Computes [`EnvironmentKey`]s for a worker root.
///
/// Inputs are the manifest and install state of the worker root and the
/// workspace folder, the linter entry, and the linter's own manifest. A
/// file that cannot be read contributes a marker instead of failing, so
/// creation and deletion both change the key.
pub struct WorkerEnvironmentKey;

impl WorkerEnvironmentKey {
    pub async fn compute(
        workspace_folder: &Path,
        worker_root: &Path,
        linter_entry: Option<&Path>,
    ) -> EnvironmentKey {
        let inputs = Self::inputs(workspace_folder, worker_root, linter_entry).await;

        let mut hasher = Sha256::new();
        for path in &inputs {
            hasher.update(path.as_os_str().as_encoded_bytes());
            hasher.update(b"\0");
            hasher.update(stamp(path).await.as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();
        EnvironmentKey::new(digest.iter().map(|b| format!("{b:02x}")).collect::<String>())
    }

    /// Files consulted for the key, in a stable order.
    pub async fn inputs(
        workspace_folder: &Path,
        worker_root: &Path,
        linter_entry: Option<&Path>,
    ) -> Vec<PathBuf> {
        let mut dirs = vec![worker_root];
        if workspace_folder != worker_root {
            dirs.push(workspace_folder);
        }

        let mut inputs = Vec::new();
        for dir in dirs {
            inputs.push(dir.join(MANIFEST));
            inputs.extend(INSTALL_STATE_FILES.iter().map(|name| dir.join(name)));
        }

        if let Some(entry) = linter_entry {
            let entry = if entry.is_absolute() {
                entry.to_path_buf()
            } else {
                workspace_folder.join(entry)
            };
            match find_package_root(&entry, MANIFEST).await {
                Ok(search) => {
                    if let Some(manifest) = search.found() {
                        inputs.push(manifest.to_path_buf());
                    }
                }
                Err(e) => tracing::debug!("Skipping linter manifest in environment key: {e}"),
            }
            inputs.push(entry);
        }

        inputs
    }
}

async fn stamp(path: &Path) -> String {
    match fs::metadata(path).await {
        Ok(meta) => meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or_else(|| "unreadable".to_string(), |since| since.as_nanos().to_string()),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            "missing".to_string()
        }
        Err(_) => "unreadable".to_string(),
    }
}
