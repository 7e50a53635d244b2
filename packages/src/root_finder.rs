//! Upward filesystem walks.
//!
//! "Not found" and "not a directory" mean keep walking; the latter is what a
//! file path yields for `file/package.json`, so a walk may start at a file.
//! Any other error is fatal: the user has to see a directory we cannot read.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
#[error("Failed to inspect {}: {source}", path.display())]
pub struct FindRootError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Outcome of an upward walk: the marker file found, plus every path probed on the way.
///
/// The probed paths are what a cache must watch: creating any of them could
/// change the answer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpwardSearch {
    found: Option<PathBuf>,
    probed: Vec<PathBuf>,
}

impl UpwardSearch {
    /// The marker file that ended the walk.
    #[must_use]
    pub fn found(&self) -> Option<&Path> {
        self.found.as_deref()
    }

    /// The directory containing the marker file.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.found.as_deref().and_then(Path::parent)
    }

    #[must_use]
    pub fn probed(&self) -> &[PathBuf] {
        &self.probed
    }

    pub(crate) fn push_probed(&mut self, path: PathBuf) {
        self.probed.push(path);
    }

    #[must_use]
    pub fn into_probed(self) -> Vec<PathBuf> {
        self.probed
    }
}

/// Walk from `start` to the filesystem root, returning the first of `names` that is a file.
///
/// Within one directory `names` are tried in order.
pub async fn find_upward(start: &Path, names: &[&str]) -> Result<UpwardSearch, FindRootError> {
    let mut search = UpwardSearch::default();
    let mut current = start;

    loop {
        for name in names {
            let candidate = current.join(name);
            search.probed.push(candidate.clone());
            if is_file(&candidate).await? {
                search.found = Some(candidate);
                return Ok(search);
            }
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => return Ok(search),
        }
    }
}

/// The nearest ancestor of `start` (or `start` itself) containing `marker`.
pub async fn find_package_root(start: &Path, marker: &str) -> Result<UpwardSearch, FindRootError> {
    find_upward(start, &[marker]).await
}

/// `Ok(false)` for anything that is missing or not a regular file.
pub(crate) async fn is_file(path: &Path) -> Result<bool, FindRootError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if is_missing(&e) => Ok(false),
        Err(source) => Err(FindRootError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn is_missing(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}
