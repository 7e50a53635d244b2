//! Memoization keyed by (workspace folder, path) with a reverse index from
//! contributing files to the entries they produced.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub workspace_folder: PathBuf,
    pub path: PathBuf,
}

impl CacheKey {
    pub fn new(workspace_folder: &Path, path: &Path) -> Self {
        Self {
            workspace_folder: workspace_folder.to_path_buf(),
            path: path.to_path_buf(),
        }
    }
}

struct Entry<V> {
    value: V,
    sources: Vec<PathBuf>,
}

struct Inner<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    dependents: HashMap<PathBuf, HashSet<CacheKey>>,
}

impl<V> Inner<V> {
    fn remove(&mut self, key: &CacheKey) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        for source in entry.sources {
            if let Some(keys) = self.dependents.get_mut(&source) {
                keys.remove(key);
                if keys.is_empty() {
                    self.dependents.remove(&source);
                }
            }
        }
        true
    }
}

pub(crate) struct FileCache<V> {
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> FileCache<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                dependents: HashMap::new(),
            }),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store `value`, to be dropped when any of `sources` changes.
    pub fn insert(&self, key: CacheKey, value: V, sources: Vec<PathBuf>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.remove(&key);
        for source in &sources {
            inner
                .dependents
                .entry(source.clone())
                .or_default()
                .insert(key.clone());
        }
        inner.entries.insert(key, Entry { value, sources });
    }

    /// Drop every entry `path` contributed to. Returns how many were dropped.
    pub fn invalidate_for_file(&self, path: &Path) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(keys) = inner.dependents.remove(path) else {
            return 0;
        };
        keys.iter().filter(|key| inner.remove(key)).count()
    }

    pub fn clear_for_workspace(&self, workspace_folder: &Path) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let keys: Vec<CacheKey> = inner
            .entries
            .keys()
            .filter(|key| key.workspace_folder == workspace_folder)
            .cloned()
            .collect();
        for key in &keys {
            inner.remove(key);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.dependents.clear();
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}
