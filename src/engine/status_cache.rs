//! engine::status_cache
//!
//! Memoizes the HEAD commit of each repository root.
//!
//! Repeated status queries read HEAD's id (cheap) and only load the full
//! commit when the id differs from the last one seen for that root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::cache::KeyedCache;
use crate::core::types::Oid;
use crate::git::CommitInfo;

/// Per-root cache of the HEAD commit.
#[derive(Debug, Default)]
pub struct StatusCache {
    roots: Mutex<HashMap<PathBuf, KeyedCache<Oid, CommitInfo>>>,
}

impl StatusCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit info for `head` under `root`, loading it on a miss.
    pub fn head_info<E, F>(&self, root: &Path, head: &Oid, load: F) -> Result<CommitInfo, E>
    where
        F: FnOnce(&Oid) -> Result<CommitInfo, E>,
    {
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        let cache = roots.entry(root.to_path_buf()).or_default();
        cache.get_or_rebuild(head.clone(), || load(head)).cloned()
    }

    /// Forget `root`.
    pub fn invalidate(&self, root: &Path) {
        self.roots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(root);
    }

    /// How many loads have happened for `root`.
    pub fn load_count(&self, root: &Path) -> u64 {
        self.roots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(root)
            .map(KeyedCache::rebuild_count)
            .unwrap_or(0)
    }
}
