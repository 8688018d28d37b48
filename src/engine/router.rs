//! engine::router
//!
//! Maps file paths to the (sub)repository handle that owns them.
//!
//! The submodule index is a [`KeyedCache`] keyed by the modification time of
//! `.gitmodules`. It is rebuilt under one mutex exactly when that mtime
//! changes; between rebuilds callers accept a stale index. A rebuild keeps
//! the handle of every root that is still declared and opens handles only
//! for new roots, so a root never has two live handles. Handles of removed
//! roots are passed to the retire hook after the index lock is released.
//! Nested submodules are not descended into. Submodules that fail to open
//! (not initialized, removed) are skipped and their paths route to the
//! top-level handle.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::core::cache::KeyedCache;
use crate::git::submodule_paths;

/// Error type returned by a handle opener.
pub type OpenError = Box<dyn std::error::Error + Send + Sync>;

type Opener<H> = Box<dyn Fn(&Path) -> Result<H, OpenError> + Send + Sync>;
type Retire<H> = Box<dyn Fn(&Path, &H) + Send + Sync>;
type SubmoduleIndex<H> = Vec<(PathBuf, Arc<H>)>;

/// Resolves paths to handles.
pub struct Router<H> {
    work_dir: PathBuf,
    gitmodules: PathBuf,
    top: Arc<H>,
    index: Mutex<KeyedCache<Option<SystemTime>, SubmoduleIndex<H>>>,
    opener: Opener<H>,
    retire: Retire<H>,
}

impl<H> std::fmt::Debug for Router<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl<H> Router<H> {
    /// Create a router for the working copy at `work_dir`.
    ///
    /// `opener` receives the absolute root of each submodule.
    pub fn new<F>(work_dir: &Path, top: Arc<H>, opener: F) -> Self
    where
        F: Fn(&Path) -> Result<H, OpenError> + Send + Sync + 'static,
    {
        Self {
            work_dir: work_dir.to_path_buf(),
            gitmodules: work_dir.join(".gitmodules"),
            top,
            index: Mutex::new(KeyedCache::new()),
            opener: Box::new(opener),
            retire: Box::new(|_, _| {}),
        }
    }

    /// Run `retire` on the handle of every root dropped from `.gitmodules`.
    pub fn on_retire<F>(mut self, retire: F) -> Self
    where
        F: Fn(&Path, &H) + Send + Sync + 'static,
    {
        self.retire = Box::new(retire);
        self
    }

    /// The top-level handle.
    pub fn top(&self) -> &Arc<H> {
        &self.top
    }

    fn mtime(&self) -> Option<SystemTime> {
        fs::metadata(&self.gitmodules)
            .and_then(|m| m.modified())
            .ok()
    }

    fn build_index(
        &self,
        previous: Option<&SubmoduleIndex<H>>,
        retired: &mut SubmoduleIndex<H>,
    ) -> SubmoduleIndex<H> {
        let previous: &[(PathBuf, Arc<H>)] = previous.map(Vec::as_slice).unwrap_or(&[]);
        let declared = match submodule_paths(&self.gitmodules) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(error = %e, "failed to read .gitmodules");
                Vec::new()
            }
        };
        let mut index: SubmoduleIndex<H> = Vec::with_capacity(declared.len());
        let mut opened = 0usize;
        for rel in declared {
            let root = self.work_dir.join(&rel);
            if index.iter().any(|(known, _)| *known == root) {
                continue;
            }
            if let Some((_, live)) = previous.iter().find(|(known, _)| *known == root) {
                index.push((root, Arc::clone(live)));
                continue;
            }
            match (self.opener)(&root) {
                Ok(handle) => {
                    opened += 1;
                    index.push((root, Arc::new(handle)));
                }
                Err(e) => debug!(path = %root.display(), error = %e, "skipping submodule"),
            }
        }
        retired.extend(
            previous
                .iter()
                .filter(|(root, _)| !index.iter().any(|(kept, _)| kept == root))
                .map(|(root, handle)| (root.clone(), Arc::clone(handle))),
        );
        debug!(
            count = index.len(),
            opened,
            retired = retired.len(),
            "submodule index rebuilt"
        );
        index
    }

    /// Current submodule handles, rebuilding the index if `.gitmodules` changed.
    pub fn submodules(&self) -> SubmoduleIndex<H> {
        let key = self.mtime();
        let mut retired = Vec::new();
        let index = {
            let mut cache = self.index.lock().unwrap_or_else(|e| e.into_inner());
            let rebuilt = cache.refresh_with(key, |previous| {
                Ok::<_, std::convert::Infallible>(self.build_index(previous, &mut retired))
            });
            match rebuilt {
                Ok(index) => index.clone(),
                Err(never) => match never {},
            }
        };
        for (root, handle) in retired {
            debug!(root = %root.display(), "retiring submodule handle");
            (self.retire)(&root, &handle);
        }
        index
    }

    /// Submodule handles of the current index, without checking `.gitmodules`.
    pub fn live(&self) -> SubmoduleIndex<H> {
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .peek()
            .cloned()
            .unwrap_or_default()
    }

    /// The handle owning `path` (absolute, or relative to the work dir).
    ///
    /// The deepest submodule root containing `path` wins; otherwise the
    /// top-level handle.
    pub fn resolve(&self, path: &Path) -> Arc<H> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        };
        self.submodules()
            .into_iter()
            .filter(|(root, _)| path.starts_with(root))
            .max_by_key(|(root, _)| root.components().count())
            .map(|(_, handle)| handle)
            .unwrap_or_else(|| Arc::clone(&self.top))
    }

    /// Force the next lookup to rebuild the index. Live handles are kept.
    pub fn invalidate(&self) {
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .expire();
    }

    /// How many times the index has been built.
    pub fn rebuild_count(&self) -> u64 {
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rebuild_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn write_gitmodules(dir: &Path, paths: &[&str]) {
        let mut body = String::new();
        for p in paths {
            body.push_str(&format!("[submodule \"{p}\"]\n\tpath = {p}\n\turl = ../{p}\n"));
        }
        fs::write(dir.join(".gitmodules"), body).unwrap();
    }

    fn bump_mtime(file: &Path, secs: u64) {
        let f = fs::File::options().write(true).open(file).unwrap();
        f.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn router(dir: &Path) -> (Router<String>, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opens);
        let base = dir.to_path_buf();
        let router = Router::new(dir, Arc::new("top".to_string()), move |root: &Path| {
            counter.fetch_add(1, Ordering::SeqCst);
            let rel = root.strip_prefix(&base)?;
            if rel == Path::new("broken") {
                return Err("not initialized".into());
            }
            Ok(rel.display().to_string())
        });
        (router, opens)
    }

    #[test]
    fn no_gitmodules_routes_to_top() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = router(dir.path());
        assert_eq!(*router.resolve(Path::new("src/main.rs")), "top");
    }

    #[test]
    fn deepest_root_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_gitmodules(dir.path(), &["lib", "lib/inner"]);
        let (router, _) = router(dir.path());
        assert_eq!(*router.resolve(Path::new("lib/a.rs")), "lib");
        assert_eq!(*router.resolve(Path::new("lib/inner/b.rs")), "lib/inner");
        assert_eq!(*router.resolve(&dir.path().join("lib")), "lib");
        assert_eq!(*router.resolve(Path::new("library/x")), "top");
    }

    #[test]
    fn broken_submodule_falls_back_to_top() {
        let dir = tempfile::tempdir().unwrap();
        write_gitmodules(dir.path(), &["broken"]);
        let (router, _) = router(dir.path());
        assert_eq!(*router.resolve(Path::new("broken/file")), "top");
    }

    #[test]
    fn rebuilds_only_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        write_gitmodules(dir.path(), &["lib"]);
        let file = dir.path().join(".gitmodules");
        bump_mtime(&file, 1_000);
        let (router, opens) = router(dir.path());

        router.resolve(Path::new("lib/a"));
        router.resolve(Path::new("lib/b"));
        assert_eq!(router.rebuild_count(), 1);
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        write_gitmodules(dir.path(), &["lib", "docs"]);
        bump_mtime(&file, 2_000);
        assert_eq!(*router.resolve(Path::new("docs/x")), "docs");
        assert_eq!(router.rebuild_count(), 2);
    }

    #[test]
    fn stale_index_tolerated_until_mtime_changes() {
        let dir = tempfile::tempdir().unwrap();
        write_gitmodules(dir.path(), &["lib"]);
        let file = dir.path().join(".gitmodules");
        bump_mtime(&file, 1_000);
        let (router, _) = router(dir.path());
        router.resolve(Path::new("x"));

        write_gitmodules(dir.path(), &["docs"]);
        bump_mtime(&file, 1_000);
        assert_eq!(*router.resolve(Path::new("docs/x")), "top");

        router.invalidate();
        assert_eq!(*router.resolve(Path::new("docs/x")), "docs");
    }

    #[test]
    fn rebuild_keeps_live_handles() {
        let dir = tempfile::tempdir().unwrap();
        write_gitmodules(dir.path(), &["lib"]);
        let file = dir.path().join(".gitmodules");
        bump_mtime(&file, 1_000);
        let (router, opens) = router(dir.path());
        let first = router.resolve(Path::new("lib/a.rs"));

        write_gitmodules(dir.path(), &["lib", "docs"]);
        bump_mtime(&file, 2_000);
        let second = router.resolve(Path::new("lib/a.rs"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(router.rebuild_count(), 2);
        // lib once, docs once
        assert_eq!(opens.load(Ordering::SeqCst), 2);

        router.invalidate();
        let third = router.resolve(Path::new("lib/a.rs"));
        assert!(Arc::ptr_eq(&first, &third));
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn removed_roots_are_retired() {
        let dir = tempfile::tempdir().unwrap();
        write_gitmodules(dir.path(), &["lib", "docs"]);
        let file = dir.path().join(".gitmodules");
        bump_mtime(&file, 1_000);
        let retired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&retired);
        let (router, _) = router(dir.path());
        let router = router.on_retire(move |_, handle: &String| {
            sink.lock().unwrap().push(handle.clone());
        });
        router.resolve(Path::new("x"));

        write_gitmodules(dir.path(), &["lib"]);
        bump_mtime(&file, 2_000);
        assert_eq!(*router.resolve(Path::new("docs/x")), "top");
        assert_eq!(*retired.lock().unwrap(), vec!["docs".to_string()]);
        assert_eq!(router.live().len(), 1);
    }

    #[test]
    fn live_does_not_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        write_gitmodules(dir.path(), &["lib"]);
        let file = dir.path().join(".gitmodules");
        bump_mtime(&file, 1_000);
        let (router, opens) = router(dir.path());
        assert!(router.live().is_empty());
        router.resolve(Path::new("x"));

        write_gitmodules(dir.path(), &["lib", "docs"]);
        bump_mtime(&file, 2_000);
        let live = router.live();
        assert_eq!(live.len(), 1);
        assert_eq!(router.rebuild_count(), 1);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }
}
