//! engine::watcher
//!
//! Observes the metadata directory for lock files and in-progress markers.
//!
//! # Architecture
//!
//! [`LockTracker`] is the pure state machine: it consumes `notify` events and
//! keeps the set of active lock paths. [`LockWatcher`] wires it to a
//! recursive OS watch on the git dir and turns set transitions into gate and
//! freezer calls:
//!
//! - empty -> non-empty: close the gate, freeze file events
//! - non-empty -> empty: open the gate, thaw file events
//!
//! Several concurrent lock files compose; the gate reopens only when the last
//! one disappears.
//!
//! # Renames
//!
//! A rename is reported either as one event carrying both paths, or as a
//! `From` event followed by a `To` event sharing a tracker id. A tracked
//! `From` is held back until the `To` with the same id arrives, so that
//! `a.lock -> b.lock` never reports an intermediate unlock even when other
//! events land in between. The new name is added before the old one is
//! removed. A `From` still unmatched after [`RENAME_PAIR_WINDOW`] moved out
//! of the watched tree and counts as a removal on the next event.
//!
//! Lock files that exist before [`LockWatcher::start`] are not tracked.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::{debug, warn};

use super::freeze::EventFreezer;
use super::gate::LockGate;

/// How long the `From` half of a rename waits for its `To`.
pub const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(100);

/// Marker files and directories git leaves while an operation is in progress.
pub const STATE_MARKERS: &[&str] = &["rebase-apply", "rebase-merge", "CHERRY_PICK_HEAD", "REVERT_HEAD"];

/// Whether `path` names a lock file or an in-progress marker.
///
/// ```
/// use std::path::Path;
/// use repoflow::engine::watcher::is_lock_path;
///
/// assert!(is_lock_path(Path::new(".git/index.lock")));
/// assert!(is_lock_path(Path::new(".git/rebase-merge")));
/// assert!(!is_lock_path(Path::new(".git/index")));
/// ```
pub fn is_lock_path(path: &Path) -> bool {
    match path.file_name().and_then(OsStr::to_str) {
        Some(name) => name.ends_with(".lock") || STATE_MARKERS.contains(&name),
        None => false,
    }
}

/// Errors from the lock watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// A change of the locked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTransition {
    /// The first lock appeared.
    Locked,
    /// The last lock disappeared.
    Unlocked,
}

/// Set of active lock paths, driven by filesystem events.
#[derive(Debug, Default)]
pub struct LockTracker {
    active: HashSet<PathBuf>,
    pending_from: HashMap<usize, (PathBuf, Instant)>,
}

impl LockTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any lock is active.
    pub fn is_locked(&self) -> bool {
        !self.active.is_empty()
    }

    /// Active lock paths.
    pub fn active(&self) -> impl Iterator<Item = &Path> {
        self.active.iter().map(PathBuf::as_path)
    }

    /// Apply one event, returning the transition it caused.
    pub fn handle(&mut self, event: &Event) -> Option<LockTransition> {
        self.handle_at(event, Instant::now())
    }

    /// [`handle`](Self::handle) with an explicit arrival time.
    pub fn handle_at(&mut self, event: &Event, now: Instant) -> Option<LockTransition> {
        let was_locked = self.is_locked();
        self.expire_pending(now, event.tracker());

        match &event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => match event.tracker() {
                Some(id) => {
                    if let Some(from) = event.paths.first() {
                        self.pending_from.insert(id, (from.clone(), now));
                    }
                }
                None => self.remove_all(&event.paths),
            },
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                self.add_all(&event.paths);
                if let Some((from, _)) = event.tracker().and_then(|id| self.pending_from.remove(&id)) {
                    self.remove(&from);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let Some(id) = event.tracker() {
                    self.pending_from.remove(&id);
                }
                if let [from, to] = event.paths.as_slice() {
                    self.add(to);
                    self.remove(from);
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in &event.paths {
                    if path.exists() {
                        self.add(path);
                    } else {
                        self.remove(path);
                    }
                }
            }
            EventKind::Create(_) => self.add_all(&event.paths),
            EventKind::Remove(_) => self.remove_all(&event.paths),
            _ => {}
        }

        match (was_locked, self.is_locked()) {
            (false, true) => Some(LockTransition::Locked),
            (true, false) => Some(LockTransition::Unlocked),
            _ => None,
        }
    }

    fn add(&mut self, path: &Path) {
        if is_lock_path(path) && self.active.insert(path.to_path_buf()) {
            debug!(path = %path.display(), "lock appeared");
        }
    }

    fn remove(&mut self, path: &Path) {
        if self.active.remove(path) {
            debug!(path = %path.display(), "lock released");
        }
    }

    fn add_all(&mut self, paths: &[PathBuf]) {
        for path in paths {
            self.add(path);
        }
    }

    fn remove_all(&mut self, paths: &[PathBuf]) {
        for path in paths {
            self.remove(path);
        }
    }

    // A `From` whose `To` never came moved out of the watched tree. The
    // event's own tracker id is kept so its pair can still match.
    fn expire_pending(&mut self, now: Instant, keep: Option<usize>) {
        let expired: Vec<usize> = self
            .pending_from
            .iter()
            .filter(|(id, (_, since))| {
                Some(**id) != keep && now.duration_since(*since) >= RENAME_PAIR_WINDOW
            })
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some((path, _)) = self.pending_from.remove(&id) {
                self.remove(&path);
            }
        }
    }
}

#[derive(Debug, Default)]
struct WatchState {
    tracker: LockTracker,
    stopped: bool,
}

/// Recursive watch on a git dir that drives a [`LockGate`].
pub struct LockWatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    state: Arc<Mutex<WatchState>>,
    gate: Arc<LockGate>,
    freezer: Arc<EventFreezer>,
}

impl std::fmt::Debug for LockWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockWatcher")
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl LockWatcher {
    /// Start watching `git_dir`.
    pub fn start(
        git_dir: &Path,
        gate: Arc<LockGate>,
        freezer: Arc<EventFreezer>,
    ) -> Result<Self, WatchError> {
        let state = Arc::new(Mutex::new(WatchState::default()));

        let cb_state = Arc::clone(&state);
        let cb_gate = Arc::clone(&gate);
        let cb_freezer = Arc::clone(&freezer);
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "lock watcher error");
                        return;
                    }
                };
                let mut state = cb_state.lock().unwrap_or_else(|e| e.into_inner());
                if state.stopped {
                    return;
                }
                match state.tracker.handle(&event) {
                    Some(LockTransition::Locked) => {
                        cb_gate.close();
                        cb_freezer.freeze();
                    }
                    Some(LockTransition::Unlocked) => {
                        cb_gate.open();
                        cb_freezer.thaw();
                    }
                    None => {}
                }
            },
            notify::Config::default(),
        )
        .map_err(|source| WatchError::Watch {
            path: git_dir.to_path_buf(),
            source,
        })?;

        watcher
            .watch(git_dir, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Watch {
                path: git_dir.to_path_buf(),
                source,
            })?;
        debug!(path = %git_dir.display(), "lock watcher started");

        Ok(Self {
            watcher: Mutex::new(Some(watcher)),
            state,
            gate,
            freezer,
        })
    }

    /// Whether a lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tracker
            .is_locked()
    }

    /// Stop delivering events and release the OS watch. Idempotent.
    ///
    /// A lock still held at this point is released on the gate and freezer.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.stopped {
            return;
        }
        state.stopped = true;
        if state.tracker.is_locked() {
            self.gate.open();
            self.freezer.thaw();
        }
        drop(state);
        drop(self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take());
        debug!("lock watcher stopped");
    }
}

impl Drop for LockWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
