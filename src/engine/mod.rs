//! engine
//!
//! Serialized access to a working copy and the workflows built on it.
//!
//! # Architecture
//!
//! One [`RepoEngine`] exists per working-copy root. It owns:
//!
//! 1. **Scheduler**: one worker thread per repository handle; every read
//!    and mutation is a task on it ([`scheduler`])
//! 2. **Gate**: closed while another process holds a lock file
//!    ([`gate`], driven by [`watcher`])
//! 3. **Freezer**: reference-counted suspension of the host's file-change
//!    notifications ([`freeze`])
//! 4. **Router**: submodule paths to their own scheduler ([`router`])
//! 5. **Orchestrator**: merge, rebase and switch with stash and conflict
//!    handling ([`orchestrator`], [`conflicts`])
//! 6. **Status cache**: HEAD commit memoized per root ([`status_cache`])
//!
//! ```text
//! caller -> RepoEngine -> Router -> Scheduler(worker) -> Git
//!                             \-> Orchestrator / RetryCoordinator run as one task
//! LockWatcher -> LockGate + EventFreezer
//! ```
//!
//! # Invariants
//!
//! - Only the worker thread touches a repository handle
//! - An orchestrated operation is a single task, so it never interleaves
//!   with other work on the same handle
//! - Replacing the handle ([`RepoEngine::reinitialize`]) stops the watcher
//!   and drains every scheduler before the new handle is opened
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use repoflow::engine::{EngineServices, OperationOptions, RepoEngine};
//! use repoflow::ui::progress::SilentMonitor;
//!
//! let engine = RepoEngine::open(Path::new("."), config, EngineServices::headless())?;
//! let report = engine.merge("origin/main", OperationOptions::default(), Arc::new(SilentMonitor::default()))?;
//! ```

pub mod conflicts;
pub mod freeze;
pub mod gate;
pub mod orchestrator;
pub mod router;
pub mod scheduler;
pub mod status_cache;
pub mod watcher;

pub use conflicts::{ConflictResolver, Resolution};
pub use freeze::{EventFreezer, FileEventBus, FreezeGuard, NullBus};
pub use gate::LockGate;
pub use orchestrator::{
    CoreResult, OperationOptions, OperationOutcome, OperationReport, Orchestrator,
    StashDisposition,
};
pub use router::Router;
pub use scheduler::{Scheduler, SchedulerError};
pub use status_cache::StatusCache;
pub use watcher::{LockWatcher, WatchError};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, CredentialProvider, GitCredentialProvider, RetryCoordinator};
use crate::core::config::Config;
use crate::core::paths::RepoPaths;
use crate::core::types::BranchName;
use crate::git::{
    CommitInfo, ErrorKind, FileStatus, Git, GitBackend, GitError, HasErrorKind,
};
use crate::ui::dispatch::{Dispatcher, InlineDispatcher};
use crate::ui::progress::ProgressMonitor;
use crate::ui::prompts::{CredentialPrompt, Interaction, RetryPrompt, TerminalPrompts};

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Cancelled before the operation started.
    #[error("operation cancelled")]
    Cancelled,

    /// A blocking operation was requested on the UI thread.
    #[error("'{0}' cannot run on the UI thread")]
    OnUiThread(&'static str),
}

impl HasErrorKind for EngineError {
    fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Git(e) => e.kind(),
            EngineError::Scheduler(e) => e.kind(),
            EngineError::Auth(e) => e.kind(),
            EngineError::Watch(_) | EngineError::OnUiThread(_) => ErrorKind::Other,
            EngineError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Host collaborators shared by every component of an engine.
#[derive(Clone)]
pub struct EngineServices {
    /// Runs prompts on the UI thread.
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Stash and conflict questions.
    pub interaction: Arc<dyn Interaction>,
    /// "Try again?" after rejected credentials.
    pub retry_prompt: Arc<dyn RetryPrompt>,
    /// Credentials for remote operations.
    pub credentials: Arc<dyn CredentialProvider>,
    /// The host's file-change notification channel.
    pub bus: Arc<dyn FileEventBus>,
}

impl std::fmt::Debug for EngineServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineServices").finish_non_exhaustive()
    }
}

impl EngineServices {
    /// Terminal prompts on the calling thread, no notification bus.
    pub fn terminal(interactive: bool) -> Self {
        let prompts = Arc::new(TerminalPrompts::new(interactive));
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(InlineDispatcher);
        let credential_prompt: Arc<dyn CredentialPrompt> = prompts.clone();
        Self {
            credentials: Arc::new(GitCredentialProvider::new(
                credential_prompt,
                Arc::clone(&dispatcher),
            )),
            dispatcher,
            interaction: prompts.clone(),
            retry_prompt: prompts,
            bus: Arc::new(NullBus),
        }
    }

    /// Services that never prompt: stashing is declined, conflicts abort,
    /// retries are declined.
    pub fn headless() -> Self {
        Self::terminal(false)
    }
}

/// Status of one repository (top level or submodule).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoStatus {
    /// Working-copy root
    pub root: PathBuf,
    /// Checked-out branch, `None` when detached
    pub branch: Option<BranchName>,
    /// HEAD commit, `None` in an empty repository
    pub head: Option<CommitInfo>,
    /// Requested or changed files
    pub files: Vec<FileStatus>,
}

/// Components rebuilt together whenever the handle is replaced.
struct Parts {
    gate: Arc<LockGate>,
    watcher: Option<LockWatcher>,
    router: Router<Scheduler<Git>>,
    orchestrator: Arc<Orchestrator>,
}

/// Per-root engine.
pub struct RepoEngine {
    paths: RepoPaths,
    config: Config,
    services: EngineServices,
    freezer: Arc<EventFreezer>,
    status: Arc<StatusCache>,
    retry: RetryCoordinator,
    parts: Parts,
}

impl std::fmt::Debug for RepoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoEngine")
            .field("root", &self.paths.work_dir())
            .field("gate_open", &self.parts.gate.is_open())
            .finish()
    }
}

impl RepoEngine {
    /// Open the repository containing `path`.
    pub fn open(path: &Path, config: Config, services: EngineServices) -> Result<Self, EngineError> {
        let git = Git::open(path)?;
        let paths = git.paths().clone();
        let freezer = Arc::new(EventFreezer::new(Arc::clone(&services.bus)));
        let parts = assemble(git, &config, &services, &freezer)?;
        let retry = RetryCoordinator::new(
            Arc::clone(&services.credentials),
            Arc::clone(&services.retry_prompt),
            Arc::clone(&services.dispatcher),
        )
        .with_initial_kind(config.initial_credential_kind());

        info!(root = %paths.work_dir().display(), "repository opened");
        Ok(Self {
            paths,
            config,
            services,
            freezer,
            status: Arc::new(StatusCache::new()),
            retry,
            parts,
        })
    }

    /// Clone `url` into `dest` with credential retry, then open it.
    ///
    /// The clone runs on the calling thread, which must not be the UI thread.
    pub fn clone_from(
        url: &str,
        dest: &Path,
        config: Config,
        services: EngineServices,
    ) -> Result<Self, EngineError> {
        if services.dispatcher.is_ui_thread() {
            return Err(EngineError::OnUiThread("clone"));
        }
        let retry = RetryCoordinator::new(
            Arc::clone(&services.credentials),
            Arc::clone(&services.retry_prompt),
            Arc::clone(&services.dispatcher),
        )
        .with_initial_kind(config.initial_credential_kind());

        info!(url, dest = %dest.display(), "cloning");
        let cloned = retry.run_with_retry(|kind| Git::clone_into(url, dest, &mut retry.source(kind)))?;
        drop(cloned);
        Self::open(dest, config, services)
    }

    /// Repository layout.
    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The lock gate shared by this root's schedulers.
    pub fn gate(&self) -> &Arc<LockGate> {
        &self.parts.gate
    }

    /// The freezer in front of the host's notification bus.
    pub fn freezer(&self) -> &Arc<EventFreezer> {
        &self.freezer
    }

    /// Whether the lock watcher is running.
    pub fn is_watching(&self) -> bool {
        self.parts.watcher.is_some()
    }

    /// Options from configuration.
    pub fn default_options(&self) -> OperationOptions {
        OperationOptions {
            save_local_changes: self.config.save_local_changes(),
            update_submodules: self.config.update_submodules(),
        }
    }

    /// Scheduler of the top-level repository.
    pub fn scheduler(&self) -> &Arc<Scheduler<Git>> {
        self.parts.router.top()
    }

    /// Scheduler of the (sub)repository owning `path`.
    pub fn scheduler_for(&self, path: &Path) -> Arc<Scheduler<Git>> {
        self.parts.router.resolve(path)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Merge `target` into HEAD.
    pub fn merge(
        &self,
        target: &str,
        options: OperationOptions,
        monitor: Arc<dyn ProgressMonitor>,
    ) -> Result<OperationReport, EngineError> {
        let target = target.to_string();
        self.orchestrate("merge", monitor, move |orch, git, monitor| {
            orch.merge(git, &target, options, monitor)
        })
    }

    /// Rebase HEAD onto `target`.
    pub fn rebase(
        &self,
        target: &str,
        options: OperationOptions,
        monitor: Arc<dyn ProgressMonitor>,
    ) -> Result<OperationReport, EngineError> {
        let target = target.to_string();
        self.orchestrate("rebase", monitor, move |orch, git, monitor| {
            orch.rebase(git, &target, options, monitor)
        })
    }

    /// Switch to `branch`.
    pub fn switch(
        &self,
        branch: &str,
        options: OperationOptions,
        monitor: Arc<dyn ProgressMonitor>,
    ) -> Result<OperationReport, EngineError> {
        let branch = branch.to_string();
        self.orchestrate("switch", monitor, move |orch, git, monitor| {
            orch.switch(git, &branch, options, monitor)
        })
    }

    fn orchestrate<F>(
        &self,
        name: &'static str,
        monitor: Arc<dyn ProgressMonitor>,
        op: F,
    ) -> Result<OperationReport, EngineError>
    where
        F: FnOnce(&Orchestrator, &mut Git, &dyn ProgressMonitor) -> Result<OperationReport, GitError>
            + Send
            + 'static,
    {
        let token = monitor.cancellation();
        let orch = Arc::clone(&self.parts.orchestrator);
        let result = self
            .scheduler()
            .run_gated(name, &token, move |git: &mut Git| op(&orch, git, monitor.as_ref()))?;
        match result {
            Some(report) => Ok(report?),
            None => {
                debug!(operation = name, "cancelled while waiting");
                Ok(OperationReport::cancelled())
            }
        }
    }

    /// Status of `paths`, grouped by owning repository.
    ///
    /// With no paths, reports every changed file of the top-level repository.
    pub fn status(&self, paths: &[PathBuf]) -> Result<Vec<RepoStatus>, EngineError> {
        let mut groups: Vec<(Arc<Scheduler<Git>>, Vec<PathBuf>)> = Vec::new();
        if paths.is_empty() {
            groups.push((Arc::clone(self.scheduler()), Vec::new()));
        }
        for path in paths {
            let absolute = self.paths.absolute(path);
            let scheduler = self.scheduler_for(&absolute);
            match groups.iter_mut().find(|(s, _)| Arc::ptr_eq(s, &scheduler)) {
                Some((_, group)) => group.push(absolute),
                None => groups.push((scheduler, vec![absolute])),
            }
        }

        let mut reports = Vec::with_capacity(groups.len());
        for (scheduler, group) in groups {
            let cache = Arc::clone(&self.status);
            let report = scheduler.run("status", move |git: &mut Git| read_status(git, &cache, &group))??;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Fetch from `remote`.
    pub fn fetch(&self, remote: &str, monitor: Arc<dyn ProgressMonitor>) -> Result<(), EngineError> {
        let remote = remote.to_string();
        self.remote_operation("fetch", monitor, move |retry, git| {
            retry.run_with_retry(|kind| git.fetch(&remote, &mut retry.source(kind)))
        })
    }

    /// Push `refspecs` to `remote`.
    pub fn push(
        &self,
        remote: &str,
        refspecs: Vec<String>,
        monitor: Arc<dyn ProgressMonitor>,
    ) -> Result<(), EngineError> {
        let remote = remote.to_string();
        self.remote_operation("push", monitor, move |retry, git| {
            retry.run_with_retry(|kind| git.push(&remote, &refspecs, &mut retry.source(kind)))
        })
    }

    fn remote_operation<F>(
        &self,
        name: &'static str,
        monitor: Arc<dyn ProgressMonitor>,
        op: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(&RetryCoordinator, &mut Git) -> Result<(), AuthError> + Send + 'static,
    {
        let token = monitor.cancellation();
        let retry = self.retry.clone();
        let task_monitor = Arc::clone(&monitor);
        let result = self.scheduler().run_gated(name, &token, move |git: &mut Git| {
            let _task = crate::ui::progress::MonitorTask::begin(task_monitor.as_ref(), name, 1);
            op(&retry, git)
        })?;
        match result {
            Some(Ok(())) => {
                monitor.report_success(&format!("{} completed", name));
                Ok(())
            }
            Some(Err(e)) => {
                monitor.report_error(&format!("{} failed", name), Some(&e));
                Err(e.into())
            }
            None => Err(EngineError::Cancelled),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Replace the repository handle.
    ///
    /// Stops the watcher and drains every scheduler first; only then is the
    /// repository reopened and the components rebuilt.
    pub fn reinitialize(&mut self) -> Result<(), EngineError> {
        info!(root = %self.paths.work_dir().display(), "reinitializing repository handle");
        self.shutdown();
        self.status.invalidate(self.paths.work_dir());
        let git = Git::open_exact(self.paths.work_dir())?;
        self.paths = git.paths().clone();
        self.parts = assemble(git, &self.config, &self.services, &self.freezer)?;
        Ok(())
    }

    /// Stop the watcher and drain every scheduler. Idempotent.
    pub fn shutdown(&self) {
        if let Some(watcher) = &self.parts.watcher {
            watcher.stop();
        }
        for (root, scheduler) in self.parts.router.live() {
            debug!(root = %root.display(), "shutting down submodule worker");
            scheduler.shutdown();
        }
        self.parts.router.top().shutdown();
    }
}

impl Drop for RepoEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn assemble(
    git: Git,
    config: &Config,
    services: &EngineServices,
    freezer: &Arc<EventFreezer>,
) -> Result<Parts, EngineError> {
    let paths = git.paths().clone();
    let gate = Arc::new(LockGate::with_poll_interval(config.gate_poll_interval()));

    let watcher = if config.watcher_enabled() {
        Some(LockWatcher::start(
            paths.git_dir(),
            Arc::clone(&gate),
            Arc::clone(freezer),
        )?)
    } else {
        warn!("lock watcher disabled by configuration");
        None
    };

    let name = worker_name(paths.work_dir());
    let top = Arc::new(Scheduler::new(
        &name,
        git,
        Arc::clone(&gate),
        Arc::clone(&services.dispatcher),
    )?);
    let shutdown = top.shutdown_token();

    let sub_gate = Arc::clone(&gate);
    let sub_dispatcher = Arc::clone(&services.dispatcher);
    let router = Router::new(paths.work_dir(), top, move |root: &Path| {
        let git = Git::open_exact(root)?;
        Ok(Scheduler::new(
            &worker_name(root),
            git,
            Arc::clone(&sub_gate),
            Arc::clone(&sub_dispatcher),
        )?)
    })
    .on_retire(|root: &Path, scheduler: &Scheduler<Git>| {
        debug!(root = %root.display(), "submodule removed; draining its worker");
        scheduler.shutdown();
    });

    let resolver = ConflictResolver::new(
        Arc::clone(&services.dispatcher),
        Arc::clone(&services.interaction),
    );
    let orchestrator = Orchestrator::new(Arc::clone(&gate), Arc::clone(freezer), resolver)
        .with_stash_message(config.stash_message())
        .with_shutdown(shutdown);

    Ok(Parts {
        gate,
        watcher,
        router,
        orchestrator: Arc::new(orchestrator),
    })
}

fn worker_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

fn read_status(
    git: &mut Git,
    cache: &StatusCache,
    paths: &[PathBuf],
) -> Result<RepoStatus, GitError> {
    let root = git.paths().work_dir().to_path_buf();
    let head = match git.head_commit()? {
        Some(oid) => Some(cache.head_info(&root, &oid, |oid| git.commit_info(oid))?),
        None => None,
    };
    Ok(RepoStatus {
        branch: git.current_branch()?,
        files: git.file_statuses(paths)?,
        head,
        root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_kinds() {
        assert_eq!(EngineError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            EngineError::from(GitError::ConfigMissing {
                message: "x".into()
            })
            .kind(),
            ErrorKind::ConfigMissing
        );
        assert_eq!(
            EngineError::from(AuthError::Cancelled).kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            EngineError::from(SchedulerError::Cancelled).kind(),
            ErrorKind::Cancelled
        );
    }

    #[test]
    fn worker_names_use_last_component() {
        assert_eq!(worker_name(Path::new("/src/project")), "project");
        assert_eq!(worker_name(Path::new("/")), "/");
    }

    mod submodules {
        use super::*;
        use crate::core::config::{RepoConfig, WatcherConfig};
        use std::fs;
        use std::time::{Duration, SystemTime};

        fn quiet() -> Config {
            Config {
                repo: Some(RepoConfig {
                    watcher: Some(WatcherConfig {
                        enabled: Some(false),
                    }),
                    ..RepoConfig::default()
                }),
                ..Config::default()
            }
        }

        fn declare(dir: &Path, paths: &[&str], secs: u64) {
            let mut body = String::new();
            for p in paths {
                body.push_str(&format!("[submodule \"{p}\"]\n\tpath = {p}\n\turl = ../{p}\n"));
            }
            let file = dir.join(".gitmodules");
            fs::write(&file, body).unwrap();
            fs::File::options()
                .write(true)
                .open(&file)
                .unwrap()
                .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
                .unwrap();
        }

        fn workspace() -> tempfile::TempDir {
            let dir = tempfile::tempdir().unwrap();
            git2::Repository::init(dir.path()).unwrap();
            git2::Repository::init(dir.path().join("lib")).unwrap();
            git2::Repository::init(dir.path().join("docs")).unwrap();
            declare(dir.path(), &["lib", "docs"], 1_000);
            dir
        }

        fn disposed(scheduler: &Scheduler<Git>) -> bool {
            matches!(scheduler.run("ping", |_| ()), Err(SchedulerError::Disposed))
        }

        #[test]
        fn shutdown_does_not_rebuild() {
            let dir = workspace();
            let engine = RepoEngine::open(dir.path(), quiet(), EngineServices::headless()).unwrap();
            let lib = engine.scheduler_for(Path::new("lib/file"));
            assert!(!Arc::ptr_eq(&lib, engine.scheduler()));
            assert_eq!(engine.parts.router.rebuild_count(), 1);

            declare(dir.path(), &["lib", "docs"], 2_000);
            engine.shutdown();

            assert_eq!(engine.parts.router.rebuild_count(), 1);
            assert!(disposed(&lib));
            assert!(disposed(engine.scheduler()));
        }

        #[test]
        fn rebuild_shares_one_worker_per_root() {
            let dir = workspace();
            let engine = RepoEngine::open(dir.path(), quiet(), EngineServices::headless()).unwrap();
            let lib = engine.scheduler_for(Path::new("lib/file"));
            let docs = engine.scheduler_for(Path::new("docs/file"));

            declare(dir.path(), &["lib"], 2_000);
            let again = engine.scheduler_for(Path::new("lib/other"));

            assert!(Arc::ptr_eq(&lib, &again));
            assert!(!disposed(&lib));
            assert!(disposed(&docs));
            assert!(Arc::ptr_eq(
                &engine.scheduler_for(Path::new("docs/file")),
                engine.scheduler()
            ));
        }
    }
}
