//! engine::scheduler
//!
//! Exclusive, ordered execution of work against one repository handle.
//!
//! # Architecture
//!
//! A [`Scheduler`] owns a resource (normally a [`crate::git::Git`]) on a
//! single worker thread. Every access is a closure sent over one queue, so
//! accesses run one at a time in submission order and the resource never
//! crosses threads.
//!
//! Submission modes:
//!
//! - [`Scheduler::spawn`]: fire-and-forget; failures and panics are logged
//! - [`Scheduler::run`]: block the caller until the task finishes
//! - [`Scheduler::run_async`]: a future resolved by the worker
//! - [`Scheduler::run_gated`]: refuse the UI thread, wait for the
//!   [`LockGate`] before enqueuing, and treat a cancelled wait as "nothing
//!   happened"
//!
//! The worker also waits for the gate before each task, so work already
//! queued does not start while an external process holds a lock.
//!
//! # Failure semantics
//!
//! A panic inside a blocking task is caught on the worker and resumed on the
//! caller's thread with the original payload. Fire-and-forget failures are
//! logged at `error`. The worker never dies because of a task.
//!
//! # Disposal
//!
//! [`Scheduler::shutdown`] stops accepting work, abandons gate waits, lets
//! the queue drain, joins the worker, and drops the resource. Dropping the
//! scheduler does the same.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use repoflow::engine::gate::LockGate;
//! use repoflow::engine::scheduler::Scheduler;
//! use repoflow::ui::dispatch::InlineDispatcher;
//!
//! let scheduler = Scheduler::new("demo", Vec::<u32>::new(), Arc::new(LockGate::new()), Arc::new(InlineDispatcher)).unwrap();
//! scheduler.run("push", |v| v.push(1)).unwrap();
//! assert_eq!(scheduler.run("len", |v| v.len()).unwrap(), 1);
//! ```

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use thiserror::Error;
use tracing::{debug, debug_span, error, trace};
use uuid::Uuid;

use super::gate::LockGate;
use crate::core::cancel::{CancellationToken, CANCEL_POLL_INTERVAL};
use crate::git::{ErrorKind, HasErrorKind};
use crate::ui::dispatch::Dispatcher;

/// Errors from submitting work.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler has shut down.
    #[error("scheduler has been disposed")]
    Disposed,

    /// A gated submission was made from the UI thread.
    #[error("blocking git operation requested on the UI thread")]
    OnUiThread,

    /// A blocking submission was made from the worker itself.
    #[error("nested blocking submission from the git worker")]
    Reentrant,

    /// The task was cancelled before it started.
    #[error("operation cancelled before it started")]
    Cancelled,

    /// The worker thread could not be started.
    #[error("failed to start git worker: {0}")]
    WorkerStart(String),
}

impl HasErrorKind for SchedulerError {
    fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }
}

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const ABANDONED: u8 = 2;

/// Claim on a queued task shared by the caller and the worker.
///
/// Exactly one side wins: the worker moves it to started, or a cancelled
/// caller moves it to abandoned.
#[derive(Debug, Clone)]
struct Ticket {
    state: Arc<AtomicU8>,
    token: Option<CancellationToken>,
}

impl Ticket {
    fn new(token: Option<CancellationToken>) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
            token,
        }
    }

    fn token_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn is_abandoned(&self) -> bool {
        self.token_cancelled() || self.state.load(Ordering::SeqCst) == ABANDONED
    }

    fn abandon(&self) -> bool {
        self.state
            .compare_exchange(PENDING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn start(&self) -> bool {
        if self.token_cancelled() {
            self.abandon();
            return false;
        }
        self.state
            .compare_exchange(PENDING, STARTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

struct Job<R> {
    id: Uuid,
    name: String,
    ticket: Ticket,
    work: Box<dyn FnOnce(&mut R) + Send + 'static>,
}

/// Single-worker queue owning a resource.
pub struct Scheduler<R: Send + 'static> {
    name: String,
    sender: Mutex<Option<Sender<Job<R>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    gate: Arc<LockGate>,
    dispatcher: Arc<dyn Dispatcher>,
    shutdown: CancellationToken,
    disposed: AtomicBool,
}

impl<R: Send + 'static> std::fmt::Debug for Scheduler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl<R: Send + 'static> Scheduler<R> {
    /// Start a worker named `git-worker:<name>` owning `resource`.
    pub fn new(
        name: &str,
        resource: R,
        gate: Arc<LockGate>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, SchedulerError> {
        let (tx, rx) = mpsc::channel::<Job<R>>();
        let shutdown = CancellationToken::new();

        let worker_gate = Arc::clone(&gate);
        let worker_shutdown = shutdown.clone();
        let handle = thread::Builder::new()
            .name(format!("git-worker:{}", name))
            .spawn(move || work_loop(resource, rx, &worker_gate, &worker_shutdown))
            .map_err(|e| SchedulerError::WorkerStart(e.to_string()))?;

        debug!(scheduler = name, "git worker started");
        Ok(Self {
            name: name.to_string(),
            worker_id: handle.thread().id(),
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
            gate,
            dispatcher,
            shutdown,
            disposed: AtomicBool::new(false),
        })
    }

    /// Name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The gate this scheduler waits on.
    pub fn gate(&self) -> &Arc<LockGate> {
        &self.gate
    }

    /// Whether [`Scheduler::shutdown`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Whether the calling thread is this scheduler's worker.
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    fn enqueue(
        &self,
        name: &str,
        ticket: Ticket,
        work: Box<dyn FnOnce(&mut R) + Send + 'static>,
    ) -> Result<(), SchedulerError> {
        if self.is_disposed() {
            return Err(SchedulerError::Disposed);
        }
        let job = Job {
            id: Uuid::new_v4(),
            name: name.to_string(),
            ticket,
            work,
        };
        trace!(scheduler = %self.name, task = name, id = %job.id, "enqueue");
        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let sender = guard.as_ref().ok_or(SchedulerError::Disposed)?;
        sender.send(job).map_err(|_| SchedulerError::Disposed)
    }

    fn check_blocking_caller(&self) -> Result<(), SchedulerError> {
        if self.is_worker_thread() {
            return Err(SchedulerError::Reentrant);
        }
        if self.is_disposed() {
            return Err(SchedulerError::Disposed);
        }
        Ok(())
    }

    fn submit_blocking<T, F>(
        &self,
        name: &str,
        token: Option<CancellationToken>,
        f: F,
    ) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut R) -> T + Send + 'static,
    {
        self.check_blocking_caller()?;
        let ticket = Ticket::new(token);
        let (tx, rx) = mpsc::sync_channel::<thread::Result<T>>(1);
        self.enqueue(
            name,
            ticket.clone(),
            Box::new(move |resource| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(resource)));
                let _ = tx.send(outcome);
            }),
        )?;
        wait_for(rx, &ticket)
    }

    /// Run `f` on the worker and block until it returns.
    ///
    /// A panic in `f` is resumed on the calling thread.
    pub fn run<T, F>(&self, name: &str, f: F) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut R) -> T + Send + 'static,
    {
        self.submit_blocking(name, None, f)
    }

    /// [`Scheduler::run`] that gives up with [`SchedulerError::Cancelled`]
    /// if `token` is cancelled before the task starts.
    pub fn run_cancellable<T, F>(
        &self,
        name: &str,
        token: &CancellationToken,
        f: F,
    ) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut R) -> T + Send + 'static,
    {
        self.submit_blocking(name, Some(token.clone()), f)
    }

    /// Run `f` on the worker and resolve the returned future with its result.
    ///
    /// The task is queued before this returns; the future only waits.
    pub fn run_async<T, F>(
        &self,
        name: &str,
        f: F,
    ) -> impl Future<Output = Result<T, SchedulerError>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce(&mut R) -> T + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel::<thread::Result<T>>();
        let enqueued = self.enqueue(
            name,
            Ticket::new(None),
            Box::new(move |resource| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(resource)));
                let _ = tx.send(outcome);
            }),
        );
        async move {
            enqueued?;
            match rx.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(payload)) => panic::resume_unwind(payload),
                Err(_) => Err(SchedulerError::Disposed),
            }
        }
    }

    /// Queue `f` without waiting. Errors and panics are logged.
    pub fn spawn<E, F>(&self, name: &str, f: F) -> Result<(), SchedulerError>
    where
        E: std::fmt::Display,
        F: FnOnce(&mut R) -> Result<(), E> + Send + 'static,
    {
        self.spawn_inner(name, None, f)
    }

    /// [`Scheduler::spawn`] skipped if `token` is cancelled before it starts.
    pub fn spawn_with<E, F>(
        &self,
        name: &str,
        token: &CancellationToken,
        f: F,
    ) -> Result<(), SchedulerError>
    where
        E: std::fmt::Display,
        F: FnOnce(&mut R) -> Result<(), E> + Send + 'static,
    {
        self.spawn_inner(name, Some(token.clone()), f)
    }

    fn spawn_inner<E, F>(
        &self,
        name: &str,
        token: Option<CancellationToken>,
        f: F,
    ) -> Result<(), SchedulerError>
    where
        E: std::fmt::Display,
        F: FnOnce(&mut R) -> Result<(), E> + Send + 'static,
    {
        let task = name.to_string();
        self.enqueue(
            name,
            Ticket::new(token),
            Box::new(move |resource| {
                match panic::catch_unwind(AssertUnwindSafe(|| f(resource))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(task = %task, error = %e, "background git task failed"),
                    Err(payload) => {
                        error!(task = %task, panic = panic_message(&payload), "background git task panicked")
                    }
                }
            }),
        )
    }

    /// Blocking submission for UI-driven operations.
    ///
    /// Refuses the UI thread, then waits for the gate before enqueuing.
    /// Returns `Ok(None)` when `token` is cancelled before the task starts.
    pub fn run_gated<T, F>(
        &self,
        name: &str,
        token: &CancellationToken,
        f: F,
    ) -> Result<Option<T>, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut R) -> T + Send + 'static,
    {
        if self.dispatcher.is_ui_thread() {
            return Err(SchedulerError::OnUiThread);
        }
        self.check_blocking_caller()?;

        let opened = self
            .gate
            .wait_open(|| token.is_cancelled() || self.shutdown.is_cancelled());
        if !opened && token.is_cancelled() {
            debug!(scheduler = %self.name, task = name, "gate wait cancelled");
            return Ok(None);
        }

        match self.submit_blocking(name, Some(token.clone()), f) {
            Ok(value) => Ok(Some(value)),
            Err(SchedulerError::Cancelled) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Token cancelled when shutdown begins.
    ///
    /// Long-running tasks poll it in their own waits so a shutdown is not
    /// held up behind them.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting work, drain the queue, and release the resource.
    ///
    /// Idempotent. Called from the worker itself, it does not join.
    pub fn shutdown(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!(scheduler = %self.name, "shutting down git worker");
        }
        self.shutdown.cancel();
        drop(
            self.sender
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take(),
        );
        if self.is_worker_thread() {
            return;
        }
        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(scheduler = %self.name, "git worker panicked");
            }
        }
    }
}

impl<R: Send + 'static> Drop for Scheduler<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn work_loop<R>(mut resource: R, rx: Receiver<Job<R>>, gate: &LockGate, shutdown: &CancellationToken) {
    for job in rx {
        gate.wait_open(|| shutdown.is_cancelled() || job.ticket.is_abandoned());
        if !job.ticket.start() {
            debug!(task = %job.name, id = %job.id, "skipping cancelled task");
            continue;
        }
        let span = debug_span!("task", name = %job.name, id = %job.id);
        let _enter = span.enter();
        trace!("running");
        (job.work)(&mut resource);
    }
    debug!("git worker drained");
    drop(resource);
}

fn wait_for<T>(rx: Receiver<thread::Result<T>>, ticket: &Ticket) -> Result<T, SchedulerError> {
    loop {
        match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(RecvTimeoutError::Timeout) => {
                if ticket.token_cancelled() && ticket.abandon() {
                    return Err(SchedulerError::Cancelled);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(if ticket.is_abandoned() {
                    SchedulerError::Cancelled
                } else {
                    SchedulerError::Disposed
                });
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic".to_string()
    }
}
