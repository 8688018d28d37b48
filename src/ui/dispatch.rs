//! ui::dispatch
//!
//! Marshalling calls onto the host's UI thread.
//!
//! # Design
//!
//! Prompts that the engine raises from background threads (retry, conflict
//! resolution, stash confirmation) must run on the UI thread while the
//! background thread blocks for the answer. A [`Dispatcher`] does exactly
//! that and also answers two questions the engine needs to avoid deadlock:
//! is the current thread the UI thread, and is the UI still alive.
//!
//! - [`InlineDispatcher`]: no UI thread at all (CLI); jobs run in place
//! - [`EventLoopDispatcher`]: a dedicated event-loop thread, the shape of a
//!   GUI host

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use thiserror::Error;
use tracing::{debug, error};

/// A job for the UI thread.
pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Errors from dispatching onto the UI thread.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("UI event loop has shut down")]
    Closed,

    #[error("UI callback panicked")]
    Panicked,
}

/// Runs jobs on the UI thread.
pub trait Dispatcher: Send + Sync {
    /// Whether the calling thread is the UI thread.
    fn is_ui_thread(&self) -> bool;

    /// Whether the UI can still accept jobs.
    fn is_alive(&self) -> bool;

    /// Run `job` on the UI thread and block until it finishes.
    ///
    /// Called from the UI thread itself, the job runs inline.
    fn invoke(&self, job: UiJob) -> Result<(), DispatchError>;
}

/// Run `f` on the UI thread and return its result.
pub fn invoke_sync<T, F>(dispatcher: &dyn Dispatcher, f: F) -> Result<T, DispatchError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    dispatcher.invoke(Box::new(move || {
        let _ = tx.send(f());
    }))?;
    rx.recv().map_err(|_| DispatchError::Panicked)
}

/// Dispatcher for hosts without a UI thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn is_ui_thread(&self) -> bool {
        false
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn invoke(&self, job: UiJob) -> Result<(), DispatchError> {
        job();
        Ok(())
    }
}

type Envelope = (UiJob, Option<SyncSender<()>>);

/// Dispatcher backed by a dedicated event-loop thread.
///
/// ```
/// use repoflow::ui::dispatch::{invoke_sync, Dispatcher, EventLoopDispatcher};
///
/// let ui = EventLoopDispatcher::spawn("ui").unwrap();
/// let on_ui = invoke_sync(&ui, || std::thread::current().name().map(String::from)).unwrap();
/// assert_eq!(on_ui.as_deref(), Some("ui"));
/// ui.shutdown();
/// assert!(!ui.is_alive());
/// ```
pub struct EventLoopDispatcher {
    sender: Mutex<Option<Sender<Envelope>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    alive: Arc<AtomicBool>,
}

impl std::fmt::Debug for EventLoopDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopDispatcher")
            .field("thread_id", &self.thread_id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl EventLoopDispatcher {
    /// Start an event loop on a new thread called `name`.
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Envelope>();
        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = Arc::clone(&alive);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for (job, done) in rx {
                    match panic::catch_unwind(AssertUnwindSafe(job)) {
                        Ok(()) => {
                            if let Some(done) = done {
                                let _ = done.send(());
                            }
                        }
                        Err(_) => error!("UI job panicked"),
                    }
                }
                loop_alive.store(false, Ordering::SeqCst);
                debug!("UI event loop stopped");
            })?;

        Ok(Self {
            thread_id: handle.thread().id(),
            sender: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            alive,
        })
    }

    fn send(&self, envelope: Envelope) -> Result<(), DispatchError> {
        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let sender = guard.as_ref().ok_or(DispatchError::Closed)?;
        sender.send(envelope).map_err(|_| DispatchError::Closed)
    }

    /// Queue `job` without waiting for it.
    pub fn post(&self, job: UiJob) -> Result<(), DispatchError> {
        self.send((job, None))
    }

    /// Stop accepting jobs, let queued ones finish, and join the loop.
    ///
    /// Idempotent. Called from the loop itself, it does not join.
    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        drop(
            self.sender
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take(),
        );
        if self.is_ui_thread() {
            return;
        }
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Dispatcher for EventLoopDispatcher {
    fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn invoke(&self, job: UiJob) -> Result<(), DispatchError> {
        if self.is_ui_thread() {
            job();
            return Ok(());
        }
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        self.send((job, Some(done_tx)))?;
        done_rx.recv().map_err(|_| DispatchError::Panicked)
    }
}

impl Drop for EventLoopDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod inline {
        use super::*;

        #[test]
        fn runs_in_place() {
            let d = InlineDispatcher;
            let here = thread::current().id();
            let there = invoke_sync(&d, move || thread::current().id()).unwrap();
            assert_eq!(here, there);
            assert!(!d.is_ui_thread());
            assert!(d.is_alive());
        }
    }

    mod event_loop {
        use super::*;

        #[test]
        fn invoke_runs_on_loop_thread() {
            let ui = EventLoopDispatcher::spawn("test-ui").unwrap();
            let ran_on_ui = {
                let ui_ref = Arc::new(ui);
                let target = Arc::clone(&ui_ref);
                let result = invoke_sync(ui_ref.as_ref(), move || target.is_ui_thread()).unwrap();
                ui_ref.shutdown();
                result
            };
            assert!(ran_on_ui);
        }

        #[test]
        fn nested_invoke_from_ui_thread_runs_inline() {
            let ui = Arc::new(EventLoopDispatcher::spawn("test-ui").unwrap());
            let inner = Arc::clone(&ui);
            let value = invoke_sync(ui.as_ref(), move || {
                invoke_sync(inner.as_ref(), || 7).unwrap()
            })
            .unwrap();
            assert_eq!(value, 7);
            ui.shutdown();
        }

        #[test]
        fn invoke_after_shutdown_is_closed() {
            let ui = EventLoopDispatcher::spawn("test-ui").unwrap();
            ui.shutdown();
            ui.shutdown();
            assert!(matches!(
                ui.invoke(Box::new(|| {})),
                Err(DispatchError::Closed)
            ));
        }

        #[test]
        fn panicking_job_reports_and_loop_survives() {
            let ui = EventLoopDispatcher::spawn("test-ui").unwrap();
            let result = invoke_sync(&ui, || -> u8 { panic!("boom") });
            assert!(matches!(result, Err(DispatchError::Panicked)));
            assert_eq!(invoke_sync(&ui, || 1).unwrap(), 1);
            ui.shutdown();
        }
    }
}
