//! ui::progress
//!
//! Progress reporting for long-running operations.
//!
//! The engine drives a [`ProgressMonitor`] but never owns its lifecycle. Each
//! orchestration opens one task with [`MonitorTask::begin`]; the guard ends
//! it on every exit path.

use std::sync::Mutex;

use tracing::info;

use super::output::Verbosity;
use crate::core::cancel::CancellationToken;

/// Receives progress from an operation.
pub trait ProgressMonitor: Send + Sync {
    /// Start a task of `total_steps` discrete steps.
    fn begin_task(&self, name: &str, total_steps: usize);

    /// Advance by `n` steps.
    fn step(&self, n: usize);

    /// Finish the current task.
    fn end_task(&self);

    /// Informational line.
    fn log(&self, message: &str);

    /// Token the operation polls between discrete steps.
    fn cancellation(&self) -> CancellationToken;

    /// Report a failure.
    fn report_error(&self, message: &str, error: Option<&(dyn std::error::Error + 'static)>);

    /// Report success.
    fn report_success(&self, message: &str);
}

/// Ends a monitor task when dropped.
pub struct MonitorTask<'a> {
    monitor: &'a dyn ProgressMonitor,
}

impl<'a> MonitorTask<'a> {
    /// Begin a task on `monitor`.
    pub fn begin(monitor: &'a dyn ProgressMonitor, name: &str, total_steps: usize) -> Self {
        monitor.begin_task(name, total_steps);
        Self { monitor }
    }

    /// The monitor this task reports to.
    pub fn monitor(&self) -> &'a dyn ProgressMonitor {
        self.monitor
    }
}

impl Drop for MonitorTask<'_> {
    fn drop(&mut self) {
        self.monitor.end_task();
    }
}

/// Monitor that reports nothing and is never cancelled.
#[derive(Debug, Default)]
pub struct SilentMonitor {
    token: CancellationToken,
}

impl ProgressMonitor for SilentMonitor {
    fn begin_task(&self, _name: &str, _total_steps: usize) {}
    fn step(&self, _n: usize) {}
    fn end_task(&self) {}
    fn log(&self, _message: &str) {}
    fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }
    fn report_error(&self, _message: &str, _error: Option<&(dyn std::error::Error + 'static)>) {}
    fn report_success(&self, _message: &str) {}
}

#[derive(Debug)]
struct TaskState {
    name: String,
    done: usize,
    total: usize,
}

/// Monitor that prints to stderr.
#[derive(Debug)]
pub struct TerminalMonitor {
    verbosity: Verbosity,
    token: CancellationToken,
    current: Mutex<Option<TaskState>>,
}

impl TerminalMonitor {
    /// Create a monitor printing at `verbosity`.
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            token: CancellationToken::new(),
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<TaskState>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProgressMonitor for TerminalMonitor {
    fn begin_task(&self, name: &str, total_steps: usize) {
        info!(task = name, total_steps, "task started");
        *self.lock() = Some(TaskState {
            name: name.to_string(),
            done: 0,
            total: total_steps,
        });
    }

    fn step(&self, n: usize) {
        let mut current = self.lock();
        if let Some(task) = current.as_mut() {
            task.done += n;
            if self.verbosity != Verbosity::Quiet && task.total > 0 {
                eprintln!("{} [{}/{}]", task.name, task.done.min(task.total), task.total);
            }
        }
    }

    fn end_task(&self) {
        if let Some(task) = self.lock().take() {
            info!(task = %task.name, steps = task.done, "task finished");
        }
    }

    fn log(&self, message: &str) {
        if self.verbosity == Verbosity::Debug {
            eprintln!("{}", message);
        }
    }

    fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    fn report_error(&self, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        match error {
            Some(err) => super::output::error(&format!("{}: {}", message, err)),
            None => super::output::error(message),
        }
    }

    fn report_success(&self, message: &str) {
        super::output::success(message, self.verbosity);
    }
}

/// Event captured by [`RecordingMonitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Begin { name: String, total: usize },
    Step(usize),
    End,
    Log(String),
    Error(String),
    Success(String),
}

/// Monitor that records every call, for tests and embedding hosts.
///
/// With [`RecordingMonitor::cancel_after_steps`] the token is cancelled once
/// that many steps have been reported.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<MonitorEvent>>,
    token: CancellationToken,
    cancel_after: Option<usize>,
    steps: Mutex<usize>,
}

impl RecordingMonitor {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token after `steps` steps.
    pub fn cancel_after_steps(steps: usize) -> Self {
        Self {
            cancel_after: Some(steps),
            ..Self::default()
        }
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn push(&self, event: MonitorEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl ProgressMonitor for RecordingMonitor {
    fn begin_task(&self, name: &str, total_steps: usize) {
        self.push(MonitorEvent::Begin {
            name: name.to_string(),
            total: total_steps,
        });
    }

    fn step(&self, n: usize) {
        self.push(MonitorEvent::Step(n));
        let mut steps = self.steps.lock().unwrap_or_else(|e| e.into_inner());
        *steps += n;
        if self.cancel_after.is_some_and(|limit| *steps >= limit) {
            self.token.cancel();
        }
    }

    fn end_task(&self) {
        self.push(MonitorEvent::End);
    }

    fn log(&self, message: &str) {
        self.push(MonitorEvent::Log(message.to_string()));
    }

    fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    fn report_error(&self, message: &str, _error: Option<&(dyn std::error::Error + 'static)>) {
        self.push(MonitorEvent::Error(message.to_string()));
    }

    fn report_success(&self, message: &str) {
        self.push(MonitorEvent::Success(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_guard_ends_task_on_drop() {
        let monitor = RecordingMonitor::new();
        {
            let task = MonitorTask::begin(&monitor, "merge", 3);
            task.monitor().step(1);
        }
        assert_eq!(
            monitor.events(),
            vec![
                MonitorEvent::Begin {
                    name: "merge".into(),
                    total: 3
                },
                MonitorEvent::Step(1),
                MonitorEvent::End,
            ]
        );
    }

    #[test]
    fn task_guard_ends_task_on_early_return() {
        fn work(monitor: &dyn ProgressMonitor) -> Result<(), &'static str> {
            let _task = MonitorTask::begin(monitor, "rebase", 2);
            Err("failed")
        }

        let monitor = RecordingMonitor::new();
        assert!(work(&monitor).is_err());
        assert_eq!(monitor.events().last(), Some(&MonitorEvent::End));
    }

    #[test]
    fn cancel_after_steps() {
        let monitor = RecordingMonitor::cancel_after_steps(2);
        let token = monitor.cancellation();
        monitor.step(1);
        assert!(!token.is_cancelled());
        monitor.step(1);
        assert!(token.is_cancelled());
    }

    #[test]
    fn terminal_monitor_tracks_task() {
        let monitor = TerminalMonitor::new(Verbosity::Quiet);
        monitor.begin_task("fetch", 1);
        monitor.step(1);
        monitor.end_task();
        assert!(monitor.lock().is_none());
    }
}
