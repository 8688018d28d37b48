//! engine::gate
//!
//! Binary open/closed gate in front of the scheduler.
//!
//! # Architecture
//!
//! The [`LockGate`] is closed while an external git process holds a lock
//! file or leaves an in-progress marker in the metadata directory. The lock
//! watcher is the only writer; the scheduler and the orchestrator wait on it
//! before touching the repository.
//!
//! Waiting is cancellable. Waiters sleep on a condition variable and wake
//! every poll interval to re-check their cancellation predicate, so a
//! cancelled wait returns promptly without the canceller knowing who waits.
//!
//! # Invariants
//!
//! - One gate per repository root, shared by that root's schedulers
//! - A cancelled wait is not an error; it reports `false`

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::core::cancel::{CancellationToken, CANCEL_POLL_INTERVAL};

/// Gate closed by external lock holders.
///
/// ```
/// use repoflow::engine::gate::LockGate;
///
/// let gate = LockGate::new();
/// assert!(gate.wait_open(|| false));
/// gate.close();
/// assert!(!gate.wait_open(|| true));
/// ```
#[derive(Debug)]
pub struct LockGate {
    open: Mutex<bool>,
    changed: Condvar,
    poll: Duration,
}

impl Default for LockGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LockGate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self::with_poll_interval(CANCEL_POLL_INTERVAL)
    }

    /// Create an open gate that re-checks cancellation every `poll`.
    pub fn with_poll_interval(poll: Duration) -> Self {
        Self {
            open: Mutex::new(true),
            changed: Condvar::new(),
            poll,
        }
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        self.open.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the gate is currently open.
    pub fn is_open(&self) -> bool {
        *self.state()
    }

    /// Open the gate and wake all waiters.
    pub fn open(&self) {
        let mut open = self.state();
        if !*open {
            *open = true;
            debug!("lock gate opened");
        }
        self.changed.notify_all();
    }

    /// Close the gate.
    pub fn close(&self) {
        let mut open = self.state();
        if *open {
            *open = false;
            debug!("lock gate closed");
        }
    }

    /// Block until the gate is open or `cancelled` returns true.
    ///
    /// Returns `true` when the gate is open.
    pub fn wait_open(&self, cancelled: impl Fn() -> bool) -> bool {
        let mut open = self.state();
        loop {
            if *open {
                return true;
            }
            if cancelled() {
                return false;
            }
            open = match self.changed.wait_timeout(open, self.poll) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// [`LockGate::wait_open`] against a token.
    pub fn wait_open_token(&self, token: &CancellationToken) -> bool {
        self.wait_open(|| token.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn starts_open() {
        let gate = LockGate::new();
        assert!(gate.is_open());
        assert!(gate.wait_open(|| true));
    }

    #[test]
    fn close_and_open() {
        let gate = LockGate::new();
        gate.close();
        assert!(!gate.is_open());
        gate.open();
        assert!(gate.is_open());
    }

    #[test]
    fn waiter_released_by_open() {
        let gate = Arc::new(LockGate::new());
        gate.close();
        let opener = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            opener.open();
        });
        assert!(gate.wait_open(|| false));
        handle.join().unwrap();
    }

    #[test]
    fn cancelled_wait_returns_false() {
        let gate = LockGate::new();
        gate.close();
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            canceller.cancel();
        });
        let start = Instant::now();
        assert!(!gate.wait_open_token(&token));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!gate.is_open());
        handle.join().unwrap();
    }
}
