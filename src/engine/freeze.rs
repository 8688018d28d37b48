//! engine::freeze
//!
//! Reference-counted freezing of the host's file-change notifications.
//!
//! The lock watcher and every orchestration freeze the bus independently.
//! [`EventFreezer`] counts holders so that only the first freeze and the last
//! thaw reach the [`FileEventBus`]; a nested thaw never releases a bus that
//! someone else still holds frozen.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

/// The host's file-change notification channel.
pub trait FileEventBus: Send + Sync {
    /// Stop delivering file-change notifications.
    fn freeze_events(&self);

    /// Resume delivering file-change notifications.
    fn thaw_events(&self);
}

/// Bus for hosts without file-change notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBus;

impl FileEventBus for NullBus {
    fn freeze_events(&self) {}
    fn thaw_events(&self) {}
}

/// A call received by [`RecordingBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCall {
    Freeze,
    Thaw,
}

/// Bus that records calls.
#[derive(Debug, Default)]
pub struct RecordingBus {
    calls: Mutex<Vec<BusCall>>,
}

impl RecordingBus {
    /// Calls so far.
    pub fn calls(&self) -> Vec<BusCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether the bus is currently frozen.
    pub fn is_frozen(&self) -> bool {
        self.calls().last() == Some(&BusCall::Freeze)
    }

    fn push(&self, call: BusCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl FileEventBus for RecordingBus {
    fn freeze_events(&self) {
        self.push(BusCall::Freeze);
    }

    fn thaw_events(&self) {
        self.push(BusCall::Thaw);
    }
}

/// Counts freeze holders in front of a [`FileEventBus`].
///
/// ```
/// use std::sync::Arc;
/// use repoflow::engine::freeze::{EventFreezer, RecordingBus, BusCall};
///
/// let bus = Arc::new(RecordingBus::default());
/// let freezer = EventFreezer::new(bus.clone());
/// freezer.freeze();
/// freezer.freeze();
/// freezer.thaw();
/// assert_eq!(bus.calls(), vec![BusCall::Freeze]);
/// freezer.thaw();
/// assert_eq!(bus.calls(), vec![BusCall::Freeze, BusCall::Thaw]);
/// ```
pub struct EventFreezer {
    bus: Arc<dyn FileEventBus>,
    holders: Mutex<usize>,
}

impl std::fmt::Debug for EventFreezer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFreezer")
            .field("holders", &self.holders())
            .finish()
    }
}

impl EventFreezer {
    /// Wrap `bus`.
    pub fn new(bus: Arc<dyn FileEventBus>) -> Self {
        Self {
            bus,
            holders: Mutex::new(0),
        }
    }

    /// Add a holder; the first one freezes the bus.
    pub fn freeze(&self) {
        let mut holders = self.holders.lock().unwrap_or_else(|e| e.into_inner());
        *holders += 1;
        if *holders == 1 {
            debug!("freezing file events");
            self.bus.freeze_events();
        }
    }

    /// Release a holder; the last one thaws the bus.
    ///
    /// An unmatched thaw is ignored.
    pub fn thaw(&self) {
        let mut holders = self.holders.lock().unwrap_or_else(|e| e.into_inner());
        match *holders {
            0 => warn!("thaw without matching freeze ignored"),
            1 => {
                *holders = 0;
                debug!("thawing file events");
                self.bus.thaw_events();
            }
            _ => *holders -= 1,
        }
    }

    /// Current number of holders.
    pub fn holders(&self) -> usize {
        *self.holders.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Freeze until the returned guard drops.
    pub fn guard(&self) -> FreezeGuard<'_> {
        self.freeze();
        FreezeGuard { freezer: self }
    }
}

/// Thaws its [`EventFreezer`] on drop.
#[derive(Debug)]
pub struct FreezeGuard<'a> {
    freezer: &'a EventFreezer,
}

impl Drop for FreezeGuard<'_> {
    fn drop(&mut self) {
        self.freezer.thaw();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<RecordingBus>, EventFreezer) {
        let bus = Arc::new(RecordingBus::default());
        let freezer = EventFreezer::new(bus.clone());
        (bus, freezer)
    }

    #[test]
    fn nested_freeze_reaches_bus_once() {
        let (bus, freezer) = setup();
        freezer.freeze();
        freezer.freeze();
        freezer.freeze();
        freezer.thaw();
        freezer.thaw();
        assert!(bus.is_frozen());
        freezer.thaw();
        assert_eq!(bus.calls(), vec![BusCall::Freeze, BusCall::Thaw]);
    }

    #[test]
    fn extra_thaw_is_ignored() {
        let (bus, freezer) = setup();
        freezer.thaw();
        assert!(bus.calls().is_empty());
        assert_eq!(freezer.holders(), 0);
    }

    #[test]
    fn guard_thaws_on_panic() {
        let (bus, freezer) = setup();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = freezer.guard();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(freezer.holders(), 0);
        assert!(!bus.is_frozen());
    }

    #[test]
    fn watcher_and_operation_compose() {
        let (bus, freezer) = setup();
        freezer.freeze(); // watcher sees a lock
        {
            let _op = freezer.guard();
        }
        assert!(bus.is_frozen());
        freezer.thaw(); // lock released
        assert!(!bus.is_frozen());
    }
}
