//! Wake-up flag between sample ingestion and the training scheduler.
//!
//! Raises coalesce: any number of `raise()` calls between two waits produce
//! one wake-up. A fatal error from the ingestion side is delivered through
//! the same path so the scheduler stops instead of sleeping forever. A raise
//! that was pending when the fault arrived is still delivered first, so data
//! ingested just before the failure gets one last scheduling pass.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::CoordinatorError;

#[derive(Default)]
struct SignalState {
    changed: bool,
    raised: u64,
    fault: Option<CoordinatorError>,
    faulted: bool,
}

/// Coalescing "new data available" signal.
#[derive(Default)]
pub struct ChangeSignal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl ChangeSignal {
    /// Create a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark new data and wake the waiter.
    pub fn raise(&self) {
        let mut state = self.state.lock();
        state.changed = true;
        state.raised += 1;
        self.cond.notify_all();
    }

    /// Deliver a fatal error to the waiter.
    ///
    /// Only the first fault is kept.
    pub fn fail(&self, err: CoordinatorError) {
        let mut state = self.state.lock();
        if !state.faulted {
            state.fault = Some(err);
            state.faulted = true;
        }
        self.cond.notify_all();
    }

    /// Block until raised, then clear the flag.
    ///
    /// Fails once the fault is set and no raise is pending.
    pub fn wait(&self) -> Result<(), CoordinatorError> {
        let mut state = self.state.lock();
        while !state.changed && !state.faulted {
            self.cond.wait(&mut state);
        }
        Self::consume(&mut state).map(|_| ())
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `Ok(false)` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, CoordinatorError> {
        let mut state = self.state.lock();
        if !state.changed && !state.faulted {
            self.cond.wait_for(&mut state, timeout);
        }
        Self::consume(&mut state)
    }

    fn consume(state: &mut SignalState) -> Result<bool, CoordinatorError> {
        if state.changed {
            state.changed = false;
            return Ok(true);
        }
        if state.faulted {
            return Err(state.fault.take().unwrap_or_else(|| {
                CoordinatorError::Internal("sample ingestion already failed".to_string())
            }));
        }
        Ok(false)
    }

    /// Whether a raise is pending.
    pub fn is_raised(&self) -> bool {
        self.state.lock().changed
    }

    /// Total number of `raise()` calls.
    pub fn raise_count(&self) -> u64 {
        self.state.lock().raised
    }
}

/// Shared change signal.
pub type SharedChangeSignal = Arc<ChangeSignal>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_raises_coalesce() {
        let signal = ChangeSignal::new();
        signal.raise();
        signal.raise();
        signal.raise();

        signal.wait().unwrap();
        assert!(!signal.is_raised());
        assert_eq!(signal.raise_count(), 3);
        assert!(!signal.wait_timeout(Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_wait_wakes_on_raise_from_other_thread() {
        let signal = Arc::new(ChangeSignal::new());
        let raiser = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                signal.raise();
            })
        };
        signal.wait().unwrap();
        raiser.join().unwrap();
    }

    #[test]
    fn test_pending_raise_delivered_before_fault() {
        let signal = ChangeSignal::new();
        signal.raise();
        signal.fail(CoordinatorError::Protocol("bad tag".into()));

        signal.wait().unwrap();
        let err = signal.wait().unwrap_err();
        assert!(matches!(err, CoordinatorError::Protocol(_)));
        // Later waits keep failing instead of blocking.
        assert!(signal.wait().is_err());
    }

    #[test]
    fn test_only_first_fault_is_kept() {
        let signal = ChangeSignal::new();
        signal.fail(CoordinatorError::NoCheckpoints);
        signal.fail(CoordinatorError::EmptyTransitions);
        assert!(matches!(signal.wait(), Err(CoordinatorError::NoCheckpoints)));
    }

    #[test]
    fn test_wait_timeout_reports_raise() {
        let signal = ChangeSignal::new();
        signal.raise();
        assert!(signal.wait_timeout(Duration::from_millis(10)).unwrap());
    }
}
