//! Event Signal
//!
//! A manual-reset binary gate used to park a dispatch loop while its queue is
//! empty. The signal is either *reset* (waiters block) or *posted* (every
//! waiter resumes and later waits return immediately until the next reset).
//!
//! Posting an already posted signal and resetting an already reset signal
//! both succeed. Each post is counted; `reset` hands back the number of posts
//! since the previous reset.

use std::time::{Duration, Instant};

use log::trace;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Result type for event signal operations
pub type SignalResult<T> = Result<T, SignalError>;

/// Errors raised by [`EventSignal`]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// The wait deadline passed without the signal being posted
    #[error("Timed out after {waited:?} waiting for event signal")]
    Timeout { waited: Duration },

    /// The signal was closed; it can no longer be posted or waited on
    #[error("Event signal has been closed")]
    Closed,
}

impl SignalError {
    /// True when the failure was a wait timeout rather than a closed signal
    pub fn is_timeout(&self) -> bool {
        matches!(self, SignalError::Timeout { .. })
    }
}

#[derive(Debug, Default)]
struct SignalState {
    posted: bool,
    post_count: u64,
    closed: bool,
}

/// Manual-reset event signal
#[derive(Debug, Default)]
pub struct EventSignal {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

impl EventSignal {
    /// Create a signal in the reset state
    pub fn new() -> Self {
        Self::default()
    }

    /// Post the signal, releasing all current and future waiters until reset
    pub fn post(&self) -> SignalResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SignalError::Closed);
        }

        state.post_count += 1;
        if !state.posted {
            state.posted = true;
            self.condvar.notify_all();
        }
        Ok(())
    }

    /// Reset the signal and return the number of posts since the last reset
    pub fn reset(&self) -> SignalResult<u64> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SignalError::Closed);
        }

        let prior = state.post_count;
        state.posted = false;
        state.post_count = 0;
        Ok(prior)
    }

    /// Block until the signal is posted.
    ///
    /// `None` waits forever. A closed signal fails with [`SignalError::Closed`]
    /// even if it was posted before closing.
    pub fn wait(&self, timeout: Option<Duration>) -> SignalResult<()> {
        let mut state = self.state.lock();
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);

        loop {
            if state.closed {
                return Err(SignalError::Closed);
            }
            if state.posted {
                return Ok(());
            }

            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut state, deadline).timed_out()
                        && !state.posted
                        && !state.closed
                    {
                        let waited = started.elapsed();
                        trace!("Event signal wait timed out after {:?}", waited);
                        return Err(SignalError::Timeout { waited });
                    }
                }
                None => self.condvar.wait(&mut state),
            }
        }
    }

    /// Number of posts since the last reset
    pub fn post_count(&self) -> u64 {
        self.state.lock().post_count
    }

    pub fn is_posted(&self) -> bool {
        self.state.lock().posted
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Close the signal, failing every blocked and future wait
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            self.condvar.notify_all();
        }
    }
}
