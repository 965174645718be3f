//! Notification System Error Types
//!
//! Invalid-usage faults are programming errors: they are returned the moment
//! they are detected and are never retried. Signal failures are recoverable
//! and wrap [`SignalError`].

use std::thread::ThreadId;

use thiserror::Error;

use crate::notifications::events::{NotificationId, NotifierId};
use crate::notifications::traits::DispatchState;
use crate::signal::SignalError;

/// Result type for notification operations
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors that can occur in the asynchronous notification system
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// A thread-affine operation was called off its dispatch thread
    #[error("'{operation}' must be called on dispatch thread {owner:?}, not {current:?}")]
    WrongThread {
        operation: &'static str,
        owner: ThreadId,
        current: ThreadId,
    },

    /// `run` was called on a thread that never hosted a notifier
    #[error("No asynchronous notifiers have been created on thread {thread:?}")]
    NoNotifiers { thread: ThreadId },

    /// The processing loop may only be entered once
    #[error("Dispatch loop cannot start: it is already {state}")]
    AlreadyStarted { state: DispatchState },

    /// A host-loop dispatch thread was demanded on a thread without a host loop
    #[error("Thread {thread:?} has no host event loop installed")]
    HostLoopRequired { thread: ThreadId },

    /// An event raised by one notifier was handed to another for emission
    #[error("Event '{event}' was raised by notifier {raised_by} and cannot be emitted by notifier {emitter}")]
    ForeignEvent {
        event: NotificationId,
        raised_by: NotifierId,
        emitter: NotifierId,
    },

    /// Failure of the underlying event signal
    #[error(transparent)]
    Signal(#[from] SignalError),
}

impl NotifyError {
    /// Create a wrong thread error for the calling thread
    pub fn wrong_thread(operation: &'static str, owner: ThreadId) -> Self {
        Self::WrongThread {
            operation,
            owner,
            current: std::thread::current().id(),
        }
    }

    /// True for programming errors, false for recoverable resource faults
    pub fn is_invalid_usage(&self) -> bool {
        !matches!(self, NotifyError::Signal(_))
    }
}
