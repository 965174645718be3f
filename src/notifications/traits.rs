//! Observer and Dispatch Thread Traits
//!
//! [`Observer`] and [`CleanupHook`] are the application seams of a notifier.
//! [`DispatchThread`] is the contract every per-thread dispatch mechanism
//! implements: the background queue loop and the host event loop variant.

use std::fmt;
use std::thread::ThreadId;

use crate::notifications::error::NotifyResult;
use crate::notifications::events::{NotificationEvent, NotifierId, QueuedNotification};

/// Receives events on the dispatch thread of the notifier it observes
pub trait Observer: Send + Sync {
    fn notification(&self, event: &NotificationEvent);
}

impl<F> Observer for F
where
    F: Fn(&NotificationEvent) + Send + Sync,
{
    fn notification(&self, event: &NotificationEvent) {
        self(event)
    }
}

/// Frees resources a notifier attached to its events.
///
/// Runs on the dispatch thread after every event raised by the notifier has
/// been delivered, dropped because notification was disabled, or discarded
/// because the notifier is being destroyed. Implementations handle the event
/// ids they own and pass every other event on to the hook they wrap, ending
/// at [`NoCleanup`].
pub trait CleanupHook: Send + Sync {
    fn cleanup_after_delivery(&self, event: &NotificationEvent);
}

impl<F> CleanupHook for F
where
    F: Fn(&NotificationEvent) + Send + Sync,
{
    fn cleanup_after_delivery(&self, event: &NotificationEvent) {
        self(event)
    }
}

/// The base cleanup behaviour: nothing to free
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCleanup;

impl CleanupHook for NoCleanup {
    fn cleanup_after_delivery(&self, _event: &NotificationEvent) {}
}

/// Lifecycle state of a dispatch thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    /// Constructed, processing loop not yet entered
    #[default]
    Idle,
    /// Inside the processing loop
    Running,
    /// Processing loop returned
    Stopped,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchState::Idle => write!(f, "idle"),
            DispatchState::Running => write!(f, "running"),
            DispatchState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Concrete dispatch mechanism behind a [`DispatchThread`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// Owns a FIFO queue and blocks in its own loop
    Background,
    /// Forwards notifications into a host event loop
    HostLoop,
}

/// Outcome of releasing a notifier's reference to its dispatch thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    /// References left after the release
    pub remaining: usize,
    /// The caller won the retire decision and must tear the thread down
    pub retire: bool,
}

/// Counters reported when a processing loop returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Events delivered to observers
    pub delivered: u64,
    /// Events dropped because notification was disabled
    pub dropped_disabled: u64,
    /// Events whose notifier no longer existed
    pub stale: u64,
    /// Notifiers destroyed through a self-delete request
    pub self_deleted: u64,
    /// The loop exit won the retire decision
    pub retire: bool,
}

impl LoopOutcome {
    pub fn processed(&self) -> u64 {
        self.delivered + self.dropped_disabled + self.stale + self.self_deleted
    }
}

/// Per-thread owner of a notification queue.
///
/// One exists for every thread that has hosted an asynchronous notifier. It
/// is counted by the notifiers bound to it and retired exactly once, when no
/// notifier is bound and its loop is not running.
pub trait DispatchThread: Send + Sync + fmt::Debug {
    /// The thread this dispatch thread delivers on
    fn owner(&self) -> ThreadId;

    fn kind(&self) -> DispatchKind;

    /// Bind one more notifier; returns the new count
    fn add_ref(&self) -> usize;

    /// Unbind a notifier. Reaching zero with nothing queued wakes a blocked
    /// processing loop so it can observe quiescence.
    fn remove_ref(&self) -> Release;

    fn ref_count(&self) -> usize;

    fn state(&self) -> DispatchState;

    fn is_running(&self) -> bool {
        self.state() == DispatchState::Running
    }

    fn is_retired(&self) -> bool;

    /// Number of queued entries not yet processed
    fn pending(&self) -> usize;

    /// Queue a notification. Callable from any thread; wakes an idle loop.
    fn enqueue(&self, notification: QueuedNotification);

    /// Process notifications in arrival order until quiescent. Owner thread
    /// only, at most once.
    fn run_loop(&self) -> NotifyResult<LoopOutcome>;

    /// Discard every queued entry addressed to `notifier`, running its
    /// cleanup hook for each. Owner thread only. Returns the number removed.
    fn delete_notifications_for(&self, notifier: NotifierId) -> NotifyResult<usize>;

    /// Release resources once the retire decision has been won
    fn teardown(&self);
}
