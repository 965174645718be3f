//! Shared Dispatch Machinery
//!
//! The delivery step, reference-count bookkeeping and the dispatch thread
//! factory used by both concrete dispatch threads.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use log::{debug, trace};
use parking_lot::RwLock;

use crate::notifications::background::BackgroundDispatchThread;
use crate::notifications::error::{NotifyError, NotifyResult};
use crate::notifications::events::QueuedNotification;
use crate::notifications::host_loop::{HostEventLoop, HostLoopDispatchThread};
use crate::notifications::traits::{DispatchState, DispatchThread, LoopOutcome, Release};

/// Process-wide settings applied to dispatch threads when they are created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Longest a background loop blocks on an empty queue before re-checking
    /// quiescence. `None` blocks until woken.
    pub wait_timeout: Option<Duration>,
}

impl DispatchConfig {
    pub const DEFAULT: DispatchConfig = DispatchConfig { wait_timeout: None };
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

static CONFIG: RwLock<DispatchConfig> = RwLock::new(DispatchConfig::DEFAULT);

/// Install the settings used by dispatch threads created from now on
pub fn configure(config: DispatchConfig) {
    debug!("Dispatch configuration set to {:?}", config);
    *CONFIG.write() = config;
}

/// The settings new dispatch threads will use
pub fn current_config() -> DispatchConfig {
    *CONFIG.read()
}

/// Create the dispatch thread appropriate for the calling thread.
///
/// Threads with an installed [`HostEventLoop`] get a host-loop dispatch
/// thread, all others a background one. With `host_loop_only` set, a thread
/// without a host loop is an error.
pub fn make(host_loop_only: bool) -> NotifyResult<Arc<dyn DispatchThread>> {
    match HostEventLoop::current() {
        Some(host) => Ok(host_loop(host)),
        None if host_loop_only => Err(NotifyError::HostLoopRequired {
            thread: thread::current().id(),
        }),
        None => Ok(background()),
    }
}

/// [`make`] for a thread that may use either variant
pub(crate) fn make_any() -> Arc<dyn DispatchThread> {
    HostEventLoop::current().map_or_else(background, host_loop)
}

fn host_loop(host: Arc<HostEventLoop>) -> Arc<dyn DispatchThread> {
    debug!("Creating host-loop dispatch thread for {:?}", host.owner());
    Arc::new(HostLoopDispatchThread::new(host))
}

fn background() -> Arc<dyn DispatchThread> {
    debug!("Creating background dispatch thread for {:?}", thread::current().id());
    Arc::new(BackgroundDispatchThread::with_config(current_config()))
}

/// Fail unless called on `owner`
pub(crate) fn check_owner(operation: &'static str, owner: ThreadId) -> NotifyResult<()> {
    if thread::current().id() == owner {
        Ok(())
    } else {
        Err(NotifyError::wrong_thread(operation, owner))
    }
}

/// How a single queued entry was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Processed {
    Delivered,
    DroppedDisabled,
    Stale,
    SelfDeleted,
}

impl LoopOutcome {
    pub(crate) fn record(&mut self, processed: Processed) {
        match processed {
            Processed::Delivered => self.delivered += 1,
            Processed::DroppedDisabled => self.dropped_disabled += 1,
            Processed::Stale => self.stale += 1,
            Processed::SelfDeleted => self.self_deleted += 1,
        }
    }
}

/// Handle one dequeued entry on the dispatch thread. No queue lock may be
/// held: observers and destructors re-enter the notifier API.
pub(crate) fn process(notification: QueuedNotification) -> Processed {
    match notification {
        QueuedNotification::SelfDestroy { target, owner } => {
            debug!("Destroying notifier {} on request", target);
            drop(owner);
            Processed::SelfDeleted
        }
        QueuedNotification::Deliver(event) => {
            let core = match event.core() {
                Some(core) if !core.is_retired() => core,
                _ => {
                    // No cleanup: the hook lives in the core, which is gone or
                    // has already scrubbed its entries
                    trace!("Skipping '{}' for departed notifier {}", event.id(), event.notifier_id());
                    return Processed::Stale;
                }
            };

            let delivered = core.is_enabled();
            if delivered {
                core.notify_observers(&event);
            } else {
                trace!("Notifier {} disabled, dropping '{}'", event.notifier_id(), event.id());
            }
            core.cleanup(&event);

            if delivered {
                Processed::Delivered
            } else {
                Processed::DroppedDisabled
            }
        }
    }
}

/// Reference count and run state of a dispatch thread.
///
/// Always mutated under the dispatch thread's own lock so the retire decision
/// is made once, by whichever of the last release or the loop exit sees
/// `ref_count == 0` while not running.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    ref_count: usize,
    state: DispatchState,
    retired: bool,
}

impl Lifecycle {
    pub(crate) fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub(crate) fn state(&self) -> DispatchState {
        self.state
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired
    }

    pub(crate) fn add_ref(&mut self) -> usize {
        self.ref_count += 1;
        self.ref_count
    }

    pub(crate) fn remove_ref(&mut self) -> Release {
        debug_assert!(self.ref_count > 0, "dispatch thread released more often than bound");
        self.ref_count = self.ref_count.saturating_sub(1);
        Release {
            remaining: self.ref_count,
            retire: self.try_retire(),
        }
    }

    pub(crate) fn begin_run(&mut self) -> NotifyResult<()> {
        if self.state != DispatchState::Idle {
            return Err(NotifyError::AlreadyStarted { state: self.state });
        }
        self.state = DispatchState::Running;
        Ok(())
    }

    /// Leave the running state; true if the caller must retire the thread
    pub(crate) fn finish_run(&mut self) -> bool {
        self.state = DispatchState::Stopped;
        self.try_retire()
    }

    fn try_retire(&mut self) -> bool {
        if !self.retired && self.ref_count == 0 && self.state != DispatchState::Running {
            self.retired = true;
            true
        } else {
            false
        }
    }
}
