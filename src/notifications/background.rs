//! Background Dispatch Thread
//!
//! FIFO queue guarded by one lock plus an [`EventSignal`] that parks the
//! owning thread's processing loop while the queue is empty. The lock is held
//! only for queue and counter updates, never while an entry is processed.

use std::collections::VecDeque;
use std::mem;
use std::thread::{self, ThreadId};
use std::time::Duration;

use log::{debug, error, trace, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::notifications::dispatch::{self, DispatchConfig, Lifecycle};
use crate::notifications::error::NotifyResult;
use crate::notifications::events::{NotifierId, QueuedNotification};
use crate::notifications::traits::{DispatchKind, DispatchState, DispatchThread, LoopOutcome, Release};
use crate::signal::EventSignal;

#[derive(Debug, Default)]
struct BackgroundState {
    queue: VecDeque<QueuedNotification>,
    lifecycle: Lifecycle,
}

/// Dispatch thread that owns its queue and loop
#[derive(Debug)]
pub struct BackgroundDispatchThread {
    owner: ThreadId,
    wait_timeout: Option<Duration>,
    state: Mutex<BackgroundState>,
    queue_signal: EventSignal,
}

impl BackgroundDispatchThread {
    /// Create a dispatch thread owned by the calling thread
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        Self {
            owner: thread::current().id(),
            wait_timeout: config.wait_timeout,
            state: Mutex::new(BackgroundState::default()),
            queue_signal: EventSignal::new(),
        }
    }

    /// Park until an enqueue or the final release posts the signal
    fn wait_for_work(&self, state: &mut MutexGuard<'_, BackgroundState>) -> NotifyResult<()> {
        self.queue_signal.reset()?;

        let waited = MutexGuard::unlocked(state, || self.queue_signal.wait(self.wait_timeout));
        match waited {
            Ok(()) => Ok(()),
            Err(e) if e.is_timeout() => {
                trace!("Dispatch loop on {:?} idle: {}", self.owner, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn process_loop(
        &self,
        state: &mut MutexGuard<'_, BackgroundState>,
        outcome: &mut LoopOutcome,
    ) -> NotifyResult<()> {
        while state.lifecycle.ref_count() != 0 {
            if state.queue.is_empty() {
                self.wait_for_work(state)?;
            }

            if let Some(next) = state.queue.pop_front() {
                trace!("Dispatching {:?} on {:?}", next, self.owner);
                let processed = MutexGuard::unlocked(state, || dispatch::process(next));
                outcome.record(processed);
            }
        }
        Ok(())
    }
}

impl Default for BackgroundDispatchThread {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the queue lock for a running loop; leaves the running state if an
/// observer panics out of the loop
struct RunningGuard<'a> {
    state: MutexGuard<'a, BackgroundState>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            // The queue lock is still held here, so `run` unregisters and
            // tears down once the guard is gone
            let retire = self.state.lifecycle.finish_run();
            error!("Dispatch loop unwinding after a panic during delivery (retire: {})", retire);
        }
    }
}

impl DispatchThread for BackgroundDispatchThread {
    fn owner(&self) -> ThreadId {
        self.owner
    }

    fn kind(&self) -> DispatchKind {
        DispatchKind::Background
    }

    fn add_ref(&self) -> usize {
        self.state.lock().lifecycle.add_ref()
    }

    fn remove_ref(&self) -> Release {
        let mut state = self.state.lock();
        let release = state.lifecycle.remove_ref();
        if release.remaining == 0 && state.queue.is_empty() {
            // Wake the loop so it sees quiescence
            if let Err(e) = self.queue_signal.post() {
                debug!("Final release on {:?} could not post: {}", self.owner, e);
            }
        }
        release
    }

    fn ref_count(&self) -> usize {
        self.state.lock().lifecycle.ref_count()
    }

    fn state(&self) -> DispatchState {
        self.state.lock().lifecycle.state()
    }

    fn is_retired(&self) -> bool {
        self.state.lock().lifecycle.is_retired()
    }

    fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn enqueue(&self, notification: QueuedNotification) {
        let mut state = self.state.lock();
        if state.lifecycle.is_retired() {
            warn!("Discarding {:?}: dispatch thread {:?} is retired", notification, self.owner);
            drop(state);
            return;
        }

        state.queue.push_back(notification);
        if state.queue.len() == 1 {
            if let Err(e) = self.queue_signal.post() {
                error!("Failed to wake dispatch loop on {:?}: {}", self.owner, e);
            }
        }
    }

    fn run_loop(&self) -> NotifyResult<LoopOutcome> {
        dispatch::check_owner("run_loop", self.owner)?;

        let mut state = self.state.lock();
        state.lifecycle.begin_run()?;
        debug!("Dispatch loop started on {:?} with {} notifiers", self.owner, state.lifecycle.ref_count());

        let mut outcome = LoopOutcome::default();
        let mut running = RunningGuard { state };
        let result = self.process_loop(&mut running.state, &mut outcome);

        outcome.retire = running.state.lifecycle.finish_run();
        drop(running);

        debug!(
            "Dispatch loop on {:?} stopped: {} delivered, {} dropped, {} stale, {} self-deleted",
            self.owner, outcome.delivered, outcome.dropped_disabled, outcome.stale, outcome.self_deleted
        );
        result.map(|()| outcome)
    }

    fn delete_notifications_for(&self, notifier: NotifierId) -> NotifyResult<usize> {
        dispatch::check_owner("delete_notifications_for", self.owner)?;

        let removed = {
            let mut state = self.state.lock();
            let (removed, kept): (VecDeque<QueuedNotification>, VecDeque<QueuedNotification>) =
                mem::take(&mut state.queue)
                    .into_iter()
                    .partition(|n| n.target() == notifier);
            state.queue = kept;
            removed
        };

        let count = removed.len();
        for notification in removed {
            discard(notification);
        }
        if count > 0 {
            debug!("Deleted {} pending notifications for notifier {}", count, notifier);
        }
        Ok(count)
    }

    fn teardown(&self) {
        // Leftover deliveries belong to notifiers whose cores, and so their
        // cleanup hooks, are already gone
        let leftovers = mem::take(&mut self.state.lock().queue);
        self.queue_signal.close();
        if !leftovers.is_empty() {
            warn!("Dispatch thread {:?} retired with {} stale entries", self.owner, leftovers.len());
        }
        debug!("Background dispatch thread for {:?} retired", self.owner);
    }
}

/// Cancel an entry without delivering it
pub(crate) fn discard(notification: QueuedNotification) {
    match notification {
        QueuedNotification::Deliver(event) => {
            if let Some(core) = event.core() {
                core.cleanup(&event);
            }
        }
        QueuedNotification::SelfDestroy { target, owner } => {
            debug!("Dropping self-delete request for notifier {}", target);
            drop(owner);
        }
    }
}
