//! Host Event Loop Dispatch
//!
//! Some threads already run a message loop owned by their host (a UI toolkit,
//! an embedding application). Notifiers created on such a thread do not get a
//! queue and loop of their own: their notifications are posted into the host
//! loop's message queue and delivered whenever the host pumps messages.
//!
//! A host makes its loop available with [`HostEventLoop::install`] before
//! creating any notifier on that thread.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::{self, Receiver, Sender};
use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::notifications::background::discard;
use crate::notifications::dispatch::{self, Lifecycle};
use crate::notifications::error::{NotifyError, NotifyResult};
use crate::notifications::events::{NotifierId, QueuedNotification};
use crate::notifications::traits::{DispatchKind, DispatchState, DispatchThread, LoopOutcome, Release};

thread_local! {
    static CURRENT_HOST: RefCell<Option<Arc<HostEventLoop>>> = const { RefCell::new(None) };
}

/// A message in the host loop's queue
pub enum HostMessage {
    /// Notification posted by a host-loop dispatch thread
    Notification(QueuedNotification),
    /// Work the host posted for its own thread
    Task(Box<dyn FnOnce() + Send>),
    /// Stop pumping messages
    Quit,
}

impl fmt::Debug for HostMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostMessage::Notification(n) => f.debug_tuple("Notification").field(n).finish(),
            HostMessage::Task(_) => f.write_str("Task"),
            HostMessage::Quit => f.write_str("Quit"),
        }
    }
}

/// Per-thread host message loop
#[derive(Debug)]
pub struct HostEventLoop {
    owner: ThreadId,
    sender: Sender<HostMessage>,
    receiver: Receiver<HostMessage>,
    running: AtomicBool,
}

impl HostEventLoop {
    /// Install a host loop on the calling thread, or return the one already
    /// installed
    pub fn install() -> Arc<HostEventLoop> {
        CURRENT_HOST.with(|current| {
            let mut current = current.borrow_mut();
            if let Some(existing) = current.as_ref() {
                return Arc::clone(existing);
            }

            let (sender, receiver) = crossbeam_channel::unbounded();
            let host = Arc::new(HostEventLoop {
                owner: thread::current().id(),
                sender,
                receiver,
                running: AtomicBool::new(false),
            });
            debug!("Installed host event loop on {:?}", host.owner);
            *current = Some(Arc::clone(&host));
            host
        })
    }

    /// The host loop installed on the calling thread
    pub fn current() -> Option<Arc<HostEventLoop>> {
        CURRENT_HOST.with(|current| current.borrow().clone())
    }

    /// Remove the calling thread's host loop. Dispatch threads already bound
    /// to it keep it alive.
    pub fn uninstall() -> Option<Arc<HostEventLoop>> {
        CURRENT_HOST.with(|current| current.borrow_mut().take())
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Cross-thread handle for posting into this loop
    pub fn handle(&self) -> HostLoopHandle {
        HostLoopHandle {
            sender: self.sender.clone(),
        }
    }

    /// Messages waiting to be pumped
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn post(&self, message: HostMessage) {
        // The loop owns a receiver, so the channel cannot be disconnected
        let _ = self.sender.send(message);
    }

    /// Pump messages on the owner thread until [`HostLoopHandle::quit`]
    pub fn run(&self) -> NotifyResult<LoopOutcome> {
        dispatch::check_owner("host_loop_run", self.owner)?;
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(NotifyError::AlreadyStarted {
                state: DispatchState::Running,
            });
        }

        debug!("Host event loop running on {:?}", self.owner);
        let mut outcome = LoopOutcome::default();
        while let Ok(message) = self.receiver.recv() {
            match message {
                HostMessage::Notification(notification) => {
                    trace!("Host loop dispatching {:?}", notification);
                    outcome.record(dispatch::process(notification));
                }
                HostMessage::Task(task) => task(),
                HostMessage::Quit => break,
            }
        }

        self.running.store(false, Ordering::Release);
        debug!("Host event loop on {:?} quit after {} notifications", self.owner, outcome.processed());
        Ok(outcome)
    }
}

/// Posts work into a [`HostEventLoop`] from any thread
#[derive(Debug, Clone)]
pub struct HostLoopHandle {
    sender: Sender<HostMessage>,
}

impl HostLoopHandle {
    /// Run `task` on the host thread; false if the loop is gone
    pub fn post_task<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(HostMessage::Task(Box::new(task))).is_ok()
    }

    /// Ask the loop to return once the messages ahead of this one are pumped
    pub fn quit(&self) -> bool {
        self.sender.send(HostMessage::Quit).is_ok()
    }
}

#[derive(Debug)]
struct HostState {
    lifecycle: Lifecycle,
    attached: bool,
}

/// Dispatch thread that delivers through the owner's host event loop
#[derive(Debug)]
pub struct HostLoopDispatchThread {
    owner: ThreadId,
    host: Arc<HostEventLoop>,
    state: Mutex<HostState>,
}

impl HostLoopDispatchThread {
    pub fn new(host: Arc<HostEventLoop>) -> Self {
        Self {
            owner: host.owner(),
            host,
            state: Mutex::new(HostState {
                lifecycle: Lifecycle::default(),
                attached: true,
            }),
        }
    }

    pub fn host(&self) -> &Arc<HostEventLoop> {
        &self.host
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }
}

impl DispatchThread for HostLoopDispatchThread {
    fn owner(&self) -> ThreadId {
        self.owner
    }

    fn kind(&self) -> DispatchKind {
        DispatchKind::HostLoop
    }

    fn add_ref(&self) -> usize {
        let mut state = self.state.lock();
        state.attached = true;
        state.lifecycle.add_ref()
    }

    fn remove_ref(&self) -> Release {
        let mut state = self.state.lock();
        let release = state.lifecycle.remove_ref();
        if release.remaining == 0 {
            debug!("Last notifier on {:?} released, detaching from host loop", self.owner);
            state.attached = false;
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

    /// Counts every message in the host queue, host tasks included
    fn pending(&self) -> usize {
        self.host.pending()
    }

    fn enqueue(&self, notification: QueuedNotification) {
        let state = self.state.lock();
        if !state.attached {
            drop(state);
            warn!("Discarding {:?}: no notifier on {:?} is attached to the host loop", notification, self.owner);
            return;
        }
        self.host.post(HostMessage::Notification(notification));
    }

    fn run_loop(&self) -> NotifyResult<LoopOutcome> {
        dispatch::check_owner("run_loop", self.owner)?;
        self.state.lock().lifecycle.begin_run()?;

        let result = self.host.run();

        let retire = self.state.lock().lifecycle.finish_run();
        result.map(|outcome| LoopOutcome { retire, ..outcome })
    }

    fn delete_notifications_for(&self, notifier: NotifierId) -> NotifyResult<usize> {
        dispatch::check_owner("delete_notifications_for", self.owner)?;

        let mut removed = Vec::new();
        {
            let _state = self.state.lock();
            let drained: Vec<HostMessage> = self.host.receiver.try_iter().collect();
            for message in drained {
                match message {
                    HostMessage::Notification(n) if n.target() == notifier => removed.push(n),
                    other => self.host.post(other),
                }
            }
        }

        let count = removed.len();
        for notification in removed {
            discard(notification);
        }
        if count > 0 {
            debug!("Deleted {} host loop notifications for notifier {}", count, notifier);
        }
        Ok(count)
    }

    fn teardown(&self) {
        self.state.lock().attached = false;
        debug!("Host-loop dispatch thread for {:?} retired", self.owner);
    }
}
