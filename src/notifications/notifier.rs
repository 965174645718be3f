//! Asynchronous Notifier
//!
//! [`AsyncNotifier`] is embedded in objects that raise events. Raising an
//! event never runs observer code on the calling thread: the event is queued
//! on the dispatch thread of the thread that created the notifier and
//! delivered there, in arrival order, when that thread runs [`run`].
//!
//! A notifier must be dropped on the thread that created it. To destroy a
//! notifier from one of its own observers, or from another thread, hand it to
//! [`request_self_delete`]; it is then dropped on its own thread after the
//! entries queued ahead of the request have been processed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use asyncnotify::notifications::{AsyncNotifier, NotificationEvent, NotificationId};
//!
//! const TICK: NotificationId = NotificationId::new("clock.tick");
//!
//! let clock = AsyncNotifier::new();
//! clock.enable_notification();
//! clock.add_observer(Arc::new(|event: &NotificationEvent| {
//!     println!("{} from {}", event.id(), event.notifier_id());
//! }));
//!
//! let emitter = clock.emitter();
//! let producer = std::thread::spawn(move || {
//!     emitter.emit(TICK);
//! });
//! producer.join().unwrap();
//!
//! asyncnotify::notifications::request_self_delete(Box::new(clock));
//! asyncnotify::notifications::run().unwrap();
//! ```

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use log::{debug, error, info, trace};
use parking_lot::Mutex;

use crate::notifications::dispatch;
use crate::notifications::error::{NotifyError, NotifyResult};
use crate::notifications::events::{NotificationEvent, NotificationId, NotifierId, QueuedNotification};
use crate::notifications::registry;
use crate::notifications::traits::{
    CleanupHook, DispatchKind, DispatchThread, LoopOutcome, NoCleanup, Observer,
};

/// Implemented by every object that embeds an [`AsyncNotifier`]
pub trait Notifier: Send + 'static {
    fn async_notifier(&self) -> &AsyncNotifier;
}

/// State shared between a notifier, its emitters and its queued events
pub(crate) struct NotifierCore {
    id: NotifierId,
    dispatch: Arc<dyn DispatchThread>,
    enabled: AtomicBool,
    retired: AtomicBool,
    observers: Mutex<Vec<Arc<dyn Observer>>>,
    cleanup: Arc<dyn CleanupHook>,
}

impl NotifierCore {
    pub(crate) fn id(&self) -> NotifierId {
        self.id
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Deliver synchronously; runs on the dispatch thread
    pub(crate) fn notify_observers(&self, event: &NotificationEvent) {
        // Observers may add or remove observers while being notified
        let observers = self.observers.lock().clone();
        for observer in observers {
            observer.notification(event);
        }
    }

    pub(crate) fn cleanup(&self, event: &NotificationEvent) {
        self.cleanup.cleanup_after_delivery(event);
    }

    fn emit(&self, event: NotificationEvent) -> bool {
        if !self.is_enabled() || self.is_retired() {
            return false;
        }
        trace!("Notifier {} queued '{}'", self.id, event.id());
        self.dispatch.enqueue(QueuedNotification::Deliver(event));
        true
    }
}

impl fmt::Debug for NotifierCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierCore")
            .field("id", &self.id)
            .field("dispatch_thread", &self.dispatch.owner())
            .field("enabled", &self.is_enabled())
            .field("retired", &self.is_retired())
            .field("observers", &self.observers.lock().len())
            .finish()
    }
}

/// Base for objects that notify observers on their creating thread
#[derive(Debug)]
pub struct AsyncNotifier {
    core: Arc<NotifierCore>,
}

impl AsyncNotifier {
    /// Bind a new notifier to the calling thread's dispatch thread.
    ///
    /// Notification starts disabled.
    pub fn new() -> Self {
        Self::bind(Arc::new(NoCleanup))
    }

    /// Bind a new notifier whose events are passed to `hook` once processed
    pub fn with_cleanup<H>(hook: H) -> Self
    where
        H: CleanupHook + 'static,
    {
        Self::bind(Arc::new(hook))
    }

    fn bind(cleanup: Arc<dyn CleanupHook>) -> Self {
        let dispatch = registry::find_or_create();
        let refs = dispatch.add_ref();
        let id = NotifierId::next();
        debug!("Notifier {} bound to {:?} ({} notifiers)", id, dispatch.owner(), refs);

        Self {
            core: Arc::new(NotifierCore {
                id,
                dispatch,
                enabled: AtomicBool::new(false),
                retired: AtomicBool::new(false),
                observers: Mutex::new(Vec::new()),
                cleanup,
            }),
        }
    }

    pub fn id(&self) -> NotifierId {
        self.core.id
    }

    /// The thread events from this notifier are delivered on
    pub fn dispatch_thread(&self) -> ThreadId {
        self.core.dispatch.owner()
    }

    pub fn dispatch_kind(&self) -> DispatchKind {
        self.core.dispatch.kind()
    }

    pub fn enable_notification(&self) -> &Self {
        self.core.enabled.store(true, Ordering::Release);
        self
    }

    pub fn disable_notification(&self) -> &Self {
        self.core.enabled.store(false, Ordering::Release);
        self
    }

    pub fn is_enabled_for_notification(&self) -> bool {
        self.core.is_enabled()
    }

    pub fn add_observer(&self, observer: Arc<dyn Observer>) -> &Self {
        self.core.observers.lock().push(observer);
        self
    }

    /// Remove one registration of `observer`; false if it was not registered
    pub fn remove_observer(&self, observer: &Arc<dyn Observer>) -> bool {
        let mut observers = self.core.observers.lock();
        let target = Arc::as_ptr(observer).cast::<()>();
        match observers.iter().position(|o| Arc::as_ptr(o).cast::<()>() == target) {
            Some(index) => {
                observers.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn remove_all_observers(&self) -> &Self {
        self.core.observers.lock().clear();
        self
    }

    pub fn observer_count(&self) -> usize {
        self.core.observers.lock().len()
    }

    /// A new event raised by this notifier
    pub fn event(&self, id: NotificationId) -> NotificationEvent {
        NotificationEvent::new(id, &self.core)
    }

    /// Queue `id` for delivery. Returns false, queueing nothing, while
    /// notification is disabled.
    pub fn emit(&self, id: NotificationId) -> bool {
        self.core.emit(self.event(id))
    }

    /// Queue `id` with payload data
    pub fn emit_with<T>(&self, id: NotificationId, payload: T) -> bool
    where
        T: Any + Send + Sync,
    {
        self.core.emit(self.event(id).with_payload(payload))
    }

    /// Queue a prepared event. The event must have been raised by this notifier.
    pub fn emit_event(&self, event: NotificationEvent) -> NotifyResult<bool> {
        if event.notifier_id() != self.core.id {
            return Err(NotifyError::ForeignEvent {
                event: event.id(),
                raised_by: event.notifier_id(),
                emitter: self.core.id,
            });
        }
        Ok(self.core.emit(event))
    }

    /// Handle for raising events from other threads
    pub fn emitter(&self) -> Emitter {
        Emitter {
            notifier: self.core.id,
            core: Arc::downgrade(&self.core),
        }
    }
}

impl Default for AsyncNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for AsyncNotifier {
    fn async_notifier(&self) -> &AsyncNotifier {
        self
    }
}

/// A clone is bound to the calling thread, not the source's dispatch thread,
/// and starts disabled with no observers. The cleanup hook is shared.
impl Clone for AsyncNotifier {
    fn clone(&self) -> Self {
        Self::bind(Arc::clone(&self.core.cleanup))
    }
}

impl Drop for AsyncNotifier {
    fn drop(&mut self) {
        let id = self.core.id;
        let dispatch = Arc::clone(&self.core.dispatch);

        if let Err(e) = dispatch::check_owner("drop", dispatch.owner()) {
            if thread::panicking() {
                error!("{}; leaking notifier {}", e, id);
                return;
            }
            panic!("{}", e);
        }

        self.core.retired.store(true, Ordering::Release);
        if let Err(e) = dispatch.delete_notifications_for(id) {
            error!("Could not cancel notifications for notifier {}: {}", id, e);
        }

        let release = dispatch.remove_ref();
        debug!("Notifier {} released {:?} ({} notifiers left)", id, dispatch.owner(), release.remaining);

        if release.remaining == 0 {
            registry::remove(&dispatch);
        }
        if release.retire {
            dispatch.teardown();
        }
    }
}

/// Cross-thread handle that raises events for one notifier.
///
/// Holds a weak reference: emitting after the notifier has been dropped does
/// nothing and returns false.
#[derive(Debug, Clone)]
pub struct Emitter {
    notifier: NotifierId,
    core: Weak<NotifierCore>,
}

impl Emitter {
    pub fn notifier_id(&self) -> NotifierId {
        self.notifier
    }

    /// True while the notifier exists and has not begun destruction
    pub fn is_alive(&self) -> bool {
        self.core.upgrade().is_some_and(|core| !core.is_retired())
    }

    pub fn emit(&self, id: NotificationId) -> bool {
        match self.core.upgrade() {
            Some(core) => {
                let event = NotificationEvent::new(id, &core);
                core.emit(event)
            }
            None => false,
        }
    }

    pub fn emit_with<T>(&self, id: NotificationId, payload: T) -> bool
    where
        T: Any + Send + Sync,
    {
        match self.core.upgrade() {
            Some(core) => {
                let event = NotificationEvent::new(id, &core).with_payload(payload);
                core.emit(event)
            }
            None => false,
        }
    }
}

/// Queue the destruction of `notifier` on its dispatch thread.
///
/// Ownership moves into the queue, so the notifier is dropped exactly once,
/// on the thread that created it, after every entry queued before this
/// request. Callable from any thread and from the notifier's own observers.
pub fn request_self_delete(notifier: Box<dyn Notifier>) {
    let core = Arc::clone(&notifier.async_notifier().core);
    debug!("Notifier {} requested deferred deletion", core.id);
    core.dispatch.enqueue(QueuedNotification::SelfDestroy {
        target: core.id,
        owner: notifier,
    });
}

/// Dispatch notifications for the calling thread.
///
/// On a thread with a background dispatch thread this returns once no
/// notifier remains bound to the thread and nothing is queued. On a thread
/// with a host event loop it pumps that loop until the host quits. Fails with
/// [`NotifyError::NoNotifiers`] on a thread that has neither.
pub fn run() -> NotifyResult<LoopOutcome> {
    let dispatch = registry::find_for_run()?;
    info!("Dispatching notifications on {:?} ({:?})", dispatch.owner(), dispatch.kind());

    let outcome = {
        let _retire = RetireOnExit { dispatch: &dispatch };
        dispatch.run_loop()?
    };

    info!(
        "Dispatch on {:?} finished: {} delivered, {} dropped while disabled, {} self-deleted",
        dispatch.owner(),
        outcome.delivered,
        outcome.dropped_disabled,
        outcome.self_deleted
    );
    Ok(outcome)
}

/// Unregisters and tears down a dispatch thread whose loop exit retired it,
/// whether `run_loop` returned or an observer panicked out of it
struct RetireOnExit<'a> {
    dispatch: &'a Arc<dyn DispatchThread>,
}

impl Drop for RetireOnExit<'_> {
    fn drop(&mut self) {
        if self.dispatch.is_retired() {
            registry::remove(self.dispatch);
            self.dispatch.teardown();
        }
    }
}

/// Identity of the calling thread, for comparison with
/// [`AsyncNotifier::dispatch_thread`]
pub fn current_thread() -> ThreadId {
    thread::current().id()
}
