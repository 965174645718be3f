//! Notification Event Types
//!
//! A [`NotificationEvent`] is the immutable value handed to observers. The
//! dispatch queue stores [`QueuedNotification`]s, which either carry an event
//! for delivery or own a notifier that asked to be destroyed.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::notifications::notifier::{Notifier, NotifierCore};

/// Identifies the kind of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(&'static str);

impl NotificationId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Names the read-only dispatch thread attribute of every notifier, whose
/// value is [`AsyncNotifier::dispatch_thread`]. The attribute never changes
/// after construction, so nothing is ever emitted under this id.
///
/// [`AsyncNotifier::dispatch_thread`]: crate::notifications::AsyncNotifier::dispatch_thread
pub const DISPATCH_THREAD_ID: NotificationId = NotificationId::new("async_notifier.dispatch_thread");

/// Unique identity of a notifier for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotifierId(u64);

impl NotifierId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NotifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque event data shared between the emitter and every observer
pub type Payload = Arc<dyn Any + Send + Sync>;

/// An event raised by a notifier
#[derive(Clone)]
pub struct NotificationEvent {
    id: NotificationId,
    raised_by: NotifierId,
    notifier: Weak<NotifierCore>,
    payload: Option<Payload>,
}

impl NotificationEvent {
    pub(crate) fn new(id: NotificationId, core: &Arc<NotifierCore>) -> Self {
        Self {
            id,
            raised_by: core.id(),
            notifier: Arc::downgrade(core),
            payload: None,
        }
    }

    /// Attach payload data to the event
    pub fn with_payload<T: Any + Send + Sync>(mut self, payload: T) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// Attach an already shared payload
    pub fn with_shared_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn id(&self) -> NotificationId {
        self.id
    }

    /// The notifier that raised this event
    pub fn notifier_id(&self) -> NotifierId {
        self.raised_by
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Borrow the payload as a concrete type
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }

    /// Upgrade the back-reference; `None` once the notifier is gone
    pub(crate) fn core(&self) -> Option<Arc<NotifierCore>> {
        self.notifier.upgrade()
    }
}

impl fmt::Debug for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationEvent")
            .field("id", &self.id)
            .field("notifier", &self.raised_by)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// An entry in a dispatch thread's queue
pub enum QueuedNotification {
    /// Deliver the event to the observers of the notifier that raised it
    Deliver(NotificationEvent),

    /// Destroy the owned notifier on its dispatch thread
    SelfDestroy {
        target: NotifierId,
        owner: Box<dyn Notifier>,
    },
}

impl QueuedNotification {
    /// The notifier this entry is addressed to
    pub fn target(&self) -> NotifierId {
        match self {
            QueuedNotification::Deliver(event) => event.notifier_id(),
            QueuedNotification::SelfDestroy { target, .. } => *target,
        }
    }

    pub fn is_self_destroy(&self) -> bool {
        matches!(self, QueuedNotification::SelfDestroy { .. })
    }
}

impl fmt::Debug for QueuedNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueuedNotification::Deliver(event) => f.debug_tuple("Deliver").field(event).finish(),
            QueuedNotification::SelfDestroy { target, .. } => {
                f.debug_struct("SelfDestroy").field("target", target).finish()
            }
        }
    }
}
