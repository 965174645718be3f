//! Thread-Affine Asynchronous Notification
//!
//! Objects embedding an [`AsyncNotifier`] may raise events from any thread,
//! but their observers are always called on the thread that created the
//! notifier, one event at a time, in arrival order.
//!
//! # Architecture
//!
//! - **AsyncNotifier**: raises events and owns the observer list
//! - **DispatchThread**: per-thread queue, either a background loop entered
//!   through [`run`] or a host event loop the thread already pumps
//! - **Registry**: process-wide map from thread to dispatch thread
//! - **Events**: [`NotificationEvent`] values carrying an id and optional payload
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use asyncnotify::notifications::{self, AsyncNotifier, NotificationEvent, NotificationId};
//!
//! const SAVED: NotificationId = NotificationId::new("document.saved");
//!
//! let document = AsyncNotifier::new();
//! document.enable_notification();
//! document.add_observer(Arc::new(|event: &NotificationEvent| {
//!     let path = event.payload_as::<String>();
//!     println!("saved {:?}", path);
//! }));
//!
//! document.emit_with(SAVED, String::from("notes.txt"));
//! notifications::request_self_delete(Box::new(document));
//!
//! let outcome = notifications::run().unwrap();
//! assert_eq!(outcome.delivered, 1);
//! ```

pub mod background;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod host_loop;
pub mod notifier;
pub mod registry;
pub mod traits;


// Re-export core types for convenience
pub use dispatch::{configure, make, DispatchConfig};
pub use error::{NotifyError, NotifyResult};
pub use events::{NotificationEvent, NotificationId, NotifierId, Payload, DISPATCH_THREAD_ID};
pub use host_loop::{HostEventLoop, HostLoopHandle};
pub use notifier::{current_thread, request_self_delete, run, AsyncNotifier, Emitter, Notifier};
pub use traits::{CleanupHook, DispatchKind, DispatchState, DispatchThread, LoopOutcome, NoCleanup, Observer};
