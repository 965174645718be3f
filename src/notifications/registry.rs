//! Dispatch Thread Registry
//!
//! Process-wide map from thread identity to that thread's dispatch thread.
//! The registry lock is held only for lookup, insert and removal. It is never
//! held while calling into a dispatch thread, so it never nests with a queue
//! lock.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::thread::{self, ThreadId};

use log::debug;
use parking_lot::Mutex;

use crate::notifications::dispatch;
use crate::notifications::error::{NotifyError, NotifyResult};
use crate::notifications::traits::DispatchThread;

type Threads = HashMap<ThreadId, Arc<dyn DispatchThread>>;

static THREADS: LazyLock<Mutex<Threads>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// The calling thread's dispatch thread, created if this is the first
/// notifier on the thread. The caller is responsible for `add_ref`.
pub(crate) fn find_or_create() -> Arc<dyn DispatchThread> {
    let thread_id = thread::current().id();
    let mut threads = THREADS.lock();
    if let Some(existing) = threads.get(&thread_id) {
        return Arc::clone(existing);
    }

    let created = dispatch::make_any();
    threads.insert(thread_id, Arc::clone(&created));
    debug!("Registered {:?} dispatch thread for {:?}", created.kind(), thread_id);
    created
}

/// The dispatch thread `run` should drive on the calling thread.
///
/// A thread that never hosted a notifier only qualifies when it has a host
/// event loop to delegate to.
pub(crate) fn find_for_run() -> NotifyResult<Arc<dyn DispatchThread>> {
    let thread_id = thread::current().id();
    let mut threads = THREADS.lock();
    if let Some(existing) = threads.get(&thread_id) {
        return Ok(Arc::clone(existing));
    }

    match dispatch::make(true) {
        Ok(created) => {
            threads.insert(thread_id, Arc::clone(&created));
            Ok(created)
        }
        Err(NotifyError::HostLoopRequired { thread }) => Err(NotifyError::NoNotifiers { thread }),
        Err(e) => Err(e),
    }
}

/// Dispatch thread registered for `thread_id`
pub fn lookup(thread_id: ThreadId) -> Option<Arc<dyn DispatchThread>> {
    THREADS.lock().get(&thread_id).cloned()
}

/// Remove `dispatch` if it is still the registered instance for its owner.
/// Returns whether an entry was removed.
pub(crate) fn remove(dispatch: &Arc<dyn DispatchThread>) -> bool {
    let owner = dispatch.owner();
    let mut threads = THREADS.lock();
    let registered = threads
        .get(&owner)
        .is_some_and(|entry| same_instance(entry, dispatch));

    if registered {
        threads.remove(&owner);
        debug!("Unregistered dispatch thread for {:?}", owner);
    }
    registered
}

fn same_instance(a: &Arc<dyn DispatchThread>, b: &Arc<dyn DispatchThread>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Number of threads with a registered dispatch thread
pub fn len() -> usize {
    THREADS.lock().len()
}

pub fn is_empty() -> bool {
    THREADS.lock().is_empty()
}

/// Threads with a registered dispatch thread
pub fn threads() -> Vec<ThreadId> {
    THREADS.lock().keys().copied().collect()
}
