//! Notifier & Dispatch Thread Lifecycle Tests
//!
//! End-to-end behaviour of background dispatch threads: binding, delivery on
//! the owning thread, deferred deletion and retirement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use asyncnotify::notifications::{
    self, registry, AsyncNotifier, DispatchConfig, NotificationEvent, NotificationId, Notifier,
};

const STEP: NotificationId = NotificationId::new("lifecycle.step");
const STOP: NotificationId = NotificationId::new("lifecycle.stop");

/// A document type that embeds its notifier
struct Document {
    title: String,
    notifier: AsyncNotifier,
}

impl Notifier for Document {
    fn async_notifier(&self) -> &AsyncNotifier {
        &self.notifier
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        DROPPED_ON.lock().push((self.title.clone(), thread::current().id()));
    }
}

static DROPPED_ON: Mutex<Vec<(String, ThreadId)>> = Mutex::new(Vec::new());

fn dropped_on(title: &str) -> Option<ThreadId> {
    DROPPED_ON
        .lock()
        .iter()
        .find(|(t, _)| t == title)
        .map(|(_, thread)| *thread)
}

#[test]
fn test_every_notifier_self_deletes_then_run_returns() {
    thread::spawn(|| {
        let owner = thread::current().id();
        let slots: Vec<Arc<Mutex<Option<Box<dyn Notifier>>>>> =
            (0..5).map(|_| Arc::new(Mutex::new(None))).collect();
        let mut emitters = Vec::new();

        for (index, slot) in slots.iter().enumerate() {
            let document = Document {
                title: format!("doc-{}", index),
                notifier: AsyncNotifier::new(),
            };
            document.notifier.enable_notification();

            let own_slot = Arc::clone(slot);
            document.notifier.add_observer(Arc::new(move |event: &NotificationEvent| {
                if event.id() == STOP {
                    if let Some(doc) = own_slot.lock().take() {
                        notifications::request_self_delete(doc);
                    }
                }
            }));
            emitters.push(document.notifier.emitter());
            *slot.lock() = Some(Box::new(document));
        }

        assert_eq!(registry::lookup(owner).unwrap().ref_count(), 5);

        let producer = thread::spawn(move || {
            for emitter in emitters.iter().rev() {
                assert!(emitter.emit(STEP));
                assert!(emitter.emit(STOP));
            }
        });

        let outcome = notifications::run().unwrap();
        producer.join().unwrap();

        assert_eq!(outcome.delivered, 10);
        assert_eq!(outcome.self_deleted, 5);
        assert!(outcome.retire);
        assert!(registry::lookup(owner).is_none());
        for index in 0..5 {
            assert_eq!(dropped_on(&format!("doc-{}", index)), Some(owner));
        }
    })
    .join()
    .unwrap();
}

#[test]
fn test_independent_dispatch_threads_deliver_to_their_own_owner() {
    let received: Arc<Mutex<Vec<(String, ThreadId)>>> = Arc::new(Mutex::new(Vec::new()));
    let (ready_tx, ready_rx) = crossbeam_channel::unbounded();

    let owners: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|name| {
            let received = Arc::clone(&received);
            let ready_tx = ready_tx.clone();
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || {
                    let slot: Arc<Mutex<Option<Box<dyn Notifier>>>> = Arc::new(Mutex::new(None));
                    let notifier = AsyncNotifier::new();
                    notifier.enable_notification();

                    let own_slot = Arc::clone(&slot);
                    notifier.add_observer(Arc::new(move |event: &NotificationEvent| {
                        let current = thread::current();
                        received
                            .lock()
                            .push((current.name().unwrap_or_default().to_string(), current.id()));
                        if event.id() == STOP {
                            if let Some(n) = own_slot.lock().take() {
                                notifications::request_self_delete(n);
                            }
                        }
                    }));

                    ready_tx.send((name, notifier.emitter())).unwrap();
                    *slot.lock() = Some(Box::new(notifier));
                    let outcome = notifications::run().unwrap();
                    (thread::current().id(), outcome.delivered)
                })
                .unwrap()
        })
        .collect();
    drop(ready_tx);

    // One producer emits for both owners
    let emitters: Vec<_> = ready_rx.iter().take(2).collect();
    for _ in 0..3 {
        for (_, emitter) in &emitters {
            assert!(emitter.emit(STEP));
        }
    }
    for (_, emitter) in &emitters {
        assert!(emitter.emit(STOP));
    }

    let results: Vec<(ThreadId, u64)> = owners.into_iter().map(|h| h.join().unwrap()).collect();
    for (_, delivered) in &results {
        assert_eq!(*delivered, 4);
    }

    let received = received.lock();
    assert_eq!(received.len(), 8);
    for (name, thread_id) in received.iter() {
        let index = if name == "left" { 0 } else { 1 };
        assert_eq!(*thread_id, results[index].0, "{} delivered on a foreign thread", name);
    }
}

#[test]
fn test_observer_added_during_delivery_sees_next_event_only() {
    thread::spawn(|| {
        let late_calls = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(Mutex::new(None::<Box<dyn Notifier>>));

        let document = AsyncNotifier::new();
        document.enable_notification();
        {
            let late_calls = Arc::clone(&late_calls);
            let notifier = Arc::clone(&notifier);
            document.add_observer(Arc::new(move |event: &NotificationEvent| {
                let slot = notifier.lock();
                let Some(owner) = slot.as_ref() else { return };
                if event.id() == STEP && owner.async_notifier().observer_count() == 1 {
                    let late_calls = Arc::clone(&late_calls);
                    owner.async_notifier().add_observer(Arc::new(move |_: &NotificationEvent| {
                        late_calls.fetch_add(1, Ordering::SeqCst);
                    }));
                }
                if event.id() == STOP {
                    drop(slot);
                    if let Some(owner) = notifier.lock().take() {
                        notifications::request_self_delete(owner);
                    }
                }
            }));
        }

        document.emit(STEP);
        document.emit(STOP);
        *notifier.lock() = Some(Box::new(document));

        let outcome = notifications::run().unwrap();
        assert_eq!(outcome.delivered, 2);
        // Added while STEP was being delivered, so only STOP reached it
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    })
    .join()
    .unwrap();
}

#[test]
fn test_wait_timeout_keeps_loop_responsive() {
    thread::spawn(|| {
        notifications::configure(DispatchConfig {
            wait_timeout: Some(Duration::from_millis(5)),
        });

        let owner = thread::current().id();
        let notifier = AsyncNotifier::new();
        notifier.enable_notification();
        let delivered = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&delivered);
        notifier.add_observer(Arc::new(move |_: &NotificationEvent| {
            count.fetch_add(1, Ordering::SeqCst);
        }));

        let emitter = notifier.emitter();
        let deleter = thread::spawn(move || {
            while !registry::lookup(owner).is_some_and(|d| d.is_running()) {
                thread::sleep(Duration::from_millis(1));
            }
            // Let the loop time out a few times before any work arrives
            thread::sleep(Duration::from_millis(30));
            assert!(emitter.emit(STEP));
            notifications::request_self_delete(Box::new(notifier));
        });

        let outcome = notifications::run().unwrap();
        deleter.join().unwrap();
        notifications::configure(DispatchConfig::default());

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.self_deleted, 1);
    })
    .join()
    .unwrap();
}

#[test]
fn test_second_run_after_retirement_reports_no_notifiers() {
    thread::spawn(|| {
        let notifier = AsyncNotifier::new();
        notifications::request_self_delete(Box::new(notifier));
        let outcome = notifications::run().unwrap();
        assert!(outcome.retire);

        let err = notifications::run().unwrap_err();
        assert!(matches!(err, notifications::NotifyError::NoNotifiers { .. }));
    })
    .join()
    .unwrap();
}
