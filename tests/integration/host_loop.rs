//! Host Event Loop Integration Tests
//!
//! Notifiers created on a thread with an installed host loop deliver through
//! that loop, interleaved with the host's own messages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use asyncnotify::notifications::{
    self, registry, AsyncNotifier, DispatchKind, HostEventLoop, NotificationEvent, NotificationId,
};

const CHANGED: NotificationId = NotificationId::new("host.changed");

fn on_host_thread<F>(test: F)
where
    F: FnOnce(Arc<HostEventLoop>) + Send + 'static,
{
    thread::spawn(move || {
        let host = HostEventLoop::install();
        test(host);
        HostEventLoop::uninstall();
    })
    .join()
    .unwrap();
}

#[test]
fn test_notifications_interleave_with_host_messages() {
    on_host_thread(|host| {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let host_thread = thread::current().id();

        let notifier = AsyncNotifier::new();
        assert_eq!(notifier.dispatch_kind(), DispatchKind::HostLoop);
        notifier.enable_notification();
        {
            let log = Arc::clone(&log);
            notifier.add_observer(Arc::new(move |event: &NotificationEvent| {
                assert_eq!(thread::current().id(), host_thread);
                let value = event.payload_as::<u32>().copied().unwrap_or_default();
                log.lock().push(format!("{}:{}", event.id(), value));
            }));
        }

        let emitter = notifier.emitter();
        let handle = host.handle();
        let running_host = Arc::clone(&host);
        let producer_log = Arc::clone(&log);
        let producer = thread::spawn(move || {
            while !running_host.is_running() {
                thread::sleep(Duration::from_millis(1));
            }
            assert!(emitter.emit_with(CHANGED, 1_u32));
            assert!(handle.post_task(move || producer_log.lock().push("task".to_string())));
            assert!(emitter.emit_with(CHANGED, 2_u32));
            assert!(handle.quit());
        });

        let outcome = notifications::run().unwrap();
        producer.join().unwrap();

        assert_eq!(*log.lock(), vec!["host.changed:1", "task", "host.changed:2"]);
        assert_eq!(outcome.delivered, 2);
        // A notifier is still bound, so the loop exit does not retire
        assert!(!outcome.retire);
        assert!(registry::lookup(host_thread).is_some());
        drop(notifier);
        assert!(registry::lookup(host_thread).is_none());
    });
}

#[test]
fn test_run_without_notifiers_pumps_host_loop() {
    on_host_thread(|host| {
        let ran = Arc::new(AtomicUsize::new(0));
        let handle = host.handle();
        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            handle.post_task(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        handle.quit();

        let dispatch = notifications::make(true).unwrap();
        assert_eq!(dispatch.kind(), DispatchKind::HostLoop);

        let outcome = notifications::run().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.processed(), 0);
        assert!(outcome.retire);
        assert!(registry::lookup(thread::current().id()).is_none());
    });
}

#[test]
fn test_destruction_scrubs_host_queue_and_keeps_host_messages() {
    on_host_thread(|host| {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let hook_count = Arc::clone(&cleaned);
        let notifier = AsyncNotifier::with_cleanup(move |_: &NotificationEvent| {
            hook_count.fetch_add(1, Ordering::SeqCst);
        });
        notifier.enable_notification();

        let task_ran = Arc::new(AtomicUsize::new(0));
        let handle = host.handle();
        assert!(notifier.emit(CHANGED));
        {
            let task_ran = Arc::clone(&task_ran);
            handle.post_task(move || {
                task_ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(notifier.emit(CHANGED));
        assert_eq!(host.pending(), 3);

        drop(notifier);
        assert_eq!(cleaned.load(Ordering::SeqCst), 2);
        assert_eq!(host.pending(), 1);

        handle.quit();
        let outcome = notifications::run().unwrap();
        assert_eq!(outcome.delivered, 0);
        assert_eq!(task_ran.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn test_self_delete_through_host_loop() {
    on_host_thread(|host| {
        let notifier = AsyncNotifier::new();
        notifier.enable_notification();
        let seen = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&seen);
        notifier.add_observer(Arc::new(move |_: &NotificationEvent| {
            count.fetch_add(1, Ordering::SeqCst);
        }));

        let emitter = notifier.emitter();
        assert!(notifier.emit(CHANGED));
        notifications::request_self_delete(Box::new(notifier));
        host.handle().quit();

        let outcome = notifications::run().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.self_deleted, 1);
        assert!(outcome.retire);
        assert!(!emitter.is_alive());
        assert!(registry::lookup(thread::current().id()).is_none());
    });
}
