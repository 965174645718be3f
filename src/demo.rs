//! Multi-producer demonstration
//!
//! A counter bound to the calling thread receives ticks from several
//! producer threads. Once every producer has reported completion the
//! counter's observer asks for the counter to be deleted, which lets the
//! dispatch loop return.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::notifications::{
    self, AsyncNotifier, Emitter, NotificationEvent, NotificationId, Notifier, Observer,
};

/// One unit of work reported by a producer
pub const TICK: NotificationId = NotificationId::new("demo.tick");

/// A producer has sent all its ticks
pub const PRODUCER_FINISHED: NotificationId = NotificationId::new("demo.producer_finished");

/// Demonstration settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoConfig {
    pub producers: usize,
    pub events: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            producers: 4,
            events: 25,
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.producers == 0 {
            anyhow::bail!("producers must be at least 1");
        }
        Ok(())
    }
}

/// What the dispatch thread observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoSummary {
    /// Ticks received from each producer
    pub received: Vec<usize>,
    /// Every producer's ticks arrived in the order it sent them
    pub in_order: bool,
    /// Every observer call ran on the dispatch thread
    pub on_dispatch_thread: bool,
    /// Events delivered by the dispatch loop
    pub delivered: u64,
    /// Events passed to the cleanup hook
    pub cleaned: u64,
}

impl DemoSummary {
    pub fn total_received(&self) -> usize {
        self.received.iter().sum()
    }
}

#[derive(Debug, Clone, Copy)]
struct Tick {
    producer: usize,
    sequence: usize,
}

/// Object that embeds a notifier
struct WorkCounter {
    notifier: AsyncNotifier,
}

impl Notifier for WorkCounter {
    fn async_notifier(&self) -> &AsyncNotifier {
        &self.notifier
    }
}

struct Tally {
    next_sequence: Vec<usize>,
    finished: usize,
    in_order: bool,
    off_thread: usize,
}

/// Observer that counts ticks and deletes the counter once all producers
/// are done
struct TallyObserver {
    dispatch_thread: ThreadId,
    tally: Mutex<Tally>,
    counter: Mutex<Option<Box<dyn Notifier>>>,
}

impl TallyObserver {
    fn new(dispatch_thread: ThreadId, producers: usize) -> Self {
        Self {
            dispatch_thread,
            tally: Mutex::new(Tally {
                next_sequence: vec![0; producers],
                finished: 0,
                in_order: true,
                off_thread: 0,
            }),
            counter: Mutex::new(None),
        }
    }

    fn summary(&self) -> (Vec<usize>, bool, bool) {
        let tally = self.tally.lock();
        (tally.next_sequence.clone(), tally.in_order, tally.off_thread == 0)
    }
}

impl Observer for TallyObserver {
    fn notification(&self, event: &NotificationEvent) {
        let mut guard = self.tally.lock();
        let tally = &mut *guard;
        if thread::current().id() != self.dispatch_thread {
            tally.off_thread += 1;
        }

        if event.id() == TICK {
            let Some(tick) = event.payload_as::<Tick>() else {
                warn!("Tick without payload from notifier {}", event.notifier_id());
                return;
            };
            if let Some(expected) = tally.next_sequence.get_mut(tick.producer) {
                if tick.sequence != *expected {
                    tally.in_order = false;
                }
                *expected = tick.sequence + 1;
            }
        } else if event.id() == PRODUCER_FINISHED {
            tally.finished += 1;
            if tally.finished == tally.next_sequence.len() {
                drop(guard);
                if let Some(counter) = self.counter.lock().take() {
                    debug!("All producers finished, deleting counter");
                    notifications::request_self_delete(counter);
                }
            }
        }
    }
}

fn spawn_producer(index: usize, events: usize, emitter: Emitter) -> Result<thread::JoinHandle<usize>> {
    thread::Builder::new()
        .name(format!("producer-{}", index))
        .spawn(move || {
            let mut sent = 0;
            for sequence in 0..events {
                if emitter.emit_with(TICK, Tick { producer: index, sequence }) {
                    sent += 1;
                }
            }
            emitter.emit(PRODUCER_FINISHED);
            debug!("Producer {} sent {} ticks", index, sent);
            sent
        })
        .with_context(|| format!("Failed to spawn producer {}", index))
}

/// Run the demonstration with the calling thread as dispatch thread
pub fn run_demo(config: &DemoConfig) -> Result<DemoSummary> {
    config.validate()?;

    let dispatch_thread = thread::current().id();
    let cleaned = Arc::new(AtomicU64::new(0));
    let hook_count = Arc::clone(&cleaned);

    let counter = WorkCounter {
        notifier: AsyncNotifier::with_cleanup(move |_: &NotificationEvent| {
            hook_count.fetch_add(1, Ordering::Relaxed);
        }),
    };
    let observer = Arc::new(TallyObserver::new(dispatch_thread, config.producers));
    counter.notifier.add_observer(observer.clone()).enable_notification();
    let emitter = counter.notifier.emitter();
    *observer.counter.lock() = Some(Box::new(counter));

    info!(
        "Starting {} producers with {} events each on {:?}",
        config.producers, config.events, dispatch_thread
    );
    let producers = (0..config.producers)
        .map(|index| spawn_producer(index, config.events, emitter.clone()))
        .collect::<Result<Vec<_>>>()?;

    let outcome = notifications::run().context("Dispatch loop failed")?;

    for producer in producers {
        if producer.join().is_err() {
            anyhow::bail!("A producer thread panicked");
        }
    }

    let (received, in_order, on_dispatch_thread) = observer.summary();
    Ok(DemoSummary {
        received,
        in_order,
        on_dispatch_thread,
        delivered: outcome.delivered,
        cleaned: cleaned.load(Ordering::Relaxed),
    })
}
