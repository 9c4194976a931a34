//! Delivery worker pool.
//!
//! Named OS threads pull destination triggers from a shared flume channel
//! and run delivery passes. Different destinations are delivered in
//! parallel; passes for one destination are serialised by its
//! [`MessageDeliveryInfo`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info};

use crate::core::delivery::buffer::MessageDeliveryInfo;
use crate::core::delivery::DeliveryStrategy;

type Destinations = Arc<DashMap<String, Arc<MessageDeliveryInfo>>>;

pub struct DeliveryWorkerPool {
    destinations: Destinations,
    triggers: Sender<String>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl DeliveryWorkerPool {
    pub fn start(
        strategy: Arc<dyn DeliveryStrategy>,
        threads: usize,
        idle_poll: Duration,
    ) -> std::io::Result<Self> {
        let destinations: Destinations = Arc::new(DashMap::new());
        let (triggers, rx) = flume::unbounded::<String>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let rx = rx.clone();
            let strategy = Arc::clone(&strategy);
            let destinations = Arc::clone(&destinations);
            let shutdown = Arc::clone(&shutdown);

            let handle = thread::Builder::new()
                .name(format!("delivery-{i}"))
                .spawn(move || {
                    delivery_thread_loop(i, rx, strategy, destinations, shutdown, idle_poll);
                })?;
            handles.push(handle);
        }

        Ok(Self {
            destinations,
            triggers,
            shutdown,
            handles,
        })
    }

    /// Makes a destination known to the pool, returning the registered info.
    pub fn register(&self, info: Arc<MessageDeliveryInfo>) -> Arc<MessageDeliveryInfo> {
        self.destinations
            .entry(info.destination().to_string())
            .or_insert(info)
            .clone()
    }

    pub fn destination(&self, name: &str) -> Option<Arc<MessageDeliveryInfo>> {
        self.destinations.get(name).map(|entry| Arc::clone(&*entry))
    }

    /// Asks for a delivery pass on `destination`, e.g. after a message
    /// arrival or a subscriber drain. Idle workers also re-run passes for
    /// every destination that still has buffered messages, once per
    /// `idle_poll`.
    pub fn trigger(&self, destination: &str) {
        if self.triggers.send(destination.to_string()).is_err() {
            debug!(target: "tidemq::delivery", destination, "worker pool stopped; trigger ignored");
        }
    }

    /// Stops the workers and waits for in-progress passes to finish.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        drop(self.triggers);
        for handle in self.handles {
            if handle.join().is_err() {
                error!(target: "tidemq::delivery", "delivery thread panicked");
            }
        }
    }
}

fn delivery_thread_loop(
    thread_id: usize,
    rx: Receiver<String>,
    strategy: Arc<dyn DeliveryStrategy>,
    destinations: Destinations,
    shutdown: Arc<AtomicBool>,
    idle_poll: Duration,
) {
    info!(target: "tidemq::delivery", thread_id, "delivery thread starting");
    let mut scheduled_total = 0u64;

    while !shutdown.load(Ordering::Relaxed) {
        let destination = match rx.recv_timeout(idle_poll) {
            Ok(destination) => destination,
            Err(RecvTimeoutError::Timeout) => {
                // Destinations stopped on backpressure resume once a slot frees up.
                let stalled: Vec<_> = destinations
                    .iter()
                    .filter(|entry| !entry.read_but_undelivered_messages().is_empty())
                    .map(|entry| Arc::clone(entry.value()))
                    .collect();
                for info in stalled {
                    scheduled_total += run_passes(strategy.as_ref(), &info);
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let Some(info) = destinations.get(&destination).map(|entry| Arc::clone(&*entry)) else {
            debug!(target: "tidemq::delivery", destination = %destination, "trigger for unknown destination");
            continue;
        };
        scheduled_total += run_passes(strategy.as_ref(), &info);
    }

    info!(
        target: "tidemq::delivery",
        thread_id,
        scheduled = scheduled_total,
        "delivery thread shutting down"
    );
}

fn run_passes(strategy: &dyn DeliveryStrategy, info: &MessageDeliveryInfo) -> u64 {
    let mut scheduled = 0u64;
    loop {
        match strategy.deliver(info) {
            Ok(n) => scheduled += n as u64,
            Err(e) => {
                error!(
                    target: "tidemq::delivery",
                    destination = info.destination(),
                    error = %e,
                    "delivery pass failed"
                );
                break;
            }
        }
        // A refused attempt is picked up by whichever pass holds the guard.
        if !info.has_pending_pass() || info.is_pass_running() {
            break;
        }
    }
    scheduled
}
