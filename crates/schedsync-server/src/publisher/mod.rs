//! Asynchronous domain event publisher.
//!
//! Producers hand events to [`EventPublisher::publish`], which never
//! blocks: the message either lands in a bounded local queue or is refused
//! with [`ServiceError::Backpressure`] / [`ServiceError::ChannelClosed`].
//!
//! Once started, three tasks run in the background:
//!
//! ```text
//!  publish() ──try_send──▶ [bounded queue] ──▶ drain loop ──send──▶ BrokerProducer
//!                                                                        │
//!                                          ┌─────────────────────────────┴──┐
//!                                          ▼                                ▼
//!                                    success feed                      error feed
//!                                          │                                │
//!                                  delivery listener                failure listener
//!                                          └──────────▶ PublisherStats ◀────┘
//! ```
//!
//! The drain loop only waits for the producer to accept a message. Broker
//! acknowledgements and failures come back on the producer's feeds.
//!
//! Delivery is at-most-once. On shutdown the message being handed over
//! completes, messages still queued are dropped, and the producer is
//! closed, which settles whatever it already accepted.

mod broker;

pub use broker::{
    BrokerError, BrokerMessage, BrokerProducer, DeliveryFailure, DeliveryFeeds,
    KAFKA_JSON_CONTENT_TYPE, MemoryProducer, RestProxyProducer,
};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use schedsync_core::DomainEvent;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::signals::ShutdownHandle;

/// Default capacity of the local queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Publisher configuration.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Maximum number of queued, unsent messages.
    pub queue_capacity: usize,
    /// Optional prefix prepended to every topic (`{prefix}.{topic}`).
    pub topic_prefix: Option<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            topic_prefix: None,
        }
    }
}

impl PublisherConfig {
    /// Builder: set the queue capacity. Zero is raised to one.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Builder: set the topic prefix.
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = Some(prefix.into());
        self
    }
}

/// Monotonic publisher counters.
#[derive(Debug, Default)]
pub struct PublisherStats {
    enqueued: AtomicU64,
    rejected: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl PublisherStats {
    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> PublisherStatsSnapshot {
        PublisherStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStatsSnapshot {
    /// Messages accepted into the queue.
    pub enqueued: u64,
    /// Messages refused because the queue was full.
    pub rejected: u64,
    /// Messages the broker acknowledged.
    pub delivered: u64,
    /// Messages the broker failed.
    pub failed: u64,
    /// Messages still queued when the publisher stopped.
    pub dropped: u64,
}

/// Bounded, non-blocking event publisher.
pub struct EventPublisher {
    config: PublisherConfig,
    tx: mpsc::Sender<BrokerMessage>,
    rx: Mutex<Option<mpsc::Receiver<BrokerMessage>>>,
    producer: Arc<dyn BrokerProducer>,
    stats: Arc<PublisherStats>,
    stop: ShutdownHandle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventPublisher {
    /// Creates a publisher. Messages are queued but not forwarded until
    /// [`start`](Self::start) is called.
    ///
    /// Triggering `stop` from anywhere stops the publisher.
    pub fn new(
        producer: Arc<dyn BrokerProducer>,
        config: PublisherConfig,
        stop: ShutdownHandle,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            tx,
            rx: Mutex::new(Some(rx)),
            producer,
            stats: Arc::new(PublisherStats::default()),
            stop,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Queues an event for delivery without waiting.
    pub fn publish(&self, event: &DomainEvent) -> ServiceResult<()> {
        if self.stop.is_shutdown() {
            return Err(ServiceError::ChannelClosed);
        }

        let message = BrokerMessage::from_event(self.config.topic_prefix.as_deref(), event)?;
        match self.tx.try_send(message) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                trace!(topic = event.topic(), "event queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                Err(ServiceError::Backpressure)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ServiceError::ChannelClosed),
        }
    }

    /// Returns the counters.
    pub fn stats(&self) -> PublisherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Spawns the drain loop and the two delivery listeners.
    ///
    /// Calling this more than once has no effect.
    pub async fn start(&self) {
        let Some(rx) = self.rx.lock().await.take() else {
            warn!("event publisher already started");
            return;
        };

        let (feeds, delivered_rx, failed_rx) = DeliveryFeeds::new();

        let drain = tokio::spawn(drain_loop(
            rx,
            self.producer.clone(),
            self.stop.clone(),
            self.stats.clone(),
            feeds,
        ));
        let deliveries = tokio::spawn(count_deliveries(delivered_rx, self.stats.clone()));
        let failures = tokio::spawn(count_failures(failed_rx, self.stats.clone()));

        self.tasks
            .lock()
            .await
            .extend([drain, deliveries, failures]);
        info!(capacity = self.config.queue_capacity, "event publisher started");
    }

    /// Stops the publisher and waits for its tasks to finish.
    pub async fn shutdown(&self) {
        self.stop.trigger();

        // Never started: close the producer here.
        if let Some(mut rx) = self.rx.lock().await.take() {
            let dropped = discard_queued(&mut rx);
            self.stats.dropped.fetch_add(dropped, Ordering::Relaxed);
            self.producer.close().await;
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "publisher task failed");
            }
        }
        info!(stats = ?self.stats.snapshot(), "event publisher stopped");
    }
}

async fn drain_loop(
    mut rx: mpsc::Receiver<BrokerMessage>,
    producer: Arc<dyn BrokerProducer>,
    stop: ShutdownHandle,
    stats: Arc<PublisherStats>,
    feeds: DeliveryFeeds,
) {
    let stopped = stop.signal().wait();
    tokio::pin!(stopped);

    loop {
        tokio::select! {
            biased;
            _ = &mut stopped => break,
            message = rx.recv() => {
                let Some(message) = message else { break };
                let topic = message.topic.clone();
                if let Err(error) = producer.send(message, feeds.clone()).await {
                    feeds.failed(topic, error);
                }
            }
        }
    }

    let dropped = discard_queued(&mut rx);
    stats.dropped.fetch_add(dropped, Ordering::Relaxed);
    producer.close().await;
    debug!("drain loop stopped");
}

/// Closes the queue and discards what is left. Returns the count.
fn discard_queued(rx: &mut mpsc::Receiver<BrokerMessage>) -> u64 {
    rx.close();
    let mut dropped = 0;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!(dropped, "publisher stopped, dropping queued events");
    }
    dropped
}

async fn count_deliveries(mut feed: mpsc::UnboundedReceiver<String>, stats: Arc<PublisherStats>) {
    while let Some(topic) = feed.recv().await {
        stats.delivered.fetch_add(1, Ordering::Relaxed);
        trace!(topic = %topic, "event delivered");
    }
}

async fn count_failures(
    mut feed: mpsc::UnboundedReceiver<DeliveryFailure>,
    stats: Arc<PublisherStats>,
) {
    while let Some(failure) = feed.recv().await {
        stats.failed.fetch_add(1, Ordering::Relaxed);
        error!(topic = %failure.topic, error = %failure.error, "event delivery failed");
    }
}
