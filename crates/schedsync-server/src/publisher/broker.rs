//! Message broker producers.
//!
//! A producer accepts a message and reports its outcome later on the
//! [`DeliveryFeeds`] handed in with it. [`RestProxyProducer`] posts records
//! to a Kafka-compatible HTTP proxy (Redpanda/Confluent REST proxy v2) from
//! its own worker task. [`MemoryProducer`] keeps messages in memory for
//! local runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use schedsync_calendar::BoxFuture;
use schedsync_core::DomainEvent;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

/// Content type of the REST proxy v2 JSON embedded format.
pub const KAFKA_JSON_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

/// Messages a [`RestProxyProducer`] holds before `send` starts waiting.
const MAX_IN_FLIGHT: usize = 64;

/// Errors returned by producers.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The request never reached the broker.
    #[error("broker unreachable: {0}")]
    Transport(String),

    /// The broker answered with a failure status.
    #[error("broker rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The producer was closed.
    #[error("producer closed")]
    Closed,
}

/// A message ready for the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Value,
}

impl BrokerMessage {
    /// Creates a message.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload,
        }
    }

    /// Builder: set the partition key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Builds the message for a domain event, prefixing the topic if set.
    pub fn from_event(prefix: Option<&str>, event: &DomainEvent) -> serde_json::Result<Self> {
        let topic = match prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}.{}", event.topic()),
            _ => event.topic().to_string(),
        };
        Ok(Self::new(topic, event.to_json()?).with_key(event.partition_key()))
    }
}

/// A failed delivery, reported on the error feed.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub topic: String,
    pub error: BrokerError,
}

/// Success and error feeds a producer reports outcomes on.
///
/// The receiving ends finish once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct DeliveryFeeds {
    delivered: mpsc::UnboundedSender<String>,
    failed: mpsc::UnboundedSender<DeliveryFailure>,
}

impl DeliveryFeeds {
    /// Creates the feeds and their receiving ends (success, error).
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedReceiver<DeliveryFailure>,
    ) {
        let (delivered, delivered_rx) = mpsc::unbounded_channel();
        let (failed, failed_rx) = mpsc::unbounded_channel();
        (Self { delivered, failed }, delivered_rx, failed_rx)
    }

    /// Reports an acknowledged message.
    pub fn delivered(&self, topic: String) {
        let _ = self.delivered.send(topic);
    }

    /// Reports a message the broker did not take.
    pub fn failed(&self, topic: String, error: BrokerError) {
        let _ = self.failed.send(DeliveryFailure { topic, error });
    }
}

/// Asynchronous send path of a message broker client.
pub trait BrokerProducer: Send + Sync {
    /// Hands one message to the producer.
    ///
    /// Resolves once the producer has accepted the message, not when the
    /// broker acknowledges it. The outcome arrives on `feeds`. An error
    /// means the message was not accepted and nothing is reported for it.
    fn send(
        &self,
        message: BrokerMessage,
        feeds: DeliveryFeeds,
    ) -> BoxFuture<'_, Result<(), BrokerError>>;

    /// Stops accepting messages and waits until every accepted one has
    /// been reported. Later sends fail with [`BrokerError::Closed`].
    fn close(&self) -> BoxFuture<'_, ()>;
}

type Pending = (BrokerMessage, DeliveryFeeds);

enum Lane {
    Idle,
    Running {
        queue: mpsc::Sender<Pending>,
        worker: JoinHandle<()>,
    },
    Closed,
}

/// Producer posting to a Kafka REST proxy.
///
/// Accepted messages are posted one at a time, in acceptance order, by a
/// worker spawned on the first send.
pub struct RestProxyProducer {
    client: Arc<RestProxyClient>,
    lane: Mutex<Lane>,
}

struct RestProxyClient {
    base_url: String,
    http: reqwest::Client,
}

impl RestProxyProducer {
    /// Creates a producer for the proxy at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BrokerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        Ok(Self::with_client(base_url, http))
    }

    /// Creates a producer with a custom HTTP client.
    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Arc::new(RestProxyClient { base_url, http }),
            lane: Mutex::new(Lane::Idle),
        }
    }

    async fn queue(&self) -> Result<mpsc::Sender<Pending>, BrokerError> {
        let mut lane = self.lane.lock().await;
        if let Lane::Idle = *lane {
            let (queue, rx) = mpsc::channel(MAX_IN_FLIGHT);
            let worker = tokio::spawn(post_in_order(self.client.clone(), rx));
            *lane = Lane::Running { queue, worker };
        }
        match &*lane {
            Lane::Running { queue, .. } => Ok(queue.clone()),
            Lane::Idle | Lane::Closed => Err(BrokerError::Closed),
        }
    }
}

impl RestProxyClient {
    fn records_body(message: &BrokerMessage) -> Value {
        match &message.key {
            Some(key) => json!({"records": [{"key": key, "value": message.payload}]}),
            None => json!({"records": [{"value": message.payload}]}),
        }
    }

    async fn post(&self, message: &BrokerMessage) -> Result<(), BrokerError> {
        let url = format!(
            "{}/topics/{}",
            self.base_url,
            urlencoding::encode(&message.topic)
        );
        let body = serde_json::to_vec(&Self::records_body(message))
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        trace!(topic = %message.topic, "posting record");
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, KAFKA_JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

async fn post_in_order(client: Arc<RestProxyClient>, mut queue: mpsc::Receiver<Pending>) {
    while let Some((message, feeds)) = queue.recv().await {
        match client.post(&message).await {
            Ok(()) => {
                debug!(topic = %message.topic, "record delivered");
                feeds.delivered(message.topic);
            }
            Err(error) => feeds.failed(message.topic, error),
        }
    }
}

impl BrokerProducer for RestProxyProducer {
    fn send(
        &self,
        message: BrokerMessage,
        feeds: DeliveryFeeds,
    ) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(async move {
            let queue = self.queue().await?;
            queue
                .send((message, feeds))
                .await
                .map_err(|_| BrokerError::Closed)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let lane = std::mem::replace(&mut *self.lane.lock().await, Lane::Closed);
            if let Lane::Running { queue, worker } = lane {
                drop(queue);
                if let Err(e) = worker.await {
                    error!(error = %e, "rest proxy worker failed");
                }
            }
        })
    }
}

/// Producer that keeps delivered messages in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryProducer {
    messages: Arc<Mutex<Vec<BrokerMessage>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryProducer {
    /// Creates an empty producer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the delivered messages in delivery order.
    pub async fn messages(&self) -> Vec<BrokerMessage> {
        self.messages.lock().await.clone()
    }

    /// Returns true once the producer has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl BrokerProducer for MemoryProducer {
    fn send(
        &self,
        message: BrokerMessage,
        feeds: DeliveryFeeds,
    ) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(BrokerError::Closed);
            }
            let topic = message.topic.clone();
            self.messages.lock().await.push(message);
            feeds.delivered(topic);
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
        })
    }
}
