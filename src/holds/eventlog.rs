//! Kafka-compatible implementation of C4: the append-only, partitioned
//! event log.
//!
//! Builder, `FutureProducer`, `StreamConsumer` spawned onto a forwarding
//! `mpsc` channel with manual offset commit after successful delivery.
//! Payload encoding uses JSON (`serde_json`).

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::adapters::EventPublisher;
use super::error::HoldError;

pub struct KafkaEventLog {
    producer: FutureProducer,
    send_timeout: Duration,
}

pub struct KafkaEventLogBuilder {
    brokers: String,
    client_id: String,
    send_timeout: Duration,
}

impl KafkaEventLogBuilder {
    pub fn new(brokers: impl Into<String>) -> Self {
        KafkaEventLogBuilder {
            brokers: brokers.into(),
            client_id: "seat-hold-service".to_string(),
            send_timeout: Duration::from_secs(5),
        }
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<KafkaEventLog, HoldError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| HoldError::EventLog(e.to_string()))?;
        Ok(KafkaEventLog {
            producer,
            send_timeout: self.send_timeout,
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaEventLog {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: serde_json::Value,
    ) -> Result<(), HoldError> {
        let body = serde_json::to_vec(&payload).map_err(|e| HoldError::System(e.to_string()))?;
        let record = FutureRecord::to(topic).payload(&body).key(partition_key);
        self.producer
            .send(record, rdkafka::util::Timeout::After(self.send_timeout))
            .await
            .map_err(|(e, _)| HoldError::EventLog(e.to_string()))?;
        Ok(())
    }
}

/// A decoded message handed to consumers of [`subscribe`].
pub struct ConsumedMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: serde_json::Value,
    ack_tx: Option<oneshot::Sender<bool>>,
}

impl ConsumedMessage {
    /// Signals that processing succeeded; the subscriber commits this
    /// message's offset.
    pub fn ack(mut self) {
        if let Some(tx) = self.ack_tx.take() {
            let _ = tx.send(true);
        }
    }

    /// Signals that processing failed; the subscriber leaves the offset
    /// uncommitted so the broker redelivers this message (the
    /// at-least-once guarantee).
    pub fn nack(mut self) {
        if let Some(tx) = self.ack_tx.take() {
            let _ = tx.send(false);
        }
    }
}

impl Drop for ConsumedMessage {
    fn drop(&mut self) {
        // Neither ack() nor nack() was called (handler panicked or was
        // dropped without deciding): default to nack so the message is
        // redelivered instead of silently lost.
        if let Some(tx) = self.ack_tx.take() {
            let _ = tx.send(false);
        }
    }
}

/// Subscribes to `topic` with manual offset commit: the consumer task
/// forwards each decoded message to `out` alongside a companion ack, then
/// waits for the caller to call [`ConsumedMessage::ack`] (or drop it /
/// call [`ConsumedMessage::nack`]) before committing the offset. This is
/// what makes redelivery on processing failure real: an unacked message's
/// offset is never committed, so the broker redelivers it on next poll.
///
/// Returns a join handle the caller can abort to drain the subscription.
pub fn subscribe(
    brokers: &str,
    group_id: &str,
    topic: &str,
) -> Result<(mpsc::Receiver<ConsumedMessage>, tokio::task::JoinHandle<()>), HoldError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()
        .map_err(|e| HoldError::EventLog(e.to_string()))?;
    consumer
        .subscribe(&[topic])
        .map_err(|e| HoldError::EventLog(e.to_string()))?;

    let (tx, rx) = mpsc::channel(256);
    let topic = topic.to_string();
    let handle = tokio::spawn(async move {
        loop {
            match consumer.recv().await {
                Ok(message) => {
                    let payload = message.payload().and_then(|p| serde_json::from_slice(p).ok());
                    let Some(payload) = payload else {
                        tracing::warn!(topic = %topic, "malformed event-log payload, acking and dropping");
                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            tracing::warn!(error = %e, "failed to commit offset for malformed message");
                        }
                        continue;
                    };
                    let key = message.key().map(|k| String::from_utf8_lossy(k).into_owned());
                    let (ack_tx, ack_rx) = oneshot::channel();
                    let consumed = ConsumedMessage {
                        topic: topic.clone(),
                        key,
                        payload,
                        ack_tx: Some(ack_tx),
                    };
                    if tx.send(consumed).await.is_err() {
                        break; // receiver dropped, shut the task down
                    }
                    match ack_rx.await {
                        Ok(true) => {
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(error = %e, "failed to commit offset");
                            }
                        }
                        Ok(false) => {
                            tracing::warn!(
                                topic = %topic,
                                "message processing failed, leaving offset uncommitted for redelivery"
                            );
                        }
                        Err(_) => {
                            tracing::warn!(
                                topic = %topic,
                                "ack channel dropped without a decision, leaving offset uncommitted for redelivery"
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "kafka consumer recv error");
                }
            }
        }
    });
    Ok((rx, handle))
}
