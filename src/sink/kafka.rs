//! Kafka producer for the queue sink.
//!
//! Wraps an rdkafka `FutureProducer`. In asynchronous mode a send returns
//! once librdkafka has queued the message; the delivery report is awaited on
//! a background task that logs failures.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;

use crate::config::QueueSinkConfig;
use crate::sink::queue::{MessageProducer, PendingWrites, ProducerStats, CLOSE_TIMEOUT};
use crate::sink::SinkError;

/// Producer writing events to one Kafka topic.
pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    async_delivery: bool,
    pending_writes: PendingWrites,
}

impl KafkaProducer {
    /// Create a producer from the queue sink configuration.
    pub fn new(config: &QueueSinkConfig) -> Result<Self, SinkError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.broker_address.as_str())
            .set("batch.num.messages", config.batch_size.to_string())
            .set("batch.size", config.batch_bytes.to_string())
            .set("linger.ms", config.linger_ms.to_string())
            .set("message.timeout.ms", config.delivery_timeout_ms.to_string())
            .create()
            .map_err(|e| SinkError::Delivery(format!("failed to create producer: {}", e)))?;

        tracing::info!(
            broker = %config.broker_address,
            topic = %config.topic,
            batch_size = config.batch_size,
            batch_bytes = config.batch_bytes,
            async_delivery = config.async_delivery,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            async_delivery: config.async_delivery,
            pending_writes: PendingWrites::default(),
        })
    }
}

#[async_trait]
impl MessageProducer for KafkaProducer {
    async fn send(&self, key: &[u8], payload: &[u8]) -> Result<(), SinkError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);
        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| SinkError::Delivery(e.to_string()))?;

        if !self.async_delivery {
            return match delivery.await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err((e, _))) => Err(SinkError::Delivery(e.to_string())),
                Err(_) => Err(SinkError::Delivery("delivery report cancelled".into())),
            };
        }

        let write = self.pending_writes.begin();
        let topic = self.topic.clone();
        tokio::spawn(async move {
            let _write = write;
            match delivery.await {
                Ok(Ok(_)) => {}
                Ok(Err((e, _))) => {
                    tracing::warn!(topic = %topic, error = %e, "Kafka delivery failed");
                }
                Err(_) => {
                    tracing::warn!(topic = %topic, "Kafka delivery report cancelled");
                }
            }
        });
        Ok(())
    }

    fn stats(&self) -> ProducerStats {
        ProducerStats {
            pending_messages: usize::try_from(self.producer.in_flight_count()).unwrap_or(0),
            pending_writes: self.pending_writes.count(),
        }
    }

    async fn close(&self) -> Result<(), SinkError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(CLOSE_TIMEOUT)))
            .await
            .map_err(|e| SinkError::Delivery(format!("close task failed: {}", e)))?
            .map_err(|e| SinkError::Delivery(format!("close failed: {}", e)))
    }
}
