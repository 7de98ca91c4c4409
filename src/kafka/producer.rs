use crate::{config::BrokerConfig, Error, Result};
use bytes::Bytes;
use rdkafka::error::KafkaResult;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::context::ObserverContext;

/// Transactional Kafka producer.
///
/// The transaction calls of librdkafka block the calling thread, so they run
/// on the blocking pool.
#[derive(Clone)]
pub struct TransactionalProducer {
    producer: FutureProducer<ObserverContext>,
    message_timeout: Duration,
}

impl TransactionalProducer {
    pub fn new(config: &BrokerConfig, context: ObserverContext) -> Result<Self> {
        let producer: FutureProducer<ObserverContext> = client_config(config)
            .create_with_context(context)
            .map_err(Error::Kafka)?;

        Ok(Self {
            producer,
            message_timeout: Duration::from_millis(config.message_timeout_ms),
        })
    }

    pub async fn init(&self, timeout: Duration) -> Result<()> {
        self.blocking(move |producer| producer.init_transactions(timeout))
            .await
    }

    pub async fn begin(&self) -> Result<()> {
        self.blocking(|producer| producer.begin_transaction()).await
    }

    pub async fn commit(&self, timeout: Duration) -> Result<()> {
        self.blocking(move |producer| producer.commit_transaction(timeout))
            .await
    }

    pub async fn abort(&self, timeout: Duration) -> Result<()> {
        self.blocking(move |producer| producer.abort_transaction(timeout))
            .await
    }

    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        self.blocking(move |producer| producer.flush(timeout)).await
    }

    pub async fn send(
        &self,
        topic: &str,
        payload: &Bytes,
        properties: &BTreeMap<String, String>,
    ) -> Result<()> {
        let record = FutureRecord::<(), [u8]>::to(topic)
            .payload(payload.as_ref())
            .headers(headers(properties))
            .timestamp(chrono::Utc::now().timestamp_millis());

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.message_timeout))
            .await
            .map_err(|(e, _)| Error::Kafka(e))?;

        debug!(topic, partition, offset, "Message enqueued in transaction");
        Ok(())
    }

    async fn blocking<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&FutureProducer<ObserverContext>) -> KafkaResult<()> + Send + 'static,
    {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || op(&producer))
            .await
            .map_err(|e| Error::Broker {
                message: format!("transactional call did not complete: {}", e),
            })?
            .map_err(Error::Kafka)
    }
}

pub(crate) fn client_config(config: &BrokerConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.brokers.join(","))
        .set("transactional.id", &config.transactional_id)
        .set("enable.idempotence", "true")
        .set("compression.type", &config.compression)
        .set("acks", &config.acks)
        .set("message.timeout.ms", config.message_timeout_ms.to_string());
    client
}

/// Message properties travel as Kafka headers.
pub(crate) fn headers(properties: &BTreeMap<String, String>) -> OwnedHeaders {
    properties
        .iter()
        .fold(OwnedHeaders::new(), |headers, (key, value)| {
            headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            })
        })
}
