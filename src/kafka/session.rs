use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::context::ObserverContext;
use super::producer::TransactionalProducer;
use super::topic_manager::TopicManager;
use crate::broker::{BrokerSession, Message, Topic};
use crate::{Error, Result};

/// Transacted session over a Kafka transactional producer.
///
/// A Kafka transaction is begun lazily by the first send after a commit or
/// rollback.
pub struct KafkaSession {
    producer: TransactionalProducer,
    topics: TopicManager,
    context: ObserverContext,
    operation_timeout: Duration,
    in_transaction: bool,
    closed: bool,
}

impl KafkaSession {
    pub fn new(
        producer: TransactionalProducer,
        topics: TopicManager,
        context: ObserverContext,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            producer,
            topics,
            context,
            operation_timeout,
            in_transaction: false,
            closed: false,
        }
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.closed {
            return Err(Error::SessionInvalid {
                message: "Kafka session is closed".to_string(),
            });
        }
        if self.context.is_fatal() {
            return Err(Error::SessionInvalid {
                message: "Kafka producer raised a fatal error".to_string(),
            });
        }
        Ok(())
    }

    /// Records a fatal producer error so the next call reports the session
    /// stale.
    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_session_invalid() {
                self.context.mark_fatal();
            }
        }
        result
    }
}

#[async_trait]
impl BrokerSession for KafkaSession {
    async fn create_topic(&mut self, name: &str) -> Result<Topic> {
        self.ensure_valid()?;
        let result = self.topics.ensure_topic_exists(name).await;
        self.track(result)?;
        Ok(Topic::new(name))
    }

    async fn send(&mut self, topic: &Topic, message: Message) -> Result<()> {
        self.ensure_valid()?;
        if !self.in_transaction {
            let result = self.producer.begin().await;
            self.track(result)?;
            self.in_transaction = true;
        }

        let payload = message.encode_body()?;
        let result = self
            .producer
            .send(topic.name(), &payload, message.properties())
            .await;
        self.track(result)
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_valid()?;
        if !self.in_transaction {
            return Ok(());
        }
        let result = self.producer.commit(self.operation_timeout).await;
        self.track(result)?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        let result = self.producer.abort(self.operation_timeout).await;
        self.track(result)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.in_transaction {
            self.in_transaction = false;
            if let Err(e) = self.producer.abort(self.operation_timeout).await {
                warn!(error = %e, "Failed to abort open transaction while closing session");
            }
        }
        debug!("Kafka session closed");
        Ok(())
    }
}
