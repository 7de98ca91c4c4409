use async_trait::async_trait;
use tracing::{debug, info};

use super::context::ObserverContext;
use super::producer::TransactionalProducer;
use super::session::KafkaSession;
use super::topic_manager::TopicManager;
use crate::broker::{BrokerConnection, BrokerSession, ConnectionFactory, ErrorObserver};
use crate::config::BrokerConfig;
use crate::{Error, Result};

/// Opens transactional Kafka connections.
///
/// `transactional_id` must be unique per publishing process: a second
/// process using the same id fences the first one's session.
#[derive(Debug, Clone)]
pub struct KafkaConnectionFactory {
    config: BrokerConfig,
}

impl KafkaConnectionFactory {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for KafkaConnectionFactory {
    async fn create_connection(&self) -> Result<Box<dyn BrokerConnection>> {
        let context = ObserverContext::new();
        let producer = TransactionalProducer::new(&self.config, context.clone())?;
        debug!(brokers = ?self.config.brokers, "Created Kafka producer");

        Ok(Box::new(KafkaConnection {
            config: self.config.clone(),
            context,
            producer,
            started: false,
        }))
    }
}

pub struct KafkaConnection {
    config: BrokerConfig,
    context: ObserverContext,
    producer: TransactionalProducer,
    started: bool,
}

#[async_trait]
impl BrokerConnection for KafkaConnection {
    async fn start(&mut self) -> Result<()> {
        if !self.started {
            self.producer.init(self.config.connect_timeout()).await?;
            self.started = true;
            info!(
                transactional_id = %self.config.transactional_id,
                "Kafka transactions initialized"
            );
        }
        Ok(())
    }

    fn set_error_observer(&mut self, observer: ErrorObserver) {
        self.context.set_observer(observer);
    }

    async fn create_session(&mut self) -> Result<Box<dyn BrokerSession>> {
        if !self.started {
            return Err(Error::Connection(
                "Kafka connection must be started before opening a session".to_string(),
            ));
        }

        let topics = TopicManager::new(
            &self.config.brokers,
            self.config.topic_partitions,
            self.config.topic_replication_factor,
            self.config.operation_timeout(),
        )?;

        Ok(Box::new(KafkaSession::new(
            self.producer.clone(),
            topics,
            self.context.clone(),
            self.config.operation_timeout(),
        )))
    }

    async fn close(&mut self) -> Result<()> {
        if self.started {
            self.started = false;
            self.producer.flush(self.config.send_timeout()).await?;
        }
        Ok(())
    }
}
