use crate::{Error, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Declares topics on demand, remembering the ones already verified.
pub struct TopicManager {
    admin_client: Arc<AdminClient<DefaultClientContext>>,
    default_partitions: i32,
    default_replication_factor: i32,
    operation_timeout: Duration,
    known_topics: HashSet<String>,
}

impl TopicManager {
    pub fn new(
        brokers: &[String],
        partitions: i32,
        replication_factor: i32,
        operation_timeout: Duration,
    ) -> Result<Self> {
        let admin_client: AdminClient<_> = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .create()
            .map_err(Error::Kafka)?;

        Ok(Self {
            admin_client: Arc::new(admin_client),
            default_partitions: partitions,
            default_replication_factor: replication_factor,
            operation_timeout,
            known_topics: HashSet::new(),
        })
    }

    #[instrument(skip(self), fields(topic = %topic_name))]
    pub async fn ensure_topic_exists(&mut self, topic_name: &str) -> Result<()> {
        if self.known_topics.contains(topic_name) {
            debug!("Topic '{}' already verified to exist", topic_name);
            return Ok(());
        }

        match self.topic_exists(topic_name).await {
            Ok(true) => {
                debug!("Topic '{}' already exists", topic_name);
                self.known_topics.insert(topic_name.to_string());
                Ok(())
            }
            Ok(false) => {
                info!("Creating topic '{}'", topic_name);
                self.create_topic(topic_name).await?;
                self.known_topics.insert(topic_name.to_string());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to check if topic '{}' exists: {}", topic_name, e);
                Err(e)
            }
        }
    }

    /// Metadata fetches block, so they run off the async workers where the
    /// caller's timeout can still fire.
    async fn topic_exists(&self, topic_name: &str) -> Result<bool> {
        let admin_client = self.admin_client.clone();
        let name = topic_name.to_string();
        let timeout = self.operation_timeout;

        tokio::task::spawn_blocking(move || -> Result<bool> {
            let metadata = admin_client
                .inner()
                .fetch_metadata(Some(name.as_str()), timeout)
                .map_err(Error::Kafka)?;

            Ok(metadata
                .topics()
                .iter()
                .any(|topic| topic.name() == name && topic.error().is_none()))
        })
        .await
        .map_err(|e| Error::Broker {
            message: format!("metadata task failed: {}", e),
        })?
    }

    async fn create_topic(&self, topic_name: &str) -> Result<()> {
        let new_topic = NewTopic::new(
            topic_name,
            self.default_partitions,
            TopicReplication::Fixed(self.default_replication_factor),
        )
        .set("cleanup.policy", "delete");

        let opts = AdminOptions::new().operation_timeout(Some(self.operation_timeout));

        let results = self
            .admin_client
            .create_topics(&[new_topic], &opts)
            .await
            .map_err(Error::Kafka)?;

        for result in results {
            match result {
                Ok(topic) => {
                    info!("Successfully created topic: {}", topic);
                }
                // Another publisher won the race.
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!("Topic '{}' was created concurrently", topic);
                }
                Err((_topic, error)) => {
                    return Err(Error::Kafka(KafkaError::AdminOp(error)));
                }
            }
        }

        Ok(())
    }
}
