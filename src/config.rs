use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub broker: BrokerConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub host: HostConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_transactional_id")]
    pub transactional_id: String,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    #[serde(default = "default_topic_partitions")]
    pub topic_partitions: i32,
    #[serde(default = "default_topic_replication_factor")]
    pub topic_replication_factor: i32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoryConfig {
    /// Name the broker connection factory is bound under.
    #[serde(default = "default_connection_factory")]
    pub connection_factory: String,
}

/// Host configuration properties, as the catalog service would expose them
/// (for example `hcat.msgbus.topic.prefix`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HostConfig {
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            connection_factory: default_connection_factory(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("CATALOG_NOTIFY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }
}

impl BrokerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Bound for a single blocking client call inside one send step. It
    /// stays below `send_timeout` so the call returns before the step is
    /// cut off.
    pub fn operation_timeout(&self) -> Duration {
        self.send_timeout().mul_f64(0.8)
    }
}

fn default_transactional_id() -> String {
    "catalog-notify".to_string()
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_message_timeout_ms() -> u64 {
    30_000
}

fn default_topic_partitions() -> i32 {
    1
}

fn default_topic_replication_factor() -> i32 {
    1
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

fn default_connection_factory() -> String {
    "ConnectionFactory".to_string()
}
