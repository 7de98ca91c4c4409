use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::ConnectionFactory;
use crate::kafka::KafkaConnectionFactory;
use crate::{Config, Error, Result};

/// Locates broker connection factories by name.
pub trait Directory: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Arc<dyn ConnectionFactory>>;
}

/// Directory with a fixed set of bindings.
#[derive(Clone, Default)]
pub struct StaticDirectory {
    bindings: HashMap<String, Arc<dyn ConnectionFactory>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.bindings.insert(name.into(), factory);
        self
    }

    /// Binds a Kafka connection factory under the configured lookup name.
    pub fn from_config(config: &Config) -> Self {
        Self::new().bind(
            config.directory.connection_factory.clone(),
            Arc::new(KafkaConnectionFactory::new(config.broker.clone())),
        )
    }
}

impl Directory for StaticDirectory {
    fn lookup(&self, name: &str) -> Result<Arc<dyn ConnectionFactory>> {
        self.bindings.get(name).cloned().ok_or_else(|| Error::Lookup {
            name: name.to_string(),
        })
    }
}

impl fmt::Debug for StaticDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.bindings.keys().collect();
        names.sort();
        f.debug_struct("StaticDirectory").field("bindings", &names).finish()
    }
}
