//! Transacted publish/subscribe broker API.
//!
//! The listener only needs a small slice of a broker: look up a connection
//! factory by name, open and start a connection, open a transacted session,
//! declare topics, send, and commit. [`crate::kafka`] implements it on Kafka
//! transactions; [`memory`] implements it in-process.

pub mod directory;
pub mod memory;
pub mod message;

use async_trait::async_trait;
use std::sync::Arc;

use crate::{Error, Result};

pub use directory::{Directory, StaticDirectory};
pub use memory::{DeliveredMessage, InMemoryBroker};
pub use message::{Message, MessageBody};

/// Callback for errors the broker client reports outside any call, such as
/// a dropped broker link.
pub type ErrorObserver = Arc<dyn Fn(&Error) + Send + Sync>;

/// Handle to a publish/subscribe destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    name: String,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create_connection(&self) -> Result<Box<dyn BrokerConnection>>;
}

#[async_trait]
pub trait BrokerConnection: Send {
    async fn start(&mut self) -> Result<()>;

    fn set_error_observer(&mut self, observer: ErrorObserver);

    /// Opens a transacted session: nothing sent on it is delivered until
    /// [`BrokerSession::commit`].
    async fn create_session(&mut self) -> Result<Box<dyn BrokerSession>>;

    async fn close(&mut self) -> Result<()>;
}

/// A transacted session. Not safe for concurrent use; callers serialize
/// access.
#[async_trait]
pub trait BrokerSession: Send {
    /// Declares `name`, creating it on the broker if absent. Fails with
    /// [`Error::SessionInvalid`] once the session has gone stale.
    async fn create_topic(&mut self, name: &str) -> Result<Topic>;

    async fn send(&mut self, topic: &Topic, message: Message) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    /// Discards everything sent since the last commit.
    async fn rollback(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Producer bound to one topic of a session.
pub struct MessageProducer<'s> {
    session: &'s mut dyn BrokerSession,
    topic: Topic,
}

impl<'s> MessageProducer<'s> {
    pub fn new(session: &'s mut dyn BrokerSession, topic: Topic) -> Self {
        Self { session, topic }
    }

    pub async fn send(&mut self, message: Message) -> Result<()> {
        self.session.send(&self.topic, message).await
    }
}
