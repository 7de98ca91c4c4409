use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::connection::{ConnectionManager, SessionGuard};
use crate::broker::{BrokerSession, Message, MessageProducer, Topic};
use crate::notification::{EventKind, Payload, EVENT_PROPERTY};
use crate::{Error, Result};

/// Outcome of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Sent and committed.
    Delivered,
    /// The event is not published: failed catalog operation or an
    /// unobserved event class.
    Ignored,
    /// No topic is configured for the entity.
    Suppressed,
    /// Publishing failed and was logged.
    Failed,
}

/// Sends notifications over the managed session.
///
/// [`MessageSender::send`] never returns an error: every failure is logged
/// and reported as [`Delivery::Failed`].
pub struct MessageSender {
    connections: Arc<ConnectionManager>,
    send_timeout: Duration,
}

impl MessageSender {
    pub fn new(connections: Arc<ConnectionManager>, send_timeout: Duration) -> Self {
        Self {
            connections,
            send_timeout,
        }
    }

    pub async fn send(&self, payload: &Payload, topic_name: &str, kind: EventKind) -> Delivery {
        match self.try_send(payload, topic_name, kind).await {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(
                    topic = %topic_name,
                    event = %kind,
                    error = %e,
                    "Failed to publish notification"
                );
                Delivery::Failed
            }
        }
    }

    async fn try_send(&self, payload: &Payload, topic_name: &str, kind: EventKind) -> Result<Delivery> {
        let message = build_message(payload, kind)?;
        let mut guard = self.connections.acquire().await;

        let Some(session) = guard.session().await else {
            error!(
                topic = %topic_name,
                event = %kind,
                "No message bus session available, notification dropped"
            );
            return Ok(Delivery::Failed);
        };

        let declared = self.bounded(session.create_topic(topic_name)).await;
        let topic = match declared {
            Ok(topic) => topic,
            Err(e) if e.is_session_invalid() => {
                error!(
                    topic = %topic_name,
                    error = %e,
                    "Message bus session is stale, reconnecting"
                );
                let Some(session) = guard.reconnect().await else {
                    return Err(Error::Connection(
                        "reconnect after stale session failed".to_string(),
                    ));
                };
                let redeclared = self.bounded(session.create_topic(topic_name)).await;
                match redeclared {
                    Ok(topic) => topic,
                    Err(e) => return Err(self.abandon(&mut guard, e).await),
                }
            }
            Err(e) => return Err(self.abandon(&mut guard, e).await),
        };

        let Some(session) = guard.current() else {
            return Err(Error::Connection("session vanished while sending".to_string()));
        };
        let delivered = self.deliver(session, topic, message).await;
        if let Err(e) = delivered {
            return Err(self.abandon(&mut guard, e).await);
        }

        debug!(topic = %topic_name, event = %kind, "Notification committed");
        Ok(Delivery::Delivered)
    }

    /// Ends the transaction of a failed publish. A session that is stale or
    /// had a call cut off is discarded instead of rolled back.
    async fn abandon(&self, guard: &mut SessionGuard<'_>, cause: Error) -> Error {
        if !cause.poisons_session() {
            if let Some(session) = guard.current() {
                let rolled_back = self.bounded(session.rollback()).await;
                match rolled_back {
                    Ok(()) => {
                        info!(error = %cause, "Rolled back notification transaction");
                        return cause;
                    }
                    Err(e) => warn!(error = %e, "Failed to roll back notification transaction"),
                }
            }
        }
        warn!(error = %cause, "Discarding message bus session");
        guard.invalidate().await;
        cause
    }

    async fn deliver(
        &self,
        session: &mut (dyn BrokerSession + 'static),
        topic: Topic,
        message: Message,
    ) -> Result<()> {
        let mut producer = MessageProducer::new(&mut *session, topic);
        self.bounded(producer.send(message)).await?;
        self.bounded(session.commit()).await
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.send_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                message: format!(
                    "message bus did not answer within {}ms",
                    self.send_timeout.as_millis()
                ),
            }),
        }
    }
}

fn build_message(payload: &Payload, kind: EventKind) -> Result<Message> {
    let mut message = match payload {
        Payload::Fields(fields) => Message::map(fields.iter()),
        Payload::Snapshot(snapshot) => Message::object(snapshot)?,
    };
    message.set_string_property(EVENT_PROPERTY, kind.as_str());
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryBroker, StaticDirectory};
    use crate::catalog::Database;
    use crate::notification::EntitySnapshot;
    use std::collections::BTreeMap;

    fn sender_for(broker: &InMemoryBroker) -> MessageSender {
        let directory =
            StaticDirectory::new().bind("ConnectionFactory", Arc::new(broker.clone()));
        let connections = Arc::new(ConnectionManager::new(
            Arc::new(directory),
            "ConnectionFactory",
            Duration::from_secs(1),
        ));
        MessageSender::new(connections, Duration::from_millis(200))
    }

    #[test]
    fn test_map_payload_copies_every_field() {
        let fields: BTreeMap<String, String> = [("a", "1"), ("b", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let message = build_message(&Payload::Fields(fields.clone()), EventKind::AddTable).unwrap();

        assert_eq!(message.body(), &crate::broker::MessageBody::Map(fields));
        assert_eq!(message.string_property(EVENT_PROPERTY), Some("HCAT_ADD_TABLE"));
        assert_eq!(message.properties().len(), 1);
    }

    #[test]
    fn test_snapshot_payload_becomes_object_message() {
        let payload = Payload::Snapshot(EntitySnapshot::Database(Database::new("sales")));
        let message = build_message(&payload, EventKind::AddDatabase).unwrap();

        let database: Database = message.object_as().unwrap();
        assert_eq!(database.name, "sales");
    }

    #[tokio::test]
    async fn test_send_commits_message() {
        let broker = InMemoryBroker::new();
        let sender = sender_for(&broker);
        let payload = Payload::Snapshot(EntitySnapshot::Database(Database::new("sales")));

        let delivery = sender.send(&payload, "hcat", EventKind::AddDatabase).await;

        assert_eq!(delivery, Delivery::Delivered);
        assert_eq!(broker.delivered_to("hcat").len(), 1);
    }

    #[tokio::test]
    async fn test_send_without_broker_fails_quietly() {
        let broker = InMemoryBroker::new();
        broker.set_unreachable(true);
        let sender = sender_for(&broker);
        let payload = Payload::Fields(BTreeMap::new());

        let delivery = sender.send(&payload, "hcat", EventKind::DropDatabase).await;

        assert_eq!(delivery, Delivery::Failed);
        assert!(broker.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let broker = InMemoryBroker::new();
        broker.fail_next_commits(1);
        let sender = sender_for(&broker);
        let payload = Payload::Fields(BTreeMap::new());

        assert_eq!(
            sender.send(&payload, "hcat", EventKind::AddDatabase).await,
            Delivery::Failed
        );
        assert_eq!(broker.rollbacks(), 1);
        assert!(broker.delivered().is_empty());

        assert_eq!(
            sender.send(&payload, "hcat", EventKind::AddDatabase).await,
            Delivery::Delivered
        );
        assert_eq!(broker.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_publish_discards_session() {
        let broker = InMemoryBroker::new();
        let sender = sender_for(&broker);
        let payload = Payload::Fields(BTreeMap::new());

        broker.set_latency(Some(Duration::from_secs(5)));
        let first = sender.send(&payload, "hcat", EventKind::AddDatabase).await;
        broker.set_latency(None);
        let second = sender.send(&payload, "hcat", EventKind::DropDatabase).await;

        assert_eq!(first, Delivery::Failed);
        assert_eq!(second, Delivery::Delivered);
        assert_eq!(broker.overlapping_transactions(), 0);
        assert_eq!(broker.sessions_closed(), 1);
        assert_eq!(broker.connections_opened(), 2);

        let delivered = broker.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].session_id, 2);
    }
}
