pub mod connection;
pub mod context;
pub mod producer;
pub mod session;
pub mod topic_manager;


use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;

pub use connection::{KafkaConnection, KafkaConnectionFactory};
pub use context::ObserverContext;
pub use producer::TransactionalProducer;
pub use session::KafkaSession;
pub use topic_manager::TopicManager;

/// Whether `error` leaves the transactional producer unusable, so only a
/// new connection can continue.
pub fn is_fatal(error: &KafkaError) -> bool {
    if let KafkaError::Transaction(e) = error {
        if e.is_fatal() {
            return true;
        }
    }
    matches!(
        error.rdkafka_error_code(),
        Some(RDKafkaErrorCode::Fatal)
            | Some(RDKafkaErrorCode::ProducerFenced)
            | Some(RDKafkaErrorCode::InvalidProducerEpoch)
    )
}
