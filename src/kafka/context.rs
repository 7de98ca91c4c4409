use rdkafka::client::ClientContext;
use rdkafka::error::KafkaError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::error;

use crate::broker::ErrorObserver;
use crate::Error;

/// Client context that forwards librdkafka's background errors to the
/// registered observer and flags the connection stale on fatal errors.
#[derive(Clone, Default)]
pub struct ObserverContext {
    observer: Arc<RwLock<Option<ErrorObserver>>>,
    fatal: Arc<AtomicBool>,
}

impl ObserverContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_observer(&self, observer: ErrorObserver) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    pub fn mark_fatal(&self) {
        self.fatal.store(true, Ordering::SeqCst);
    }
}

impl ClientContext for ObserverContext {
    fn error(&self, error: KafkaError, reason: &str) {
        if super::is_fatal(&error) {
            self.mark_fatal();
        }

        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match observer {
            Some(observer) => observer(&Error::Kafka(error)),
            None => error!(error = %error, reason, "librdkafka error"),
        }
    }
}
