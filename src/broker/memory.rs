//! In-process broker.
//!
//! Implements the full transacted-session API without a network: messages
//! sent on a session stay pending until commit and are dropped on rollback.
//! Faults can be injected to exercise the publisher's recovery paths:
//!
//! - an unreachable broker (connections fail),
//! - stale-session signals on topic declaration,
//! - send and commit failures,
//! - artificial latency on every session call,
//! - invalidation of every live session at once.
//!
//! Used by the replay binary's dry-run mode and by the test suites.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{BrokerConnection, BrokerSession, ConnectionFactory, ErrorObserver, Message, Topic};
use crate::{Error, Result};

/// A committed message as seen by subscribers.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub topic: String,
    pub message: Message,
    pub session_id: u64,
    pub committed_at: DateTime<Utc>,
}

#[derive(Default)]
struct BrokerState {
    topics: BTreeSet<String>,
    delivered: Vec<DeliveredMessage>,
    observers: BTreeMap<u64, ErrorObserver>,
    generation: u64,
    next_session_id: u64,
    connections_opened: u64,
    connections_closed: u64,
    sessions_opened: u64,
    sessions_closed: u64,
    rollbacks: u64,
    overlapping_transactions: u64,
    unreachable: bool,
    stale_signals: u32,
    send_failures: u32,
    commit_failures: u32,
    latency: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn latency(&self) -> Option<Duration> {
        self.lock().latency
    }

    /// Makes new connections fail until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// The next `count` topic declarations fail with a stale-session error.
    pub fn signal_stale_sessions(&self, count: u32) {
        self.lock().stale_signals = count;
    }

    /// Marks every session opened so far as stale.
    pub fn invalidate_sessions(&self) {
        self.lock().generation += 1;
    }

    pub fn fail_next_sends(&self, count: u32) {
        self.lock().send_failures = count;
    }

    pub fn fail_next_commits(&self, count: u32) {
        self.lock().commit_failures = count;
    }

    /// Delays every session call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Reports `error` to the error observer of every open connection, as a
    /// broker client does for failures outside any call.
    pub fn emit_error(&self, error: Error) {
        let observers: Vec<ErrorObserver> = self.lock().observers.values().cloned().collect();
        for observer in observers {
            observer(&error);
        }
    }

    pub fn delivered(&self) -> Vec<DeliveredMessage> {
        self.lock().delivered.clone()
    }

    pub fn delivered_to(&self, topic: &str) -> Vec<DeliveredMessage> {
        self.lock()
            .delivered
            .iter()
            .filter(|delivered| delivered.topic == topic)
            .cloned()
            .collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.lock().topics.iter().cloned().collect()
    }

    pub fn connections_opened(&self) -> u64 {
        self.lock().connections_opened
    }

    pub fn connections_closed(&self) -> u64 {
        self.lock().connections_closed
    }

    pub fn sessions_opened(&self) -> u64 {
        self.lock().sessions_opened
    }

    pub fn sessions_closed(&self) -> u64 {
        self.lock().sessions_closed
    }

    pub fn rollbacks(&self) -> u64 {
        self.lock().rollbacks
    }

    /// Number of times a topic was declared on a session whose previous
    /// transaction was still open, i.e. two publishes interleaved.
    pub fn overlapping_transactions(&self) -> u64 {
        self.lock().overlapping_transactions
    }
}

impl fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryBroker")
            .field("topics", &state.topics)
            .field("delivered", &state.delivered.len())
            .field("connections_opened", &state.connections_opened)
            .field("sessions_opened", &state.sessions_opened)
            .field("unreachable", &state.unreachable)
            .finish()
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryBroker {
    async fn create_connection(&self) -> Result<Box<dyn BrokerConnection>> {
        let mut state = self.lock();
        if state.unreachable {
            return Err(Error::Connection("in-memory broker is unreachable".to_string()));
        }
        state.connections_opened += 1;
        Ok(Box::new(InMemoryConnection {
            broker: self.clone(),
            id: state.connections_opened,
            started: false,
            closed: false,
        }))
    }
}

struct InMemoryConnection {
    broker: InMemoryBroker,
    id: u64,
    started: bool,
    closed: bool,
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    async fn start(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Connection("connection is closed".to_string()));
        }
        self.started = true;
        Ok(())
    }

    fn set_error_observer(&mut self, observer: ErrorObserver) {
        self.broker.lock().observers.insert(self.id, observer);
    }

    async fn create_session(&mut self) -> Result<Box<dyn BrokerSession>> {
        if !self.started || self.closed {
            return Err(Error::Connection("connection is not started".to_string()));
        }
        let mut state = self.broker.lock();
        state.sessions_opened += 1;
        state.next_session_id += 1;
        Ok(Box::new(InMemorySession {
            broker: self.broker.clone(),
            id: state.next_session_id,
            generation: state.generation,
            pending: Vec::new(),
            in_transaction: false,
            closed: false,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            let mut state = self.broker.lock();
            state.observers.remove(&self.id);
            state.connections_closed += 1;
        }
        Ok(())
    }
}

struct InMemorySession {
    broker: InMemoryBroker,
    id: u64,
    generation: u64,
    pending: Vec<(String, Message)>,
    in_transaction: bool,
    closed: bool,
}

impl InMemorySession {
    fn check_valid(&self, state: &BrokerState) -> Result<()> {
        if self.closed || self.generation != state.generation {
            return Err(Error::SessionInvalid {
                message: format!("in-memory session {} is stale", self.id),
            });
        }
        Ok(())
    }

    async fn pause(&self) {
        if let Some(latency) = self.broker.latency() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl BrokerSession for InMemorySession {
    async fn create_topic(&mut self, name: &str) -> Result<Topic> {
        {
            let mut state = self.broker.lock();
            if state.stale_signals > 0 {
                state.stale_signals -= 1;
                return Err(Error::SessionInvalid {
                    message: format!("in-memory session {} was invalidated", self.id),
                });
            }
            self.check_valid(&state)?;

            if self.in_transaction {
                state.overlapping_transactions += 1;
            }
            self.in_transaction = true;
            if state.topics.insert(name.to_string()) {
                debug!("Created topic '{}'", name);
            }
        }
        self.pause().await;
        Ok(Topic::new(name))
    }

    async fn send(&mut self, topic: &Topic, message: Message) -> Result<()> {
        {
            let mut state = self.broker.lock();
            self.check_valid(&state)?;
            if state.send_failures > 0 {
                state.send_failures -= 1;
                return Err(Error::Broker {
                    message: format!("send to '{}' rejected", topic.name()),
                });
            }
        }
        self.pause().await;
        self.pending.push((topic.name().to_string(), message));
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.broker.lock();
        self.check_valid(&state)?;
        if state.commit_failures > 0 {
            state.commit_failures -= 1;
            return Err(Error::Broker {
                message: "commit rejected".to_string(),
            });
        }

        let committed_at = Utc::now();
        for (topic, message) in self.pending.drain(..) {
            state.delivered.push(DeliveredMessage {
                topic,
                message,
                session_id: self.id,
                committed_at,
            });
        }
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut state = self.broker.lock();
        self.pending.clear();
        state.rollbacks += 1;
        self.in_transaction = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.broker.lock();
        if !self.closed {
            self.closed = true;
            self.pending.clear();
            state.sessions_closed += 1;
        }
        Ok(())
    }
}
