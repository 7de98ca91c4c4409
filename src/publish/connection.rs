//! Ownership of the single broker session.
//!
//! The session lives behind one async mutex. Callers hold a [`SessionGuard`]
//! for the whole use-or-rebuild critical section, so topic declaration,
//! send, commit, and reconnection never interleave across publishes.
//!
//! Establishing a session never fails loudly: a lookup, connection, or
//! timeout failure is logged and leaves the manager without a session until
//! the next caller asks for one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::broker::{BrokerConnection, BrokerSession, Directory, ErrorObserver};
use crate::{Error, Result};

#[derive(Default)]
struct SessionState {
    connection: Option<Box<dyn BrokerConnection>>,
    session: Option<Box<dyn BrokerSession>>,
}

pub struct ConnectionManager {
    directory: Arc<dyn Directory>,
    factory_name: String,
    connect_timeout: Duration,
    state: Mutex<SessionState>,
}

/// Exclusive access to the broker session.
pub struct SessionGuard<'a> {
    manager: &'a ConnectionManager,
    state: MutexGuard<'a, SessionState>,
}

impl ConnectionManager {
    pub fn new(
        directory: Arc<dyn Directory>,
        factory_name: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            factory_name: factory_name.into(),
            connect_timeout,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Waits for exclusive use of the session.
    pub async fn acquire(&self) -> SessionGuard<'_> {
        SessionGuard {
            manager: self,
            state: self.state.lock().await,
        }
    }

    /// Establishes the session now instead of on first publish. Returns
    /// whether a usable session exists afterwards.
    pub async fn connect(&self) -> bool {
        self.acquire().await.session().await.is_some()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    /// Closes the session, then the connection. Failures are logged, never
    /// returned.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        self.release(&mut state).await;
        debug!("Message bus connection released");
    }

    #[instrument(skip(self, state), fields(factory = %self.factory_name))]
    async fn open(&self, state: &mut SessionState) {
        match tokio::time::timeout(self.connect_timeout, self.establish()).await {
            Ok(Ok((connection, session))) => {
                info!("Connected to message bus");
                state.connection = Some(connection);
                state.session = Some(session);
            }
            Ok(Err(e)) => self.log_connect_failure(&e),
            Err(_) => {
                error!(
                    timeout_ms = self.connect_timeout.as_millis() as u64,
                    "Timed out connecting to message bus"
                );
            }
        }
    }

    async fn establish(&self) -> Result<(Box<dyn BrokerConnection>, Box<dyn BrokerSession>)> {
        let factory = self.directory.lookup(&self.factory_name)?;
        let mut connection = factory.create_connection().await?;
        connection.start().await?;

        let observer: ErrorObserver = Arc::new(|e: &Error| {
            error!(error = %e, "Message bus reported an error");
        });
        connection.set_error_observer(observer);

        let session = connection.create_session().await?;
        Ok((connection, session))
    }

    async fn release(&self, state: &mut SessionState) {
        if let Some(mut session) = state.session.take() {
            match tokio::time::timeout(self.connect_timeout, session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => info!(error = %e, "Failed to close message bus session"),
                Err(_) => warn!("Timed out closing message bus session"),
            }
        }
        if let Some(mut connection) = state.connection.take() {
            match tokio::time::timeout(self.connect_timeout, connection.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => info!(error = %e, "Failed to close message bus connection"),
                Err(_) => warn!("Timed out closing message bus connection"),
            }
        }
    }

    fn log_connect_failure(&self, e: &Error) {
        match e {
            Error::Lookup { .. } => error!(
                error = %e,
                "Directory error while setting up message bus connection. \
                 Make sure a connection factory is bound under this name \
                 ([directory] connection_factory in the configuration)"
            ),
            Error::Connection(_) | Error::Kafka(_) => {
                error!(error = %e, "Failed to initialize connection to message bus")
            }
            _ => error!(error = %e, "Unable to connect to message bus provider"),
        }
    }
}

impl SessionGuard<'_> {
    /// Returns the session, establishing it first if there is none.
    pub async fn session(&mut self) -> Option<&mut (dyn BrokerSession + 'static)> {
        if self.state.session.is_none() {
            self.manager.open(&mut self.state).await;
        }
        self.state.session.as_deref_mut()
    }

    /// Returns the current session without trying to establish one.
    pub fn current(&mut self) -> Option<&mut (dyn BrokerSession + 'static)> {
        self.state.session.as_deref_mut()
    }

    /// Drops the current session and connection and establishes new ones.
    pub async fn reconnect(&mut self) -> Option<&mut (dyn BrokerSession + 'static)> {
        self.manager.release(&mut self.state).await;
        self.manager.open(&mut self.state).await;
        self.state.session.as_deref_mut()
    }

    /// Drops the current session and connection. The next caller
    /// establishes fresh ones.
    pub async fn invalidate(&mut self) {
        self.manager.release(&mut self.state).await;
    }
}
