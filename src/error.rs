//! Error types and result handling for catalog-notify.
//!
//! This module defines the main error type [`Error`], the catalog
//! collaborator's [`CatalogError`], and a convenience [`Result`] alias used
//! throughout the crate.
//!
//! Only catalog-consistency failures ever reach a listener's caller. Broker
//! faults are logged and swallowed at the delivery boundary.
//!
//! # Example
//!
//! ```rust
//! use catalog_notify::{Error, Result};
//!
//! fn lookup_factory() -> Result<()> {
//!     Err(Error::Lookup { name: "ConnectionFactory".to_string() })
//! }
//!
//! match lookup_factory() {
//!     Ok(()) => println!("Found"),
//!     Err(Error::Lookup { name }) => eprintln!("No factory bound to {}", name),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for catalog-notify operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, typically from an invalid config file or
    /// environment override.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka client or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// JSON serialization error when encoding message bodies.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from reading replay input files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No connection factory is bound under the requested directory name.
    #[error("Directory lookup failed: no connection factory bound to '{name}'")]
    Lookup {
        /// The name that was looked up
        name: String,
    },

    /// The broker could not be reached or refused the connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker session is no longer usable and must be rebuilt.
    #[error("Session invalid: {message}")]
    SessionInvalid {
        /// Why the session was judged stale
        message: String,
    },

    /// Broker-side failure that is not a connectivity or staleness problem.
    #[error("Broker error: {message}")]
    Broker {
        /// Description of the failure
        message: String,
    },

    /// A broker round-trip exceeded its configured bound.
    #[error("Timeout error: {message}")]
    Timeout {
        /// Description of what timed out
        message: String,
    },

    /// The catalog rejected a lookup or mutation issued by the listener.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl Error {
    /// Returns true when the failure means the current broker session is
    /// stale and a reconnect may succeed.
    pub fn is_session_invalid(&self) -> bool {
        match self {
            Error::SessionInvalid { .. } => true,
            Error::Kafka(e) => crate::kafka::is_fatal(e),
            _ => false,
        }
    }

    /// Returns true when the session's transaction state can no longer be
    /// trusted: it is stale, or a call on it was cut off mid-flight.
    pub fn poisons_session(&self) -> bool {
        self.is_session_invalid() || matches!(self, Error::Timeout { .. })
    }
}

/// Errors reported by the catalog service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The requested database or table does not exist.
    #[error("No such object: {0}")]
    NoSuchObject(String),

    /// The catalog refused the requested change.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The catalog backend could not serve the request.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// A convenient Result type alias for catalog-notify operations.
///
/// This is equivalent to `std::result::Result<T, catalog_notify::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
