pub mod broker;
pub mod catalog;
pub mod config;
pub mod error;
pub mod listener;
pub mod notification;
pub mod publish;
pub mod replay;

pub mod kafka;

pub use catalog::Catalog;
pub use config::Config;
pub use error::{CatalogError, Error, Result};
pub use listener::{CatalogListener, NotificationListener};
pub use notification::{EventKind, Payload};
pub use publish::Delivery;
