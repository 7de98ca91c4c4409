//! Best-effort delivery of notifications over one shared broker session.

pub mod connection;
pub mod sender;

pub use connection::{ConnectionManager, SessionGuard};
pub use sender::{Delivery, MessageSender};
