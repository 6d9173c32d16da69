//! # PopQueue
//!
//! `popqueue` is a topic-based message queue layered on a WebSocket
//! publish/subscribe broker. Producers send [`Message`]s to a topic and every
//! live subscriber of that topic receives them through a bounded
//! [`queue::MessageStream`]. Delivery is at-most-once: there is no
//! persistence and no redelivery.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `queue`: The [`Queue`] trait, the [`Message`] envelope and the broker-backed [`PubSubQueue`].
//! - `connection`: Broker connections, subscriptions and the publisher connection pool.
//! - `context`: Cancellation scopes passed to every queue operation.
//! - `broker`: The in-memory development broker that routes messages between topics and subscribers.
//! - `client`: Represents a WebSocket peer connected to the development broker.
//! - `transport`: The broker's WebSocket server and the frames both sides exchange.
//! - `config`: Handles loading and layering configuration.
//! - `utils`: Contains shared utilities, such as error handling and logging.

pub mod broker;
pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod queue;
pub mod transport;
pub mod utils;

pub use context::{CancelHandle, Context};
pub use queue::{Message, PubSubQueue, Queue};
pub use utils::error::QueueError;

#[cfg(test)]
mod tests;
