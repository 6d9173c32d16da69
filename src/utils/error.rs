//! Error types shared across the crate.
//!
//! `BrokerError` describes failures of a single broker connection and is
//! wrapped as the source of the caller-facing `QueueError` variants.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("malformed broker frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("broker rejected request: {0}")]
    Rejected(String),

    #[error("unexpected '{0}' frame from broker")]
    UnexpectedReply(&'static str),

    #[error("connection closed by broker")]
    Closed,

    #[error("connection pool is closed")]
    PoolClosed,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to connect to broker at {addr}")]
    Connection {
        addr: String,
        #[source]
        source: BrokerError,
    },

    #[error("failed to encode or decode message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to publish to topic '{topic}'")]
    Transport {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("failed to subscribe to topic '{topic}'")]
    Subscription {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("topic name must not be empty")]
    InvalidTopic,

    #[error("operation cancelled")]
    Cancelled,

    #[error("queue is closed")]
    Closed,
}
