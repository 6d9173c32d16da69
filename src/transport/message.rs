//! Wire frames exchanged between queue connections and the broker.
//!
//! Every frame is a JSON text message tagged by `type`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "subscribe")]
    Subscribe { topic: String },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { topic: String },

    #[serde(rename = "publish")]
    Publish { topic: String, payload: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "pong")]
    Pong,

    /// Confirms that the connection now receives `message` frames for `topic`.
    #[serde(rename = "subscribed")]
    Subscribed { topic: String },

    #[serde(rename = "unsubscribed")]
    Unsubscribed { topic: String },

    /// Acknowledges a publish with the number of connections it reached.
    #[serde(rename = "published")]
    Published { topic: String, receivers: usize },

    #[serde(rename = "message")]
    Message { topic: String, payload: String },

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Short frame name used in logs and error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Pong => "pong",
            ServerMessage::Subscribed { .. } => "subscribed",
            ServerMessage::Unsubscribed { .. } => "unsubscribed",
            ServerMessage::Published { .. } => "published",
            ServerMessage::Message { .. } => "message",
            ServerMessage::Error { .. } => "error",
        }
    }
}
