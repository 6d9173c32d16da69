//! Broker engine
//!
//! In-memory topic table for the development broker. Responsibilities:
//! - managing topics and subscriber lists
//! - fanning a published payload out to every subscriber of its topic
//! - removing a client from every topic when its connection goes away
//!
//! The API is synchronous and meant to sit behind a lock
//! (`Arc<Mutex<Broker>>`) owned by the transport layer. Callers must not hold
//! the lock across network I/O.

use std::collections::HashMap;

use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::topic::{SubscriberId, Topic};
use crate::client::Client;
use crate::transport::message::ServerMessage;

/// Represents the broker that manages topics and connected clients.
#[derive(Debug, Default)]
pub struct Broker {
    topics: HashMap<String, Topic>,
    clients: HashMap<SubscriberId, Client>,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            topics: HashMap::new(),
            clients: HashMap::new(),
        }
    }

    /// Registers a client so that publishes can reach it.
    pub fn register_client(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    pub fn remove_client(&mut self, client_id: &SubscriberId) {
        self.clients.remove(client_id);
    }

    /// Sends a frame to a single registered client.
    ///
    /// Returns `false` when the client is unknown or its connection is gone.
    pub fn reply(&self, client_id: &SubscriberId, frame: &ServerMessage) -> bool {
        let Some(client) = self.clients.get(client_id) else {
            return false;
        };
        match serde_json::to_string(frame) {
            Ok(text) => client.send(WsMessage::text(text)),
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "failed to serialize reply");
                false
            }
        }
    }

    /// Subscribes a client to a topic. Creates the topic on first use.
    pub fn subscribe(&mut self, topic: &str, subscriber: SubscriberId) {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(subscriber);
    }

    /// Unsubscribes a client from a topic. Empty topics are dropped.
    pub fn unsubscribe(&mut self, topic: &str, subscriber: &SubscriberId) {
        if let Some(t) = self.topics.get_mut(topic) {
            t.unsubscribe(subscriber);
            if t.subscribers.is_empty() {
                self.topics.remove(topic);
            }
        }
    }

    /// Delivers `payload` to every subscriber of `topic`.
    ///
    /// Returns the number of clients the frame was handed to. Publishing to a
    /// topic nobody listens on is not an error and yields zero.
    pub fn publish(&self, topic: &str, payload: String) -> usize {
        let Some(subscribers) = self.topics.get(topic) else {
            debug!(topic = %topic, "publish to topic without subscribers");
            return 0;
        };

        let frame = ServerMessage::Message {
            topic: topic.to_string(),
            payload,
        };
        let text = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                warn!(topic = %topic, error = %e, "failed to serialize message frame");
                return 0;
            }
        };
        let ws_msg = WsMessage::text(text);

        let mut receivers = 0;
        for sub_id in &subscribers.subscribers {
            match self.clients.get(sub_id) {
                Some(client) if client.send(ws_msg.clone()) => receivers += 1,
                Some(_) => warn!(client_id = %sub_id, "subscriber connection is gone"),
                None => warn!(client_id = %sub_id, "no client registered for subscriber"),
            }
        }
        receivers
    }

    /// Removes the client and unsubscribes it from every topic.
    pub fn cleanup_client(&mut self, client_id: &SubscriberId) {
        self.remove_client(client_id);

        self.topics.retain(|name, topic| {
            if topic.unsubscribe(client_id) {
                debug!(client_id = %client_id, topic = %name, "dropped subscription of closed client");
            }
            !topic.subscribers.is_empty()
        });
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |t| t.subscribers.len())
    }
}
