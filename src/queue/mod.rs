//! The queue abstraction and its pub/sub implementation.
//!
//! - `message`: the [`Message`] envelope and its JSON wire format
//! - `observer`: lifecycle events and the sinks that record them
//! - `pubsub`: [`PubSubQueue`], the broker-backed [`Queue`]
//! - `delivery`: background tasks feeding subscriber streams

pub(crate) mod delivery;
pub mod message;
pub mod observer;
pub mod pubsub;

use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::context::Context;
use crate::utils::error::QueueError;

pub use message::Message;
pub use observer::{CloseReason, MemoryObserver, QueueEvent, QueueObserver, TracingObserver};
pub use pubsub::PubSubQueue;

/// Topic-based message queue.
///
/// Implementations are shared between producers and consumers, so every
/// method takes `&self`.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Publishes `message` on `topic`. An empty ID or a missing timestamp
    /// is filled in before encoding.
    async fn send(&self, ctx: &Context, topic: &str, message: Message) -> Result<(), QueueError>;

    /// Starts consuming `topic`. Returns once the broker has confirmed the
    /// subscription; the stream ends when `ctx` is cancelled, the topic is
    /// unsubscribed, or the queue is closed.
    async fn subscribe(&self, ctx: &Context, topic: &str) -> Result<MessageStream, QueueError>;

    /// Stops every live subscription on `topic` made through this queue,
    /// whichever `subscribe` call created it. Each stream ends once its
    /// delivery task has unsubscribed from the broker. A topic with no live
    /// subscription is not an error.
    async fn unsubscribe(&self, ctx: &Context, topic: &str) -> Result<(), QueueError>;

    /// Acknowledges a message. Delivery is at-most-once, so this only
    /// records the acknowledgement.
    async fn ack(&self, _ctx: &Context, _topic: &str, _message_id: &str) -> Result<(), QueueError> {
        Ok(())
    }

    /// Releases broker resources. Calling it twice is harmless.
    async fn close(&self) -> Result<(), QueueError>;
}

/// Receiving end of a subscription.
///
/// Messages arrive in broker order. The stream yields `None` once the
/// subscription has ended for any reason; dropping it ends the
/// subscription too.
#[derive(Debug)]
pub struct MessageStream {
    topic: String,
    inner: mpsc::Receiver<Message>,
}

impl MessageStream {
    pub(crate) fn new(topic: &str, inner: mpsc::Receiver<Message>) -> Self {
        Self {
            topic: topic.to_string(),
            inner,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.inner.recv().await
    }

    /// Takes a buffered message without waiting.
    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.inner.try_recv()
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Message>> {
        self.inner.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests;
