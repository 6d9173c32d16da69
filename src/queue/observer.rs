//! Observability side channel of the queue.
//!
//! Every lifecycle event is handed to a [`QueueObserver`] injected at
//! construction. Observers must not influence control flow; they only
//! record.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

/// Why a subscription's delivery task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The subscribe context was cancelled, or the queue stopped the
    /// subscription through `unsubscribe`/`close`.
    Stopped,
    /// The consumer dropped its stream.
    ConsumerDropped,
    /// The broker connection went away.
    BrokerClosed,
    /// Nothing was handed to the consumer for the configured idle timeout.
    IdleTimeout,
    /// The configured maximum lifetime elapsed.
    LifetimeExceeded,
    /// The delivery task panicked.
    Panicked,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloseReason::Stopped => "stopped",
            CloseReason::ConsumerDropped => "consumer_dropped",
            CloseReason::BrokerClosed => "broker_closed",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::LifetimeExceeded => "lifetime_exceeded",
            CloseReason::Panicked => "panicked",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Connected { url: String },
    Sent { topic: String, message_id: String, receivers: usize },
    SubscriptionConfirmed { topic: String },
    Received { topic: String, message_id: String },
    DecodeFailed { topic: String, error: String },
    Dropped { topic: String, message_id: String },
    Unsubscribed { topic: String },
    UnsubscribeFailed { topic: String, error: String },
    CloseFailed { topic: String, error: String },
    SubscriptionClosed { topic: String, reason: CloseReason },
    DeliveryPanicked { topic: String, detail: String },
    Acknowledged { topic: String, message_id: String },
    Closed,
}

pub trait QueueObserver: Send + Sync {
    fn observe(&self, event: &QueueEvent);
}

/// Default observer: writes every event as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl QueueObserver for TracingObserver {
    fn observe(&self, event: &QueueEvent) {
        match event {
            QueueEvent::Connected { url } => info!(url = %url, "connected to broker"),
            QueueEvent::Sent {
                topic,
                message_id,
                receivers,
            } => info!(topic = %topic, message_id = %message_id, receivers, "sent message"),
            QueueEvent::SubscriptionConfirmed { topic } => {
                info!(topic = %topic, "subscribed to topic")
            }
            QueueEvent::Received { topic, message_id } => {
                debug!(topic = %topic, message_id = %message_id, "received message")
            }
            QueueEvent::DecodeFailed { topic, error } => {
                error!(topic = %topic, error = %error, "failed to decode message")
            }
            QueueEvent::Dropped { topic, message_id } => warn!(
                topic = %topic,
                message_id = %message_id,
                "timed out handing message to consumer, dropped"
            ),
            QueueEvent::Unsubscribed { topic } => info!(topic = %topic, "unsubscribed from topic"),
            QueueEvent::UnsubscribeFailed { topic, error } => {
                error!(topic = %topic, error = %error, "failed to unsubscribe")
            }
            QueueEvent::CloseFailed { topic, error } => {
                warn!(topic = %topic, error = %error, "failed to close subscription connection")
            }
            QueueEvent::SubscriptionClosed { topic, reason } => {
                info!(topic = %topic, reason = %reason, "subscription closed")
            }
            QueueEvent::DeliveryPanicked { topic, detail } => {
                error!(topic = %topic, detail = %detail, "panic in subscription delivery task")
            }
            QueueEvent::Acknowledged { topic, message_id } => {
                debug!(topic = %topic, message_id = %message_id, "acknowledged message")
            }
            QueueEvent::Closed => info!("queue closed"),
        }
    }
}

/// Keeps every event in memory. Useful for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryObserver {
    events: Mutex<Vec<QueueEvent>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<QueueEvent> {
        self.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&QueueEvent) -> bool) -> usize {
        self.lock().iter().filter(|event| predicate(event)).count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueueEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl QueueObserver for MemoryObserver {
    fn observe(&self, event: &QueueEvent) {
        self.lock().push(event.clone());
    }
}
