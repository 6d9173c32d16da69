use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::config::{BrokerSettings, QueueSettings, Settings};
use crate::connection::ConnectionPool;
use crate::context::Context;
use crate::queue::delivery::{DeliveryTask, watch_cancellation};
use crate::queue::message::Message;
use crate::queue::observer::{QueueEvent, QueueObserver, TracingObserver};
use crate::queue::{MessageStream, Queue};
use crate::utils::error::QueueError;

/// Queue backed by the pub/sub broker.
///
/// Publishing goes through a shared connection pool. Every `subscribe`
/// call gets its own broker connection, delivery task and cancellation
/// watcher; live subscriptions are tracked by topic so `unsubscribe` and
/// `close` can stop them.
pub struct PubSubQueue {
    pool: Arc<ConnectionPool>,
    settings: QueueSettings,
    observer: Arc<dyn QueueObserver>,
    subscriptions: Arc<SubscriptionRegistry>,
    closed: AtomicBool,
}

impl PubSubQueue {
    /// Connects to the broker and verifies it answers.
    ///
    /// Fails with [`QueueError::Connection`] when the broker cannot be
    /// reached, or [`QueueError::Cancelled`] if `ctx` is cancelled first.
    pub async fn connect(
        ctx: &Context,
        broker: BrokerSettings,
        settings: QueueSettings,
        observer: Arc<dyn QueueObserver>,
    ) -> Result<Self, QueueError> {
        let url = broker.url();
        debug!(url = %url, "connecting to broker");

        let pool = tokio::select! {
            biased;

            _ = ctx.cancelled() => return Err(QueueError::Cancelled),
            pool = ConnectionPool::connect(broker) => pool,
        }
        .map_err(|source| QueueError::Connection {
            addr: url.clone(),
            source,
        })?;
        observer.observe(&QueueEvent::Connected { url });

        Ok(Self {
            pool: Arc::new(pool),
            settings,
            observer,
            subscriptions: Arc::new(SubscriptionRegistry::default()),
            closed: AtomicBool::new(false),
        })
    }

    /// Connects using loaded settings and the tracing observer.
    pub async fn from_settings(ctx: &Context, settings: &Settings) -> Result<Self, QueueError> {
        Self::connect(
            ctx,
            settings.broker.clone(),
            settings.queue.clone(),
            Arc::new(TracingObserver),
        )
        .await
    }

    /// Number of subscriptions whose delivery task is still running.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) || self.pool.is_closed() {
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

fn validate_topic(topic: &str) -> Result<(), QueueError> {
    if topic.is_empty() {
        return Err(QueueError::InvalidTopic);
    }
    Ok(())
}

#[async_trait]
impl Queue for PubSubQueue {
    async fn send(&self, ctx: &Context, topic: &str, mut message: Message) -> Result<(), QueueError> {
        self.ensure_open()?;
        validate_topic(topic)?;

        message.fill_defaults();
        let payload = message.encode()?;

        let receivers = tokio::select! {
            biased;

            _ = ctx.cancelled() => return Err(QueueError::Cancelled),
            published = self.pool.publish(topic, payload) => published,
        }
        .map_err(|source| QueueError::Transport {
            topic: topic.to_string(),
            source,
        })?;

        self.observer.observe(&QueueEvent::Sent {
            topic: topic.to_string(),
            message_id: message.id,
            receivers,
        });
        Ok(())
    }

    async fn subscribe(&self, ctx: &Context, topic: &str) -> Result<MessageStream, QueueError> {
        self.ensure_open()?;
        validate_topic(topic)?;

        let confirm_timeout = self.settings.confirm_timeout();
        let mut subscription = tokio::select! {
            biased;

            _ = ctx.cancelled() => return Err(QueueError::Cancelled),
            subscription = self.pool.subscribe(topic, confirm_timeout) => subscription,
        }
        .map_err(|source| QueueError::Subscription {
            topic: topic.to_string(),
            source,
        })?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);
        let Some(id) = self.subscriptions.insert(topic, stop_tx.clone()) else {
            // closed while the handshake was in flight
            if let Err(e) = subscription.close().await {
                debug!(topic = %topic, error = %e, "failed to close subscription after queue close");
            }
            return Err(QueueError::Closed);
        };
        self.observer.observe(&QueueEvent::SubscriptionConfirmed {
            topic: topic.to_string(),
        });

        let (output, stream) = mpsc::channel(self.settings.buffer_capacity.max(1));
        tokio::spawn(watch_cancellation(ctx.clone(), stop_tx));

        let registry = self.subscriptions.clone();
        DeliveryTask {
            topic: topic.to_string(),
            subscription,
            output,
            stop: stop_rx,
            observer: self.observer.clone(),
            delivery_timeout: self.settings.delivery_timeout(),
            idle_timeout: self.settings.idle_timeout(),
            max_lifetime: self.settings.max_lifetime(),
        }
        .spawn(move || registry.remove(id));

        Ok(MessageStream::new(topic, stream))
    }

    async fn unsubscribe(&self, _ctx: &Context, topic: &str) -> Result<(), QueueError> {
        validate_topic(topic)?;
        let stopped = self.subscriptions.stop_topic(topic);
        debug!(topic = %topic, stopped, "unsubscribe requested");
        Ok(())
    }

    async fn ack(&self, _ctx: &Context, topic: &str, message_id: &str) -> Result<(), QueueError> {
        self.observer.observe(&QueueEvent::Acknowledged {
            topic: topic.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.subscriptions.stop_all();
        self.pool.close().await;
        self.observer.observe(&QueueEvent::Closed);
        Ok(())
    }
}

impl std::fmt::Debug for PubSubQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubQueue")
            .field("pool", &self.pool)
            .field("settings", &self.settings)
            .field("active_subscriptions", &self.active_subscriptions())
            .finish()
    }
}

/// Stop switches of live subscriptions, keyed by subscription id.
///
/// Once `stop_all` has run the registry is closed and refuses new entries,
/// so a subscribe racing `close` cannot slip past it.
#[derive(Default)]
struct SubscriptionRegistry {
    next_id: AtomicU64,
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    closed: bool,
    entries: HashMap<u64, (String, Arc<watch::Sender<bool>>)>,
}

impl SubscriptionRegistry {
    /// Registers a stop switch. Returns `None` once the registry is closed.
    fn insert(&self, topic: &str, stop: Arc<watch::Sender<bool>>) -> Option<u64> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        state.entries.insert(id, (topic.to_string(), stop));
        Some(id)
    }

    fn remove(&self, id: u64) {
        self.lock().entries.remove(&id);
    }

    fn len(&self) -> usize {
        self.lock().entries.len()
    }

    fn stop_topic(&self, topic: &str) -> usize {
        let state = self.lock();
        let mut stopped = 0;
        for (name, stop) in state.entries.values() {
            if name == topic {
                stop.send_replace(true);
                stopped += 1;
            }
        }
        stopped
    }

    fn stop_all(&self) {
        let mut state = self.lock();
        state.closed = true;
        for (_, stop) in state.entries.values() {
            stop.send_replace(true);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
