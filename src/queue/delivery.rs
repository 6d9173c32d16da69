//! Per-subscription background tasks.
//!
//! A delivery task relays payloads from a [`BrokerSubscription`] into the
//! consumer's bounded channel. It waits on the stop signal, the broker and
//! (while handing off) the output buffer at the same time, so a stop request
//! is observed from any suspension point. A watcher task turns cancellation
//! of the subscribe context into the stop signal.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};

use crate::connection::BrokerSubscription;
use crate::context::Context;
use crate::queue::message::Message;
use crate::queue::observer::{CloseReason, QueueEvent, QueueObserver};
use crate::utils::error::BrokerError;

pub(crate) struct DeliveryTask {
    pub topic: String,
    pub subscription: BrokerSubscription,
    pub output: mpsc::Sender<Message>,
    pub stop: watch::Receiver<bool>,
    pub observer: Arc<dyn QueueObserver>,
    pub delivery_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl DeliveryTask {
    /// Runs the task in the background. `on_exit` runs after the output
    /// channel has been closed, whatever ended the task, including a panic
    /// in the observer.
    pub fn spawn<F>(self, on_exit: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let topic = self.topic.clone();
        let observer = self.observer.clone();

        tokio::spawn(async move {
            // runs even if the observer panics below
            let _exit = OnExit(Some(on_exit));

            // the task future owns the output sender, so finishing or
            // unwinding it closes the consumer's channel
            let reason = match AssertUnwindSafe(self.run()).catch_unwind().await {
                Ok(reason) => reason,
                Err(panic) => {
                    observer.observe(&QueueEvent::DeliveryPanicked {
                        topic: topic.clone(),
                        detail: panic_detail(panic.as_ref()),
                    });
                    CloseReason::Panicked
                }
            };
            observer.observe(&QueueEvent::SubscriptionClosed { topic, reason });
        })
    }

    async fn run(mut self) -> CloseReason {
        let lifetime_deadline = self.max_lifetime.map(|limit| Instant::now() + limit);
        let mut last_delivery = Instant::now();

        let reason = loop {
            let idle_deadline = self.idle_timeout.map(|limit| last_delivery + limit);

            tokio::select! {
                biased;

                _ = stopped(&mut self.stop) => break CloseReason::Stopped,
                _ = self.output.closed() => break CloseReason::ConsumerDropped,
                _ = sleep_until_some(lifetime_deadline) => break CloseReason::LifetimeExceeded,
                _ = sleep_until_some(idle_deadline) => break CloseReason::IdleTimeout,
                payload = self.subscription.receive() => {
                    let Some(payload) = payload else {
                        break CloseReason::BrokerClosed;
                    };
                    match self.relay(&payload).await {
                        Ok(true) => last_delivery = Instant::now(),
                        Ok(false) => {}
                        Err(reason) => break reason,
                    }
                }
            }
        };

        self.teardown(reason).await;
        reason
    }

    /// Decodes one payload and hands it to the consumer.
    ///
    /// Returns whether the message was delivered; undecodable and timed-out
    /// messages are reported and skipped.
    async fn relay(&mut self, payload: &str) -> Result<bool, CloseReason> {
        let message = match Message::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                self.observer.observe(&QueueEvent::DecodeFailed {
                    topic: self.topic.clone(),
                    error: e.to_string(),
                });
                return Ok(false);
            }
        };
        let message_id = message.id.clone();
        self.observer.observe(&QueueEvent::Received {
            topic: self.topic.clone(),
            message_id: message_id.clone(),
        });

        tokio::select! {
            biased;

            _ = stopped(&mut self.stop) => Err(CloseReason::Stopped),
            sent = timeout(self.delivery_timeout, self.output.send(message)) => match sent {
                Ok(Ok(())) => Ok(true),
                Ok(Err(_)) => Err(CloseReason::ConsumerDropped),
                Err(_) => {
                    self.observer.observe(&QueueEvent::Dropped {
                        topic: self.topic.clone(),
                        message_id,
                    });
                    Ok(false)
                }
            },
        }
    }

    async fn teardown(&mut self, reason: CloseReason) {
        if reason != CloseReason::BrokerClosed {
            match self.subscription.unsubscribe().await {
                Ok(()) => self.observer.observe(&QueueEvent::Unsubscribed {
                    topic: self.topic.clone(),
                }),
                Err(e) => self.observer.observe(&QueueEvent::UnsubscribeFailed {
                    topic: self.topic.clone(),
                    error: e.to_string(),
                }),
            }
        }
        let closed = self.subscription.close().await;
        report_close(self.observer.as_ref(), &self.topic, closed);
    }
}

/// Calls the wrapped closure when dropped.
struct OnExit<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for OnExit<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

pub(super) fn report_close(
    observer: &dyn QueueObserver,
    topic: &str,
    result: Result<(), BrokerError>,
) {
    if let Err(e) = result {
        observer.observe(&QueueEvent::CloseFailed {
            topic: topic.to_string(),
            error: e.to_string(),
        });
    }
}

/// Flips `stop` once `ctx` is cancelled. Returns early when every stop
/// receiver is gone, i.e. the delivery task has already finished.
pub(crate) async fn watch_cancellation(ctx: Context, stop: Arc<watch::Sender<bool>>) {
    tokio::select! {
        _ = ctx.cancelled() => {
            stop.send_replace(true);
        }
        _ = stop.closed() => {}
    }
}

/// Resolves once the stop flag is set or its senders are gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
