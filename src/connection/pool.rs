use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::BrokerSettings;
use crate::connection::conn::BrokerConnection;
use crate::connection::subscription::BrokerSubscription;
use crate::utils::error::BrokerError;

/// Pool of request/reply connections shared by every publisher.
///
/// At most `pool_size` connections are checked out at once; idle ones are
/// kept for reuse. A connection that failed a request is discarded rather
/// than returned. Subscriptions dial their own connection through
/// [`subscribe`](Self::subscribe) and are not pooled.
pub struct ConnectionPool {
    settings: BrokerSettings,
    idle: Mutex<Vec<BrokerConnection>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Dials `min_idle` connections (at least one) and verifies the broker
    /// answers a ping before returning.
    pub async fn connect(settings: BrokerSettings) -> Result<Self, BrokerError> {
        let warm = settings.min_idle.clamp(1, settings.pool_size.max(1));
        let mut idle = Vec::with_capacity(warm);
        for _ in 0..warm {
            idle.push(BrokerConnection::dial(&settings).await?);
        }
        if let Some(first) = idle.first_mut() {
            first.ping().await?;
        }
        info!(url = %settings.url(), idle = idle.len(), "connection pool ready");

        Ok(Self {
            permits: Arc::new(Semaphore::new(settings.pool_size.max(1))),
            idle: Mutex::new(idle),
            closed: AtomicBool::new(false),
            settings,
        })
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Publishes through a pooled connection.
    pub async fn publish(&self, topic: &str, payload: String) -> Result<usize, BrokerError> {
        let (mut conn, permit) = self.checkout().await?;
        match conn.publish(topic, payload).await {
            Ok(receivers) => {
                self.checkin(conn, permit);
                Ok(receivers)
            }
            Err(BrokerError::Rejected(reason)) => {
                // the broker answered, so the connection is still in sync
                self.checkin(conn, permit);
                Err(BrokerError::Rejected(reason))
            }
            Err(e) => {
                debug!(error = %e, "discarding failed pooled connection");
                Err(e)
            }
        }
    }

    /// Verifies the broker answers on a pooled connection.
    pub async fn ping(&self) -> Result<(), BrokerError> {
        let (mut conn, permit) = self.checkout().await?;
        conn.ping().await?;
        self.checkin(conn, permit);
        Ok(())
    }

    /// Dials a dedicated connection and subscribes it to `topic`.
    pub async fn subscribe(
        &self,
        topic: &str,
        confirm_timeout: Duration,
    ) -> Result<BrokerSubscription, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::PoolClosed);
        }
        let conn = BrokerConnection::dial(&self.settings).await?;
        BrokerSubscription::confirm(conn, topic, confirm_timeout).await
    }

    /// Closes every idle connection and rejects further checkouts. Calling
    /// it again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.permits.close();
        let idle: Vec<_> = self.lock_idle().drain(..).collect();
        for conn in idle {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "failed to close pooled connection");
            }
        }
        info!(url = %self.settings.url(), "connection pool closed");
    }

    async fn checkout(&self) -> Result<(BrokerConnection, OwnedSemaphorePermit), BrokerError> {
        let wait = self.settings.dial_timeout();
        let permit = timeout(wait, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| BrokerError::Timeout {
                operation: "pool checkout",
                timeout: wait,
            })?
            .map_err(|_| BrokerError::PoolClosed)?;

        let reused = self.lock_idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => BrokerConnection::dial(&self.settings).await?,
        };
        Ok((conn, permit))
    }

    fn checkin(&self, conn: BrokerConnection, permit: OwnedSemaphorePermit) {
        if !self.is_closed() {
            self.lock_idle().push(conn);
        }
        drop(permit);
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<BrokerConnection>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("url", &self.settings.url())
            .field("pool_size", &self.settings.pool_size)
            .field("closed", &self.is_closed())
            .finish()
    }
}
