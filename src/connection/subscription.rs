use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::connection::conn::{BrokerConnection, WsStream, unexpected};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::BrokerError;

/// Capacity of the channel between the socket reader and the subscriber.
pub const NATIVE_CHANNEL_CAPACITY: usize = 100;

/// A confirmed broker subscription on a dedicated connection.
///
/// A reader task forwards the payload of every `message` frame into a
/// bounded channel; [`receive`](Self::receive) yields `None` once the
/// connection is gone. Dropping the subscription stops the reader and closes
/// the socket.
pub struct BrokerSubscription {
    topic: String,
    sink: SplitSink<WsStream, WsMessage>,
    payloads: mpsc::Receiver<String>,
    reader: JoinHandle<()>,
    write_timeout: Duration,
}

impl BrokerSubscription {
    /// Sends the subscribe request on `conn` and waits up to
    /// `confirm_timeout` for the broker's confirmation. On failure the
    /// connection is closed before the error is returned.
    pub async fn confirm(
        mut conn: BrokerConnection,
        topic: &str,
        confirm_timeout: Duration,
    ) -> Result<Self, BrokerError> {
        if let Err(e) = handshake(&mut conn, topic, confirm_timeout).await {
            if let Err(close_err) = conn.close().await {
                debug!(topic = %topic, error = %close_err, "failed to close rejected subscription connection");
            }
            return Err(e);
        }

        let write_timeout = conn.write_timeout();
        let (sink, stream) = conn.into_stream().split();
        let (tx, payloads) = mpsc::channel(NATIVE_CHANNEL_CAPACITY);
        let reader = tokio::spawn(read_loop(topic.to_string(), stream, tx));

        Ok(Self {
            topic: topic.to_string(),
            sink,
            payloads,
            reader,
            write_timeout,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next raw payload, or `None` once the broker side has closed.
    pub async fn receive(&mut self) -> Option<String> {
        self.payloads.recv().await
    }

    /// Asks the broker to stop delivering this topic.
    pub async fn unsubscribe(&mut self) -> Result<(), BrokerError> {
        let frame = serde_json::to_string(&ClientMessage::Unsubscribe {
            topic: self.topic.clone(),
        })?;
        timeout(self.write_timeout, self.sink.send(WsMessage::text(frame)))
            .await
            .map_err(|_| BrokerError::Timeout {
                operation: "unsubscribe",
                timeout: self.write_timeout,
            })??;
        Ok(())
    }

    /// Stops the reader and closes the connection.
    pub async fn close(&mut self) -> Result<(), BrokerError> {
        self.reader.abort();
        self.payloads.close();
        timeout(self.write_timeout, self.sink.close())
            .await
            .map_err(|_| BrokerError::Timeout {
                operation: "close",
                timeout: self.write_timeout,
            })??;
        Ok(())
    }
}

impl Drop for BrokerSubscription {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for BrokerSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSubscription")
            .field("topic", &self.topic)
            .finish()
    }
}

async fn handshake(
    conn: &mut BrokerConnection,
    topic: &str,
    confirm_timeout: Duration,
) -> Result<(), BrokerError> {
    conn.write(&ClientMessage::Subscribe {
        topic: topic.to_string(),
    })
    .await?;
    match conn.read_within(confirm_timeout).await? {
        ServerMessage::Subscribed { topic: confirmed } if confirmed == topic => Ok(()),
        other => Err(unexpected(other)),
    }
}

async fn read_loop(topic: String, mut stream: SplitStream<WsStream>, tx: mpsc::Sender<String>) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(topic = %topic, error = %e, "subscription connection failed");
                break;
            }
        };
        match serde_json::from_str::<ServerMessage>(text.as_str()) {
            Ok(ServerMessage::Message { payload, .. }) => {
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
            Ok(other) => debug!(topic = %topic, frame = other.kind(), "control frame on subscription"),
            Err(e) => warn!(topic = %topic, error = %e, "undecodable frame on subscription"),
        }
    }
    debug!(topic = %topic, "subscription reader finished");
}
