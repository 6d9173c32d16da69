use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;

use crate::config::BrokerSettings;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::BrokerError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One WebSocket connection to the broker used in request/reply fashion.
///
/// Every request is answered by exactly one frame, so replies are read in
/// order. A connection that saw an error may have a reply in flight and must
/// not be reused.
pub struct BrokerConnection {
    stream: WsStream,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl BrokerConnection {
    /// Opens a connection, bounded by the dial timeout.
    pub async fn dial(settings: &BrokerSettings) -> Result<Self, BrokerError> {
        let url = settings.url();
        let dial_timeout = settings.dial_timeout();
        let (stream, _response) = timeout(dial_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| BrokerError::Timeout {
                operation: "dial",
                timeout: dial_timeout,
            })??;
        debug!(url = %url, "dialed broker");

        Ok(Self {
            stream,
            read_timeout: settings.read_timeout(),
            write_timeout: settings.write_timeout(),
        })
    }

    /// Round-trips a `ping` to verify the broker answers.
    pub async fn ping(&mut self) -> Result<(), BrokerError> {
        self.write(&ClientMessage::Ping).await?;
        match self.read().await? {
            ServerMessage::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Publishes a raw payload. Returns how many subscribers it reached.
    pub async fn publish(&mut self, topic: &str, payload: String) -> Result<usize, BrokerError> {
        self.write(&ClientMessage::Publish {
            topic: topic.to_string(),
            payload,
        })
        .await?;
        match self.read().await? {
            ServerMessage::Published { receivers, .. } => Ok(receivers),
            other => Err(unexpected(other)),
        }
    }

    pub async fn close(mut self) -> Result<(), BrokerError> {
        timeout(self.write_timeout, self.stream.close(None))
            .await
            .map_err(|_| BrokerError::Timeout {
                operation: "close",
                timeout: self.write_timeout,
            })??;
        Ok(())
    }

    pub(crate) async fn write(&mut self, frame: &ClientMessage) -> Result<(), BrokerError> {
        let text = serde_json::to_string(frame)?;
        timeout(self.write_timeout, self.stream.send(WsMessage::text(text)))
            .await
            .map_err(|_| BrokerError::Timeout {
                operation: "write",
                timeout: self.write_timeout,
            })??;
        Ok(())
    }

    pub(crate) async fn read(&mut self) -> Result<ServerMessage, BrokerError> {
        self.read_within(self.read_timeout).await
    }

    pub(crate) async fn read_within(&mut self, limit: Duration) -> Result<ServerMessage, BrokerError> {
        timeout(limit, next_frame(&mut self.stream))
            .await
            .map_err(|_| BrokerError::Timeout {
                operation: "read",
                timeout: limit,
            })?
    }

    pub(crate) fn into_stream(self) -> WsStream {
        self.stream
    }

    pub(crate) fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}

impl std::fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("stream", &"WebSocketStream")
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

/// Reads the next protocol frame, skipping control frames.
async fn next_frame(stream: &mut WsStream) -> Result<ServerMessage, BrokerError> {
    loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => return Ok(serde_json::from_str(text.as_str())?),
            Some(Ok(WsMessage::Close(_))) | None => return Err(BrokerError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Maps a reply that does not answer the request to an error. Broker
/// `error` frames become rejections.
pub(crate) fn unexpected(frame: ServerMessage) -> BrokerError {
    match frame {
        ServerMessage::Error { message } => BrokerError::Rejected(message),
        other => BrokerError::UnexpectedReply(other.kind()),
    }
}
