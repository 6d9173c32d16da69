use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

/// Represents a WebSocket connection registered with the development broker.
///
/// Each client is uniquely identified by an `id` and owns a channel
/// (`sender`) drained by the connection's write loop.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for the connection.
    pub id: String,

    /// Channel to send WebSocket frames to the connection.
    pub sender: UnboundedSender<WsMessage>,
}

impl Client {
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: format!("client-{}", Uuid::new_v4()),
            sender,
        }
    }

    /// Queues a frame for the write loop. Returns `false` once the
    /// connection has shut down.
    pub fn send(&self, frame: WsMessage) -> bool {
        self.sender.send(frame).is_ok()
    }
}
