//! WebSocket transport
//!
//! Minimal WebSocket server that translates protocol frames into broker
//! operations. Responsibilities:
//! - accept TCP/WebSocket connections
//! - create a `Client` for each connection and register it with the `Broker`
//! - answer `ping`, `subscribe`, `unsubscribe` and `publish` requests in order
//! - remove the client from every topic when the connection ends

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::Broker;
use crate::broker::topic::{SubscriberId, validate_topic_name};
use crate::client::Client;
use crate::transport::message::{ClientMessage, ServerMessage};

/// Binds `addr` and serves broker connections until the listener fails.
pub async fn start_websocket_server(addr: &str, broker: Arc<Mutex<Broker>>) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, broker).await
}

/// Serves broker connections on an already bound listener.
pub async fn serve(listener: TcpListener, broker: Arc<Mutex<Broker>>) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "broker listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        spawn(handle_connection(stream, peer, broker.clone()));
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, broker: Arc<Mutex<Broker>>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(peer = %peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let client = Client::new(tx);
    let client_id = client.id.clone();
    lock(&broker).register_client(client);
    debug!(client_id = %client_id, peer = %peer, "client connected");

    let cleanup_called = Arc::new(AtomicBool::new(false));
    let do_cleanup = {
        let broker = broker.clone();
        let client_id = client_id.clone();
        let cleanup_called = cleanup_called.clone();

        move || {
            if !cleanup_called.swap(true, Ordering::SeqCst) {
                lock(&broker).cleanup_client(&client_id);
            }
        }
    };

    {
        let client_id = client_id.clone();
        let do_cleanup = do_cleanup.clone();

        spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    debug!(client_id = %client_id, error = %e, "failed to write frame");
                    break;
                }
            }
            let _ = ws_sender.close().await;
            do_cleanup();
        });
    }

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let mut guard = lock(&broker);
        let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(request) => handle_request(&mut guard, &client_id, request),
            Err(err) => {
                warn!(
                    client_id = %client_id,
                    error = %err,
                    frame = %text.as_str().chars().take(100).collect::<String>(),
                    "invalid client frame"
                );
                ServerMessage::error(format!("invalid frame: {err}"))
            }
        };
        if !guard.reply(&client_id, &reply) {
            break;
        }
    }

    debug!(client_id = %client_id, "client disconnected");
    do_cleanup();
}

pub(crate) fn handle_request(
    broker: &mut Broker,
    client_id: &SubscriberId,
    request: ClientMessage,
) -> ServerMessage {
    match request {
        ClientMessage::Ping => ServerMessage::Pong,
        ClientMessage::Subscribe { topic } => {
            if let Err(reason) = validate_topic_name(&topic) {
                return ServerMessage::error(reason);
            }
            broker.subscribe(&topic, client_id.clone());
            debug!(client_id = %client_id, topic = %topic, "subscribed");
            ServerMessage::Subscribed { topic }
        }
        ClientMessage::Unsubscribe { topic } => {
            broker.unsubscribe(&topic, client_id);
            debug!(client_id = %client_id, topic = %topic, "unsubscribed");
            ServerMessage::Unsubscribed { topic }
        }
        ClientMessage::Publish { topic, payload } => {
            if let Err(reason) = validate_topic_name(&topic) {
                return ServerMessage::error(reason);
            }
            let receivers = broker.publish(&topic, payload);
            debug!(client_id = %client_id, topic = %topic, receivers, "published");
            ServerMessage::Published { topic, receivers }
        }
    }
}

fn lock(broker: &Mutex<Broker>) -> std::sync::MutexGuard<'_, Broker> {
    broker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
