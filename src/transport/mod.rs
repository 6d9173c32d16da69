//! The `transport` module is responsible for network communication with the
//! development broker over WebSockets.
//!
//! It defines the JSON frames exchanged by queue connections and the broker,
//! and implements the WebSocket server that forwards requests to the
//! in-memory `Broker`.

pub mod message;
pub mod websocket;
