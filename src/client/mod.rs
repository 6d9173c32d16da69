//! The `client` module defines the broker-side representation of a
//! connected WebSocket peer.

pub mod pubsub_client;
pub use pubsub_client::Client;
