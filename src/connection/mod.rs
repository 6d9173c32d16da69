//! The `connection` module is the queue's side of the broker protocol.
//!
//! - `conn`: a single request/reply WebSocket connection
//! - `pool`: the shared pool of request connections used for publishing
//! - `subscription`: a dedicated, confirmed subscription connection whose
//!   payloads are relayed by a reader task

pub mod conn;
pub mod pool;
pub mod subscription;

pub use conn::BrokerConnection;
pub use pool::ConnectionPool;
pub use subscription::BrokerSubscription;
