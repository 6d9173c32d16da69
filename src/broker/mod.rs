//! The `broker` module holds the in-memory topic table served by the
//! development broker.

pub mod engine;
pub mod topic;

pub use engine::Broker;
