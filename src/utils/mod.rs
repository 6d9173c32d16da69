//! The `utils` module collects shared pieces used across `popqueue`: the
//! error types and the logging setup.

pub mod error;
pub mod logging;
