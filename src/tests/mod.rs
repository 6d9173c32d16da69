//! End-to-end tests against a broker on an ephemeral port.
