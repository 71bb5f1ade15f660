//! Observability utilities for the connector runners.

pub mod logging;

pub use logging::init_tracing;
