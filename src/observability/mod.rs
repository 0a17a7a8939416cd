//! Observability: structured logging and process-wide counters

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{metrics, MetricsSnapshot, RelayMetrics};

// Span macros for structured logging
pub use logging::{mqtt_span, relay_span, storage_span};
