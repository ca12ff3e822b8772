//! Observability for the gitfleet engine.
//!
//! - **Logging**: human-readable and JSON output via `tracing-subscriber`
//! - **Spans**: one span per batch operation, tagged with a generated trace id
//! - **Metrics**: in-process counters, gauges and histograms with Prometheus export

pub mod logging;
pub mod metrics;
pub mod tracing_setup;
