//! Lightweight in-process metrics.
//!
//! Counters and histograms are atomics keyed by label sets in `DashMap`, and
//! render to Prometheus text on demand.

pub mod metrics;

pub use metrics::EngineMetrics;
