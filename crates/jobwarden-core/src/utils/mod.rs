//! Utility modules for jobwarden-core
//!
//! - retry: bounded retry with fixed or exponential spacing
//! - metrics: in-process counters, gauges and histograms with Prometheus export

mod metrics;
mod retry;

pub use metrics::{
    Counter, Gauge, Histogram, LabelKey, LabeledCounter, LabeledHistogram, MetricsRegistry, Timer,
};
pub use retry::{retry_with_policy, Backoff, RetryError, RetryPolicy};
