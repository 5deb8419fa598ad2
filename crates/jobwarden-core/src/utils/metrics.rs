//! Metrics collection for observability
//!
//! Lightweight, lock-light metrics without an external exporter. A
//! [`MetricsRegistry`] is created by the application and handed to each
//! component; there is no process-wide registry.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Sorted `(key, value)` label pairs
pub type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    key.sort();
    key
}

fn format_labels(labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!("{{{}}}", parts.join(","))
}

/// Monotonic counter
#[derive(Debug, Default, Clone)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Increment by 1
    pub fn inc(&self) {
        self.inc_by(1);
    }

    /// Increment by `n`
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Value that can go up and down
#[derive(Debug, Default, Clone)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    /// Set the value
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Increment by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement by 1
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Cumulative histogram over fixed upper bounds
#[derive(Debug, Clone)]
pub struct Histogram {
    bounds: Arc<[f64]>,
    buckets: Arc<[AtomicU64]>,
    // Sum kept in thousandths to stay atomic.
    sum_milli: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    /// Default bounds, suited to durations in milliseconds
    pub const DEFAULT_BOUNDS_MS: [f64; 12] = [
        5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 60000.0,
    ];

    /// Histogram with the default millisecond bounds
    #[must_use]
    pub fn new() -> Self {
        Self::with_bounds(&Self::DEFAULT_BOUNDS_MS)
    }

    /// Histogram with custom upper bounds
    #[must_use]
    pub fn with_bounds(bounds: &[f64]) -> Self {
        Self {
            bounds: bounds.into(),
            buckets: bounds.iter().map(|_| AtomicU64::new(0)).collect(),
            sum_milli: Arc::new(AtomicU64::new(0)),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record one observation
    pub fn observe(&self, value: f64) {
        self.sum_milli
            .fetch_add((value.max(0.0) * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for (bound, bucket) in self.bounds.iter().zip(self.buckets.iter()) {
            if value <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Number of observations
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of observations
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum_milli.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// `(upper bound, cumulative count)` pairs
    #[must_use]
    pub fn bucket_counts(&self) -> Vec<(f64, u64)> {
        self.bounds
            .iter()
            .zip(self.buckets.iter())
            .map(|(b, c)| (*b, c.load(Ordering::Relaxed)))
            .collect()
    }

    fn write_prometheus(&self, out: &mut String, name: &str, labels: &[(String, String)]) {
        for (bound, count) in self.bucket_counts() {
            let mut with_le = labels.to_vec();
            with_le.push(("le".to_string(), bound.to_string()));
            let _ = writeln!(out, "{}_bucket{} {}", name, format_labels(&with_le), count);
        }
        let mut inf = labels.to_vec();
        inf.push(("le".to_string(), "+Inf".to_string()));
        let _ = writeln!(out, "{}_bucket{} {}", name, format_labels(&inf), self.count());
        let _ = writeln!(out, "{}_sum{} {}", name, format_labels(labels), self.sum());
        let _ = writeln!(out, "{}_count{} {}", name, format_labels(labels), self.count());
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Measures elapsed wall time
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start timing
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed milliseconds
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// Counter split by label set
#[derive(Debug, Default, Clone)]
pub struct LabeledCounter {
    entries: Arc<RwLock<HashMap<LabelKey, Counter>>>,
}

impl LabeledCounter {
    /// Increment the series for `labels` by 1
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.series(labels).inc();
    }

    /// Value of the series for `labels` (0 if never touched)
    #[must_use]
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        let key = label_key(labels);
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&key).map(Counter::get).unwrap_or(0)
    }

    fn series(&self, labels: &[(&str, &str)]) -> Counter {
        let key = label_key(labels);
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(c) = entries.get(&key) {
                return c.clone();
            }
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.entry(key).or_default().clone()
    }

    fn snapshot(&self) -> Vec<(LabelKey, u64)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().map(|(k, c)| (k.clone(), c.get())).collect()
    }
}

/// Histogram split by label set
#[derive(Debug, Default, Clone)]
pub struct LabeledHistogram {
    entries: Arc<RwLock<HashMap<LabelKey, Histogram>>>,
}

impl LabeledHistogram {
    /// Observe `value` in the series for `labels`
    pub fn observe(&self, labels: &[(&str, &str)], value: f64) {
        self.series(labels).observe(value);
    }

    /// Observation count for `labels` (0 if never touched)
    #[must_use]
    pub fn count(&self, labels: &[(&str, &str)]) -> u64 {
        let key = label_key(labels);
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&key).map(Histogram::count).unwrap_or(0)
    }

    fn series(&self, labels: &[(&str, &str)]) -> Histogram {
        let key = label_key(labels);
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(h) = entries.get(&key) {
                return h.clone();
            }
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.entry(key).or_default().clone()
    }

    fn snapshot(&self) -> Vec<(LabelKey, Histogram)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().map(|(k, h)| (k.clone(), h.clone())).collect()
    }
}

#[derive(Clone)]
enum Metric {
    Counter(LabeledCounter),
    Gauge(Gauge),
    Histogram(LabeledHistogram),
}

/// Named metrics, created on first use
#[derive(Default, Clone)]
pub struct MetricsRegistry {
    // BTreeMap keeps the export order stable.
    metrics: Arc<RwLock<BTreeMap<String, Metric>>>,
}

impl MetricsRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_insert(&self, name: &str, make: fn() -> Metric) -> Metric {
        {
            let metrics = self.metrics.read().unwrap_or_else(|e| e.into_inner());
            if let Some(m) = metrics.get(name) {
                return m.clone();
            }
        }
        let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        metrics.entry(name.to_string()).or_insert_with(make).clone()
    }

    /// Get or create a labeled counter.
    ///
    /// A name registered as another metric kind yields a detached counter.
    pub fn counter(&self, name: &str) -> LabeledCounter {
        match self.get_or_insert(name, || Metric::Counter(LabeledCounter::default())) {
            Metric::Counter(c) => c,
            _ => LabeledCounter::default(),
        }
    }

    /// Get or create a gauge
    pub fn gauge(&self, name: &str) -> Gauge {
        match self.get_or_insert(name, || Metric::Gauge(Gauge::default())) {
            Metric::Gauge(g) => g,
            _ => Gauge::default(),
        }
    }

    /// Get or create a labeled histogram (millisecond bounds)
    pub fn histogram(&self, name: &str) -> LabeledHistogram {
        match self.get_or_insert(name, || Metric::Histogram(LabeledHistogram::default())) {
            Metric::Histogram(h) => h,
            _ => LabeledHistogram::default(),
        }
    }

    /// Render every metric in Prometheus text format
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();
        let metrics = self.metrics.read().unwrap_or_else(|e| e.into_inner());
        for (name, metric) in metrics.iter() {
            match metric {
                Metric::Counter(c) => {
                    let _ = writeln!(out, "# TYPE {} counter", name);
                    let mut series = c.snapshot();
                    series.sort();
                    for (labels, value) in series {
                        let _ = writeln!(out, "{}{} {}", name, format_labels(&labels), value);
                    }
                }
                Metric::Gauge(g) => {
                    let _ = writeln!(out, "# TYPE {} gauge", name);
                    let _ = writeln!(out, "{} {}", name, g.get());
                }
                Metric::Histogram(h) => {
                    let _ = writeln!(out, "# TYPE {} histogram", name);
                    let mut series = h.snapshot();
                    series.sort_by(|a, b| a.0.cmp(&b.0));
                    for (labels, histogram) in series {
                        histogram.write_prometheus(&mut out, name, &labels);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests;
