//! Observability collaborator
//!
//! Components receive an [`Observability`] at construction instead of
//! reaching for process-wide state. It carries the component name (attached
//! to every span the component opens) and the shared [`MetricsRegistry`].

use std::sync::Arc;
use tracing::Span;

use crate::utils::MetricsRegistry;

/// Logger + metrics handle injected into scheduler components
#[derive(Clone)]
pub struct Observability {
    component: Arc<str>,
    metrics: MetricsRegistry,
}

impl Observability {
    /// Create a collaborator with a fresh registry
    pub fn new(component: &str) -> Self {
        Self::with_registry(component, MetricsRegistry::new())
    }

    /// Create a collaborator that records into `metrics`
    pub fn with_registry(component: &str, metrics: MetricsRegistry) -> Self {
        Self {
            component: Arc::from(component),
            metrics,
        }
    }

    /// Same registry, different component name
    pub fn child(&self, component: &str) -> Self {
        Self::with_registry(component, self.metrics.clone())
    }

    /// Component name
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Metrics registry
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Span tagging events with this component
    pub fn span(&self) -> Span {
        tracing::info_span!("component", name = %self.component)
    }

    /// Increment a labeled counter
    pub fn incr(&self, name: &str, labels: &[(&str, &str)]) {
        self.metrics.counter(name).inc(labels);
    }

    /// Record a duration in milliseconds
    pub fn observe_ms(&self, name: &str, labels: &[(&str, &str)], millis: f64) {
        self.metrics.histogram(name).observe(labels, millis);
    }
}

impl std::fmt::Debug for Observability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observability")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

impl Default for Observability {
    fn default() -> Self {
        Self::new("jobwarden")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_shares_registry() {
        let root = Observability::new("scheduler");
        let child = root.child("lease");

        child.incr("lease_acquire_total", &[("outcome", "acquired")]);
        assert_eq!(child.component(), "lease");
        assert_eq!(
            root.metrics()
                .counter("lease_acquire_total")
                .get(&[("outcome", "acquired")]),
            1
        );
    }

    #[test]
    fn test_observe_ms() {
        let obs = Observability::default();
        obs.observe_ms("periodic_job_duration_ms", &[("job", "ranking")], 3.5);
        assert_eq!(
            obs.metrics()
                .histogram("periodic_job_duration_ms")
                .count(&[("job", "ranking")]),
            1
        );
    }
}
