use super::*;

#[test]
fn test_counter_and_gauge() {
    let counter = Counter::default();
    counter.inc();
    counter.inc_by(4);
    assert_eq!(counter.get(), 5);

    let gauge = Gauge::default();
    gauge.set(3);
    gauge.inc();
    gauge.dec();
    gauge.dec();
    assert_eq!(gauge.get(), 2);
}

#[test]
fn test_histogram_buckets_are_cumulative() {
    let histogram = Histogram::with_bounds(&[10.0, 50.0, 100.0]);
    for v in [5.0, 25.0, 75.0, 150.0] {
        histogram.observe(v);
    }

    assert_eq!(histogram.count(), 4);
    assert_eq!(histogram.sum(), 255.0);
    assert_eq!(
        histogram.bucket_counts(),
        vec![(10.0, 1), (50.0, 2), (100.0, 3)]
    );
}

#[test]
fn test_labels_are_order_insensitive() {
    let registry = MetricsRegistry::new();
    let counter = registry.counter("scheduler_executions_total");
    counter.inc(&[("executor", "local"), ("outcome", "success")]);
    counter.inc(&[("outcome", "success"), ("executor", "local")]);

    let again = registry.counter("scheduler_executions_total");
    assert_eq!(again.get(&[("executor", "local"), ("outcome", "success")]), 2);
    assert_eq!(again.get(&[("executor", "local"), ("outcome", "failure")]), 0);
}

#[test]
fn test_kind_mismatch_is_detached() {
    let registry = MetricsRegistry::new();
    registry.gauge("scheduler_running").set(1);

    let detached = registry.counter("scheduler_running");
    detached.inc(&[]);
    assert_eq!(registry.gauge("scheduler_running").get(), 1);
}

#[test]
fn test_export_prometheus() {
    let registry = MetricsRegistry::new();
    registry
        .counter("lease_acquire_total")
        .inc(&[("key", "job:ranking"), ("outcome", "busy")]);
    registry.gauge("scheduler_running").set(2);
    registry
        .histogram("periodic_job_duration_ms")
        .observe(&[("job", "ranking"), ("success", "true")], 12.0);

    let output = registry.export_prometheus();
    assert!(output.contains("# TYPE lease_acquire_total counter"));
    assert!(output.contains(r#"lease_acquire_total{key="job:ranking",outcome="busy"} 1"#));
    assert!(output.contains("scheduler_running 2"));
    assert!(output.contains(
        r#"periodic_job_duration_ms_bucket{job="ranking",success="true",le="25"} 1"#
    ));
    assert!(output.contains(r#"periodic_job_duration_ms_count{job="ranking",success="true"} 1"#));
}

#[test]
fn test_timer_elapsed() {
    let timer = Timer::start();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(timer.elapsed_ms() >= 2.0);
}
