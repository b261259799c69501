use once_cell::sync::Lazy;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

// Global registry and metrics are initialized lazily. Registration failures
// (a duplicate name) leave the collector working but unexported.
static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("pypeline".to_string()), None).unwrap_or_default()
});

fn counter(name: &str, help: &str) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), &["pype"])
        .unwrap_or_else(|e| panic!("invalid metric `{name}`: {e}"));
    REGISTRY.register(Box::new(c.clone())).ok();
    c
}

static PYPE_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new("pype_duration_ms", "Pype run duration in milliseconds")
        .buckets(vec![10.0, 50.0, 100.0, 500.0, 1_000.0, 5_000.0, 30_000.0, 120_000.0, 600_000.0]);
    let hist = HistogramVec::new(opts, &["pype"])
        .unwrap_or_else(|e| panic!("invalid metric `pype_duration_ms`: {e}"));
    REGISTRY.register(Box::new(hist.clone())).ok();
    hist
});

static PYPE_RUNS: Lazy<CounterVec> = Lazy::new(|| counter("pype_runs_total", "Total pype runs started"));

static PYPE_FAILURES: Lazy<CounterVec> = Lazy::new(|| counter("pype_failures_total", "Total failed pype runs"));

static ROWS_EXTRACTED: Lazy<CounterVec> =
    Lazy::new(|| counter("rows_extracted_total", "Rows fetched from the source"));

static ROWS_WRITTEN: Lazy<CounterVec> =
    Lazy::new(|| counter("rows_written_total", "Rows written to the destination"));

/// Observe a pype run duration in milliseconds.
pub fn observe_duration(pype: &str, duration_ms: f64) {
    PYPE_DURATION_MS.with_label_values(&[pype]).observe(duration_ms);
}

pub fn inc_run(pype: &str) {
    PYPE_RUNS.with_label_values(&[pype]).inc();
}

pub fn inc_failure(pype: &str) {
    PYPE_FAILURES.with_label_values(&[pype]).inc();
}

pub fn add_rows_extracted(pype: &str, rows: usize) {
    ROWS_EXTRACTED.with_label_values(&[pype]).inc_by(rows as f64);
}

pub fn add_rows_written(pype: &str, rows: usize) {
    ROWS_WRITTEN.with_label_values(&[pype]).inc_by(rows as f64);
}

/// Gather metrics as text in Prometheus exposition format.
///
/// There is no exporter; callers embed this text wherever they serve metrics.
///
/// # Example
///
/// ```no_run
/// use pypeline_core::metrics;
/// metrics::inc_run("example_pype");
/// let body = metrics::gather_text();
/// println!("metrics:\n{}", body);
/// ```
pub fn gather_text() -> String {
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        inc_run("metrics_test");
        add_rows_written("metrics_test", 5);
        observe_duration("metrics_test", 12.0);

        let txt = gather_text();
        assert!(txt.contains("pypeline_pype_runs_total"));
        assert!(txt.contains("pypeline_rows_written_total{pype=\"metrics_test\"} 5"));
        assert!(txt.contains("pypeline_pype_duration_ms_bucket"));
    }
}
