//! Observability utilities for the inventory collector.
//!
//! This crate provides:
//! - Prometheus metrics recording and rendering
//! - Collection metrics (per collector slice, per pass)
//! - Background job metrics (starts, terminal states, expiry)
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, CollectionMetrics};
//!
//! init_metrics();
//! CollectionMetrics::record_slice("ec2", "eu-central-1", 3);
//! ```

pub mod collection;
pub mod jobs;

pub use collection::CollectionMetrics;
pub use jobs::JobMetrics;

pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup. When a global recorder is already installed the
/// handle still renders, it just never sees samples from this process.
pub fn init_metrics() -> &'static PrometheusHandle {
    METRICS_HANDLE.get_or_init(|| {
        let handle = match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("Prometheus metrics recorder initialized");
                handle
            }
            Err(e) => {
                warn!(error = %e, "Prometheus recorder not installed");
                PrometheusBuilder::new().build_recorder().handle()
            }
        };

        register_metric_descriptions();
        handle
    })
}

/// Get the metrics handle (None until `init_metrics` ran)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Render the current metrics in Prometheus text format
pub fn render_metrics() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

fn register_metric_descriptions() {
    use metrics::describe_counter;
    use metrics::describe_gauge;
    use metrics::describe_histogram;

    describe_counter!(
        "inventory_collector_slices_total",
        "Collector slices executed, by service, scope and status"
    );
    describe_gauge!(
        "inventory_resources_collected",
        "Resources returned by the last run of a collector slice"
    );
    describe_histogram!(
        "inventory_collection_duration_seconds",
        "Duration of a full collection pass"
    );
    describe_counter!(
        "inventory_price_lookups_total",
        "Price catalog lookups by service code and outcome"
    );

    describe_counter!("inventory_jobs_started_total", "Background jobs started, by kind");
    describe_counter!(
        "inventory_jobs_finished_total",
        "Background jobs that reached a terminal state, by kind and state"
    );
    describe_counter!(
        "inventory_jobs_expired_total",
        "Pending jobs reclassified as failed after their timeout"
    );
    describe_histogram!(
        "inventory_job_duration_seconds",
        "Wall time of background jobs, by kind"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_after_init() {
        init_metrics();
        CollectionMetrics::record_slice("ec2", "eu-central-1", 2);
        // Another test binary may own the global recorder, so only the call path is checked.
        let _ = render_metrics();
        assert!(get_metrics_handle().is_some());
    }
}
