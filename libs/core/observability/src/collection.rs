//! Metrics for collection passes.

use metrics::{counter, gauge, histogram};

/// Collection metrics recorder
pub struct CollectionMetrics;

impl CollectionMetrics {
    /// A collector slice (one service in one scope) finished successfully
    pub fn record_slice(service: &str, scope: &str, resources: usize) {
        counter!(
            "inventory_collector_slices_total",
            "service" => service.to_string(),
            "scope" => scope.to_string(),
            "status" => "success"
        )
        .increment(1);

        gauge!(
            "inventory_resources_collected",
            "service" => service.to_string(),
            "scope" => scope.to_string()
        )
        .set(resources as f64);

        tracing::debug!(service, scope, resources, "Collector slice completed");
    }

    /// A collector slice failed and was isolated
    pub fn record_slice_failure(service: &str, scope: &str) {
        counter!(
            "inventory_collector_slices_total",
            "service" => service.to_string(),
            "scope" => scope.to_string(),
            "status" => "failure"
        )
        .increment(1);
    }

    /// A full pass over every scope finished
    pub fn record_pass(duration_secs: f64) {
        histogram!("inventory_collection_duration_seconds").record(duration_secs);
    }

    /// One price catalog lookup; `found` is false when the catalog had no match
    pub fn record_price_lookup(service_code: &str, found: bool) {
        counter!(
            "inventory_price_lookups_total",
            "service_code" => service_code.to_string(),
            "outcome" => if found { "found" } else { "missing" }
        )
        .increment(1);
    }
}
