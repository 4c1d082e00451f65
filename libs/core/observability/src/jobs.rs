//! Metrics for background jobs.

use metrics::{counter, histogram};

/// Background job metrics recorder
pub struct JobMetrics;

impl JobMetrics {
    pub fn record_started(kind: &str) {
        counter!("inventory_jobs_started_total", "kind" => kind.to_string()).increment(1);
    }

    pub fn record_finished(kind: &str, state: &str, duration_secs: f64) {
        counter!(
            "inventory_jobs_finished_total",
            "kind" => kind.to_string(),
            "state" => state.to_string()
        )
        .increment(1);

        histogram!("inventory_job_duration_seconds", "kind" => kind.to_string())
            .record(duration_secs);
    }

    pub fn record_expired(kind: &str) {
        counter!("inventory_jobs_expired_total", "kind" => kind.to_string()).increment(1);

        tracing::warn!(kind, "Pending job expired");
    }
}
