//! Metrics for pipeline monitoring.

use ::metrics::{describe_counter, describe_gauge, describe_histogram};

/// Metric names for the pipeline.
pub mod names {
    /// Total jobs leased by workers.
    pub const JOBS_LEASED_TOTAL: &str = "gleaner_jobs_leased_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "gleaner_jobs_completed_total";
    /// Total jobs terminally failed.
    pub const JOBS_FAILED_TOTAL: &str = "gleaner_jobs_failed_total";
    /// Total jobs requeued after lease expiry.
    pub const JOBS_REQUEUED_TOTAL: &str = "gleaner_jobs_requeued_total";

    /// Total resolver retries.
    pub const RESOLVER_RETRIES_TOTAL: &str = "gleaner_resolver_retries_total";
    /// Total resolver invocations skipped by an open breaker.
    pub const RESOLVER_SKIPS_TOTAL: &str = "gleaner_resolver_skips_total";

    /// Current pending jobs.
    pub const JOBS_PENDING: &str = "gleaner_jobs_pending";

    /// Job processing duration in seconds (lease to terminal).
    pub const JOB_DURATION_SECONDS: &str = "gleaner_job_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_LEASED_TOTAL, "Total number of jobs leased by workers");
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(names::JOBS_FAILED_TOTAL, "Total number of jobs that failed");
    describe_counter!(
        names::JOBS_REQUEUED_TOTAL,
        "Total number of jobs requeued after lease expiry"
    );
    describe_counter!(names::RESOLVER_RETRIES_TOTAL, "Total number of resolver retries");
    describe_counter!(
        names::RESOLVER_SKIPS_TOTAL,
        "Total number of resolver invocations skipped by an open circuit breaker"
    );
    describe_gauge!(names::JOBS_PENDING, "Current number of pending jobs");
    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job processing duration in seconds, from lease to terminal state"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_is_idempotent() {
        register_metrics();
        register_metrics();
    }
}
