//! The ingest service facade.
//!
//! The single ingestion entry point plus the outward query surface:
//! collaborators producing RSS items, email-derived URLs, or manual
//! submissions all funnel through [`IngestService::submit`].

use gleaner_core::{CandidateItem, GleanerResult, JobId};
use gleaner_store::{
    error_breakdown, resolver_reliability, status_counts, throughput, ErrorBucket, EventLog,
    EventRecord, Job, JobStore, ResolverReliability, StatusCounts, Submission, Throughput,
    TimeWindow,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Analytics view selector for [`IngestService::query_analytics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsView {
    /// Current job counts by state.
    StatusCounts,
    /// Terminal outcomes over a window.
    Throughput,
    /// Grouped failure reasons over a window.
    ErrorBreakdown,
    /// Reliability of one resolver.
    ResolverReliability {
        /// Resolver name.
        resolver: String,
    },
}

/// Structured analytics result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsReport {
    /// Current job counts by state.
    StatusCounts(StatusCounts),
    /// Terminal outcomes over a window.
    Throughput(Throughput),
    /// Grouped failure reasons over a window.
    ErrorBreakdown(Vec<ErrorBucket>),
    /// Reliability of one resolver.
    ResolverReliability(ResolverReliability),
}

/// Facade over the job store and event log.
pub struct IngestService {
    store: Arc<dyn JobStore>,
    log: Arc<EventLog>,
}

impl IngestService {
    /// Creates a service over a store and its event log.
    pub fn new(store: Arc<dyn JobStore>, log: Arc<EventLog>) -> Self {
        Self { store, log }
    }

    /// Submits a candidate for resolution. Idempotent per fingerprint:
    /// while a matching non-terminal job exists, every call returns its id.
    pub async fn submit(&self, candidate: CandidateItem) -> GleanerResult<JobId> {
        let submission = self.store.submit(candidate, false).await?;
        if let Submission::AlreadyProcessed(job) = &submission {
            info!(job_id = %job.id, state = %job.state, "Returning prior terminal result");
        }
        Ok(submission.job_id().clone())
    }

    /// Explicitly reprocesses a candidate whose prior job is terminal.
    pub async fn resubmit(&self, candidate: CandidateItem) -> GleanerResult<JobId> {
        let submission = self.store.submit(candidate, true).await?;
        Ok(submission.job_id().clone())
    }

    /// Submits and returns the full submission outcome.
    pub async fn submit_detailed(&self, candidate: CandidateItem) -> GleanerResult<Submission> {
        self.store.submit(candidate, false).await
    }

    /// Current snapshot of a job.
    pub async fn get_status(&self, job_id: &JobId) -> Option<Job> {
        self.store.get(job_id).await
    }

    /// Subscribes to the live event log tail, for external monitors.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.log.subscribe()
    }

    /// Poll interface over the log: records after the given sequence.
    pub fn events_since(&self, after: u64) -> Vec<EventRecord> {
        self.log.events_since(after)
    }

    /// Current job counts by state, from a full log scan.
    pub fn status_counts(&self) -> StatusCounts {
        status_counts(&self.log.snapshot())
    }

    /// Throughput over a window.
    pub fn throughput(&self, window: TimeWindow) -> Throughput {
        throughput(&self.log.snapshot(), window)
    }

    /// Grouped failure reasons over a window.
    pub fn error_breakdown(&self, window: TimeWindow) -> Vec<ErrorBucket> {
        error_breakdown(&self.log.snapshot(), window)
    }

    /// Reliability figures for one resolver.
    pub fn resolver_reliability(&self, resolver: &str) -> ResolverReliability {
        resolver_reliability(&self.log.snapshot(), resolver)
    }

    /// Dispatches an analytics query by view name.
    pub fn query_analytics(&self, view: AnalyticsView, window: TimeWindow) -> AnalyticsReport {
        match view {
            AnalyticsView::StatusCounts => AnalyticsReport::StatusCounts(self.status_counts()),
            AnalyticsView::Throughput => AnalyticsReport::Throughput(self.throughput(window)),
            AnalyticsView::ErrorBreakdown => {
                AnalyticsReport::ErrorBreakdown(self.error_breakdown(window))
            }
            AnalyticsView::ResolverReliability { resolver } => {
                AnalyticsReport::ResolverReliability(self.resolver_reliability(&resolver))
            }
        }
    }
}
