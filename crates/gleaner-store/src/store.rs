//! Job store abstraction.

use crate::event::EventPayload;
use crate::job::{Job, JobState, LeasedJob, Submission};
use async_trait::async_trait;
use gleaner_core::{CandidateItem, GleanerResult, JobId, LeaseToken, StorageRef};

/// Durable, queryable persistence of job records and their transitions.
///
/// Implementations must uphold two invariants: within the non-terminal
/// set, fingerprint is unique (idempotent submission), and exactly one
/// worker holds the lease for a given job at a time.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Submits a candidate for resolution.
    ///
    /// If a non-terminal job shares the candidate's fingerprint, its id is
    /// returned and nothing is inserted. If a terminal job shares the
    /// fingerprint, a new job is created only when `reprocess` is set;
    /// otherwise the prior terminal job is returned directly. Appends a
    /// `DISCOVER` event for every created job.
    async fn submit(&self, candidate: CandidateItem, reprocess: bool)
        -> GleanerResult<Submission>;

    /// Atomically selects one pending job (priority descending, then
    /// created_at ascending), transitions it to running, and returns it
    /// with a lease. Safe under concurrent callers.
    async fn lease_next(&self) -> GleanerResult<Option<LeasedJob>>;

    /// Extends a lease's expiry.
    ///
    /// A stale token is logged and returns false — the caller must abandon
    /// its work because another worker may now own the job. Never fatal.
    async fn heartbeat(&self, job_id: &JobId, token: &LeaseToken) -> bool;

    /// Records a resolver attempt on a leased job: bumps `attempt_count`
    /// and sets `last_resolver_tried`. Rejects a stale token with
    /// `LeaseConflict`.
    async fn record_attempt(
        &self,
        job_id: &JobId,
        token: &LeaseToken,
        resolver_name: &str,
    ) -> GleanerResult<()>;

    /// Atomic terminal transition to completed. Rejects a mismatched lease
    /// token with `LeaseConflict`, leaving the job untouched. Appends a
    /// `COMPLETE` event carrying the storage reference plus any
    /// caller-supplied details (e.g. confidence).
    async fn complete(
        &self,
        job_id: &JobId,
        token: &LeaseToken,
        result: StorageRef,
        details: EventPayload,
    ) -> GleanerResult<()>;

    /// Atomic terminal transition to failed. Same lease rules as
    /// [`Self::complete`]. Appends a terminal `FAIL` event.
    async fn fail(&self, job_id: &JobId, token: &LeaseToken, reason: &str) -> GleanerResult<()>;

    /// Returns any running job whose lease has expired to pending, without
    /// incrementing `attempt_count` — the work was never confirmed done,
    /// it did not fail. Appends a `RETRY` event per requeued job. Returns
    /// the number of jobs requeued.
    async fn requeue_expired_leases(&self) -> GleanerResult<usize>;

    /// Current snapshot of a job.
    async fn get(&self, job_id: &JobId) -> Option<Job>;

    /// All jobs currently in the given state.
    async fn jobs_in_state(&self, state: JobState) -> Vec<Job>;

    /// Number of pending jobs.
    async fn pending_count(&self) -> usize;
}
