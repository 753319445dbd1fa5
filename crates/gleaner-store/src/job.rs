//! Job records and the job state machine.

use chrono::{DateTime, Utc};
use gleaner_core::{CandidateItem, Fingerprint, JobId, LeaseToken, StorageRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job state enumeration.
///
/// Transitions: `Pending → Running` on lease acquisition; `Running →
/// Completed | Failed` on terminal outcome; `Running → Pending` when a
/// lease expires without a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be leased by a worker.
    Pending,
    /// Leased and being processed.
    Running,
    /// Resolved successfully. Terminal.
    Completed,
    /// All resolvers exhausted. Terminal.
    Failed,
}

impl JobState {
    /// Returns true for terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// The unit of work: one candidate item being resolved.
///
/// Owned exclusively by the job store; workers hold a checked-out lease
/// and a copy while processing. Terminal jobs are retained for audit,
/// never deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,

    /// Primary dedup fingerprint of the candidate.
    pub fingerprint: Fingerprint,

    /// Owned copy of the submitted candidate.
    pub candidate: CandidateItem,

    /// Current state.
    pub state: JobState,

    /// Lease-ordering priority (higher leases sooner).
    pub priority: i32,

    /// Resolver attempts made so far, across all resolvers.
    pub attempt_count: u32,

    /// Name of the resolver most recently attempted.
    pub last_resolver_tried: Option<String>,

    /// Blob store reference for the resolved artifact.
    pub result: Option<StorageRef>,

    /// Terminal failure reason, when failed.
    pub failure_reason: Option<String>,

    /// Advisory flag: an earlier job shares this candidate's secondary
    /// (title + source) key under a different fingerprint. Never merged
    /// automatically.
    pub possible_duplicate_of: Option<JobId>,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// When the job was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a pending job for a candidate.
    pub fn new(candidate: CandidateItem, fingerprint: Fingerprint) -> Self {
        let now = Utc::now();
        let priority = candidate.submission_priority;
        Self {
            id: JobId::new(),
            fingerprint,
            candidate,
            state: JobState::Pending,
            priority,
            attempt_count: 0,
            last_resolver_tried: None,
            result: None,
            failure_reason: None,
            possible_duplicate_of: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Time-bounded, tokenized ownership of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    /// Token the worker must present on every mutation.
    pub token: LeaseToken,

    /// When the lease expires without a heartbeat.
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Returns true if the lease has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A job checked out by a worker, with its lease.
#[derive(Debug, Clone)]
pub struct LeasedJob {
    /// Copy of the job at lease time.
    pub job: Job,

    /// The worker's lease.
    pub lease: Lease,
}

/// Outcome of a submission.
#[derive(Debug, Clone)]
pub enum Submission {
    /// A new job was created.
    Created(JobId),

    /// A non-terminal job with the same fingerprint already exists;
    /// its id is returned and nothing was inserted.
    Duplicate(JobId),

    /// A terminal job with the same fingerprint exists and reprocessing
    /// was not requested; the prior result is returned directly.
    AlreadyProcessed(Job),
}

impl Submission {
    /// The id of the job this submission resolved to.
    pub fn job_id(&self) -> &JobId {
        match self {
            Submission::Created(id) | Submission::Duplicate(id) => id,
            Submission::AlreadyProcessed(job) => &job.id,
        }
    }

    /// Returns true if a new job was created.
    pub fn is_created(&self) -> bool {
        matches!(self, Submission::Created(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_core::{fingerprint, SourceKind};

    fn sample_job() -> Job {
        let candidate =
            CandidateItem::new(SourceKind::Article, "https://example.com/a", "test").with_priority(5);
        let fp = fingerprint(&candidate);
        Job::new(candidate, fp)
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = sample_job();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.priority, 5);
        assert_eq!(job.attempt_count, 0);
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn test_job_serde_roundtrip() {
        let job = sample_job();
        let json = serde_json::to_string(&job).unwrap();
        let restored: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id, job.id);
        assert_eq!(restored.state, JobState::Pending);
    }

    #[test]
    fn test_lease_expiry() {
        let lease = Lease {
            token: gleaner_core::LeaseToken::new(),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
        };
        assert!(lease.is_expired(Utc::now()));
    }

    #[test]
    fn test_submission_job_id() {
        let job = sample_job();
        let id = job.id.clone();
        assert_eq!(Submission::Created(id.clone()).job_id(), &id);
        assert_eq!(Submission::Duplicate(id.clone()).job_id(), &id);
        assert_eq!(Submission::AlreadyProcessed(job).job_id(), &id);
    }
}
