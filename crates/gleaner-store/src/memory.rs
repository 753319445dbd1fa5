//! In-memory job store backend.

use crate::config::StoreConfig;
use crate::event::{event_payload, EventPayload, EventType};
use crate::event_log::EventLog;
use crate::job::{Job, JobState, Lease, LeasedJob, Submission};
use crate::store::JobStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gleaner_core::{
    fingerprint, secondary_key, CandidateItem, Fingerprint, GleanerError, GleanerResult, JobId,
    LeaseToken, SecondaryKey, StorageRef,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ordering key for the pending set: highest priority first, then oldest
/// submission, with the job id breaking exact ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PendingKey {
    neg_priority: i64,
    created_at: DateTime<Utc>,
    job_id: JobId,
}

impl PendingKey {
    fn for_job(job: &Job) -> Self {
        Self {
            neg_priority: -i64::from(job.priority),
            created_at: job.created_at,
            job_id: job.id.clone(),
        }
    }
}

struct StoreInner {
    jobs: HashMap<JobId, Job>,
    /// Fingerprint index over the NON-TERMINAL set only.
    active_fingerprints: HashMap<Fingerprint, JobId>,
    /// Last terminal job per fingerprint, for resubmission handling.
    terminal_fingerprints: HashMap<Fingerprint, JobId>,
    /// Advisory secondary-key index; first job seen per key.
    secondary_keys: HashMap<SecondaryKey, JobId>,
    pending: BTreeSet<PendingKey>,
    leases: HashMap<JobId, Lease>,
}

/// In-memory [`JobStore`] backend.
///
/// Every transition runs inside one critical section, so `lease_next` is a
/// single atomic operation and no two workers can hold the same lease.
/// The store holds the event log and appends the lifecycle events it owns
/// (DISCOVER, COMPLETE, terminal FAIL, lease-expiry RETRY).
pub struct InMemoryJobStore {
    inner: Mutex<StoreInner>,
    log: Arc<EventLog>,
    config: StoreConfig,
}

impl InMemoryJobStore {
    /// Creates a store writing to the given event log.
    pub fn new(config: StoreConfig, log: Arc<EventLog>) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                jobs: HashMap::new(),
                active_fingerprints: HashMap::new(),
                terminal_fingerprints: HashMap::new(),
                secondary_keys: HashMap::new(),
                pending: BTreeSet::new(),
                leases: HashMap::new(),
            }),
            log,
            config,
        }
    }

    /// The event log this store appends to.
    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.log
    }

    fn validate_lease(
        inner: &StoreInner,
        job_id: &JobId,
        token: &LeaseToken,
    ) -> GleanerResult<()> {
        match inner.leases.get(job_id) {
            Some(lease) if &lease.token == token => Ok(()),
            Some(_) => Err(GleanerError::lease_conflict(job_id, "token mismatch")),
            None => Err(GleanerError::lease_conflict(job_id, "no active lease")),
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn submit(
        &self,
        candidate: CandidateItem,
        reprocess: bool,
    ) -> GleanerResult<Submission> {
        let fp = fingerprint(&candidate);
        let secondary = secondary_key(&candidate);

        let mut inner = self.inner.lock();

        if let Some(existing) = inner.active_fingerprints.get(&fp) {
            debug!(job_id = %existing, fingerprint = %fp, "Duplicate submission collapsed");
            return Ok(Submission::Duplicate(existing.clone()));
        }

        if !reprocess {
            if let Some(prior_id) = inner.terminal_fingerprints.get(&fp) {
                if let Some(prior) = inner.jobs.get(prior_id) {
                    debug!(job_id = %prior_id, "Returning prior terminal result");
                    return Ok(Submission::AlreadyProcessed(prior.clone()));
                }
            }
        }

        let mut job = Job::new(candidate, fp.clone());

        // Secondary key collisions across differing fingerprints are
        // advisory: flag, never merge.
        if let Some(key) = secondary {
            match inner.secondary_keys.get(&key).cloned() {
                Some(other_id) => {
                    let other_fp = inner.jobs.get(&other_id).map(|j| j.fingerprint.clone());
                    if other_fp.as_ref() != Some(&fp) {
                        warn!(
                            job_id = %job.id,
                            possible_duplicate_of = %other_id,
                            "Secondary dedup key matched a different fingerprint"
                        );
                        job.possible_duplicate_of = Some(other_id);
                    }
                }
                None => {
                    inner.secondary_keys.insert(key, job.id.clone());
                }
            }
        }

        let mut payload = event_payload([
            ("source_kind", job.candidate.source_kind.to_string()),
            ("origin_url", job.candidate.origin_url.clone()),
            ("priority", job.priority.to_string()),
            ("submitted_by", job.candidate.submitted_by.clone()),
        ]);
        if let Some(dup) = &job.possible_duplicate_of {
            payload.insert("possible_duplicate_of".to_string(), dup.to_string());
        }
        self.log.append(EventType::Discover, &job.id, None, payload)?;

        let id = job.id.clone();
        inner.pending.insert(PendingKey::for_job(&job));
        inner.active_fingerprints.insert(fp, id.clone());
        inner.jobs.insert(id.clone(), job);

        info!(job_id = %id, "Job enqueued");
        Ok(Submission::Created(id))
    }

    async fn lease_next(&self) -> GleanerResult<Option<LeasedJob>> {
        let mut inner = self.inner.lock();

        let Some(key) = inner.pending.iter().next().cloned() else {
            return Ok(None);
        };
        inner.pending.remove(&key);

        let lease = Lease {
            token: LeaseToken::new(),
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.config.lease_ttl()).unwrap_or_default(),
        };

        let job = inner
            .jobs
            .get_mut(&key.job_id)
            .ok_or_else(|| GleanerError::storage("pending index referenced missing job"))?;
        job.state = JobState::Running;
        job.updated_at = Utc::now();
        let job = job.clone();

        inner.leases.insert(job.id.clone(), lease.clone());
        debug!(job_id = %job.id, expires_at = %lease.expires_at, "Lease acquired");

        Ok(Some(LeasedJob { job, lease }))
    }

    async fn heartbeat(&self, job_id: &JobId, token: &LeaseToken) -> bool {
        let mut inner = self.inner.lock();

        match inner.leases.get_mut(job_id) {
            Some(lease) if &lease.token == token => {
                lease.expires_at = Utc::now()
                    + chrono::Duration::from_std(self.config.lease_ttl()).unwrap_or_default();
                true
            }
            _ => {
                warn!(job_id = %job_id, "Heartbeat with stale lease token; caller should abandon");
                false
            }
        }
    }

    async fn record_attempt(
        &self,
        job_id: &JobId,
        token: &LeaseToken,
        resolver_name: &str,
    ) -> GleanerResult<()> {
        let mut inner = self.inner.lock();
        Self::validate_lease(&inner, job_id, token)?;

        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| GleanerError::not_found("Job", job_id))?;
        job.attempt_count += 1;
        job.last_resolver_tried = Some(resolver_name.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn complete(
        &self,
        job_id: &JobId,
        token: &LeaseToken,
        result: StorageRef,
        details: EventPayload,
    ) -> GleanerResult<()> {
        let mut inner = self.inner.lock();
        Self::validate_lease(&inner, job_id, token)?;

        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| GleanerError::not_found("Job", job_id))?;
        if job.state != JobState::Running {
            return Err(GleanerError::Conflict(format!(
                "cannot complete job in state {}",
                job.state
            )));
        }

        job.state = JobState::Completed;
        job.result = Some(result.clone());
        job.updated_at = Utc::now();
        let resolver = job.last_resolver_tried.clone();
        let fp = job.fingerprint.clone();

        let mut payload = details;
        payload.insert("storage_ref".to_string(), result.to_string());
        self.log.append(EventType::Complete, job_id, resolver.as_deref(), payload)?;

        inner.leases.remove(job_id);
        inner.active_fingerprints.remove(&fp);
        inner.terminal_fingerprints.insert(fp, job_id.clone());

        info!(job_id = %job_id, "Job completed");
        Ok(())
    }

    async fn fail(&self, job_id: &JobId, token: &LeaseToken, reason: &str) -> GleanerResult<()> {
        let mut inner = self.inner.lock();
        Self::validate_lease(&inner, job_id, token)?;

        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| GleanerError::not_found("Job", job_id))?;
        if job.state != JobState::Running {
            return Err(GleanerError::Conflict(format!(
                "cannot fail job in state {}",
                job.state
            )));
        }

        job.state = JobState::Failed;
        job.failure_reason = Some(reason.to_string());
        job.updated_at = Utc::now();
        let resolver = job.last_resolver_tried.clone();
        let fp = job.fingerprint.clone();

        self.log.append(
            EventType::Fail,
            job_id,
            resolver.as_deref(),
            event_payload([("reason", reason), ("terminal", "true")]),
        )?;

        inner.leases.remove(job_id);
        inner.active_fingerprints.remove(&fp);
        inner.terminal_fingerprints.insert(fp, job_id.clone());

        warn!(job_id = %job_id, reason = %reason, "Job failed");
        Ok(())
    }

    async fn requeue_expired_leases(&self) -> GleanerResult<usize> {
        let mut inner = self.inner.lock();
        let now = Utc::now();

        let expired: Vec<JobId> = inner
            .leases
            .iter()
            .filter(|(_, lease)| lease.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();

        for job_id in &expired {
            inner.leases.remove(job_id);
            if let Some(job) = inner.jobs.get_mut(job_id) {
                job.state = JobState::Pending;
                job.updated_at = now;
                let key = PendingKey::for_job(job);
                inner.pending.insert(key);
            }
            self.log.append(
                EventType::Retry,
                job_id,
                None,
                event_payload([("reason", "lease_expired")]),
            )?;
            warn!(job_id = %job_id, "Lease expired; job requeued");
        }

        Ok(expired.len())
    }

    async fn get(&self, job_id: &JobId) -> Option<Job> {
        self.inner.lock().jobs.get(job_id).cloned()
    }

    async fn jobs_in_state(&self, state: JobState) -> Vec<Job> {
        self.inner
            .lock()
            .jobs
            .values()
            .filter(|j| j.state == state)
            .cloned()
            .collect()
    }

    async fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }
}
