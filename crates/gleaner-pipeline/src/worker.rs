//! Worker pool for processing jobs.
//!
//! A fixed-size pool runs independent lease→process→complete/fail loops.
//! Workers suspend only on resolver I/O and retry delays; each wait is
//! local to its own task. A background sweeper returns expired leases to
//! pending — the sole cancellation mechanism.

use crate::blob::BlobStore;
use crate::chain::{ChainOutcome, ResolverChain};
use crate::config::WorkerPoolConfig;
use crate::metrics as pipeline_metrics;
use gleaner_core::{GleanerError, GleanerResult, JobId, LeaseToken};
use gleaner_store::{event_payload, EventLog, JobStore, LeasedJob};
use ::metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Worker pool for concurrent job processing.
pub struct WorkerPool {
    /// Unique pool ID.
    id: String,

    /// Job store.
    store: Arc<dyn JobStore>,

    /// Event log handle, shared with the resolver chain.
    log: Arc<EventLog>,

    /// Resolver chains.
    chain: Arc<ResolverChain>,

    /// Blob store collaborator.
    blobs: Arc<dyn BlobStore>,

    /// Pool configuration.
    config: WorkerPoolConfig,

    /// Interval between expired-lease sweeps.
    sweep_interval: Duration,

    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,

    /// Running flag.
    running: Arc<AtomicBool>,

    /// Jobs completed counter.
    jobs_processed: Arc<AtomicU64>,

    /// Jobs failed counter.
    jobs_failed: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(
        store: Arc<dyn JobStore>,
        log: Arc<EventLog>,
        chain: Arc<ResolverChain>,
        blobs: Arc<dyn BlobStore>,
        config: WorkerPoolConfig,
        sweep_interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            id: format!("worker-pool-{}", Uuid::new_v4()),
            store,
            log,
            chain,
            blobs,
            config,
            sweep_interval,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
            jobs_processed: Arc::new(AtomicU64::new(0)),
            jobs_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run the pool until [`Self::stop`] is called.
    pub async fn start(&self) -> GleanerResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GleanerError::internal("worker pool already running"));
        }

        info!(
            pool_id = %self.id,
            concurrency = self.config.concurrency,
            "Starting worker pool"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let sweeper = self.spawn_sweeper();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(pool_id = %self.id, "Received shutdown signal");
                    break;
                }

                permit = semaphore.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };

                    match self.store.lease_next().await {
                        Ok(Some(leased)) => {
                            counter!(pipeline_metrics::names::JOBS_LEASED_TOTAL).increment(1);
                            let worker = JobWorker {
                                store: self.store.clone(),
                                log: self.log.clone(),
                                chain: self.chain.clone(),
                                blobs: self.blobs.clone(),
                                heartbeat_interval: self.config.heartbeat_interval(),
                                jobs_processed: self.jobs_processed.clone(),
                                jobs_failed: self.jobs_failed.clone(),
                            };
                            tokio::spawn(
                                async move {
                                    worker.process(leased).await;
                                    drop(permit);
                                }
                                .instrument(tracing::info_span!("worker")),
                            );
                            // More work may be waiting; lease again at once.
                            continue;
                        }
                        Ok(None) => {
                            drop(permit);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to lease next job");
                            drop(permit);
                        }
                    }

                    gauge!(pipeline_metrics::names::JOBS_PENDING)
                        .set(self.store.pending_count().await as f64);
                }
            }

            // Small delay to prevent busy-waiting.
            tokio::time::sleep(self.config.poll_interval()).await;
        }

        // Wait for in-flight workers to finish.
        info!(pool_id = %self.id, "Waiting for workers to finish...");
        let _ = timeout(self.config.shutdown_timeout(), async {
            while semaphore.available_permits() < self.config.concurrency {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        sweeper.abort();
        self.running.store(false, Ordering::SeqCst);

        info!(
            pool_id = %self.id,
            processed = self.jobs_processed.load(Ordering::Relaxed),
            failed = self.jobs_failed.load(Ordering::Relaxed),
            "Worker pool stopped"
        );

        Ok(())
    }

    /// Stop the worker pool.
    pub fn stop(&self) {
        info!(pool_id = %self.id, "Stopping worker pool...");
        let _ = self.shutdown_tx.send(());
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the number of jobs completed.
    pub fn jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    /// Get the number of jobs failed.
    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Get the pool ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            id: self.id.clone(),
            running: self.is_running(),
            concurrency: self.config.concurrency,
            jobs_processed: self.jobs_processed(),
            jobs_failed: self.jobs_failed(),
        }
    }

    /// Spawns the expired-lease sweeper.
    fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let interval = self.sweep_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        match store.requeue_expired_leases().await {
                            Ok(0) => {}
                            Ok(n) => {
                                counter!(pipeline_metrics::names::JOBS_REQUEUED_TOTAL)
                                    .increment(n as u64);
                            }
                            Err(e) => {
                                error!(error = %e, "Expired-lease sweep failed");
                            }
                        }
                    }
                }
            }
        })
    }
}

/// Worker pool statistics.
#[derive(Debug, Clone)]
pub struct WorkerPoolStats {
    /// Pool ID.
    pub id: String,

    /// Is running.
    pub running: bool,

    /// Configured concurrency.
    pub concurrency: usize,

    /// Jobs completed.
    pub jobs_processed: u64,

    /// Jobs failed.
    pub jobs_failed: u64,
}

/// Everything one worker task needs to process one leased job.
struct JobWorker {
    store: Arc<dyn JobStore>,
    log: Arc<EventLog>,
    chain: Arc<ResolverChain>,
    blobs: Arc<dyn BlobStore>,
    heartbeat_interval: Duration,
    jobs_processed: Arc<AtomicU64>,
    jobs_failed: Arc<AtomicU64>,
}

impl JobWorker {
    async fn process(&self, leased: LeasedJob) {
        let job = leased.job;
        let token = leased.lease.token;
        let started = Instant::now();

        debug!(job_id = %job.id, "Processing job");

        let heartbeat = self.spawn_heartbeat(job.id.clone(), token.clone());
        let outcome = self.chain.resolve(&job, &token, self.store.as_ref(), &self.log).await;
        heartbeat.abort();

        match outcome {
            Ok(ChainOutcome::Resolved {
                resolver,
                artifact,
                confidence,
                low_confidence,
            }) => match self.blobs.store(&job.id, &artifact).await {
                Ok(storage_ref) => {
                    let mut details =
                        event_payload([("confidence", format!("{:.2}", confidence))]);
                    if low_confidence {
                        details.insert("low_confidence".to_string(), "true".to_string());
                    }
                    match self.store.complete(&job.id, &token, storage_ref, details).await {
                        Ok(()) => {
                            self.jobs_processed.fetch_add(1, Ordering::Relaxed);
                            counter!(pipeline_metrics::names::JOBS_COMPLETED_TOTAL).increment(1);
                            histogram!(pipeline_metrics::names::JOB_DURATION_SECONDS)
                                .record(started.elapsed().as_secs_f64());
                            debug!(job_id = %job.id, resolver = %resolver, "Job completed");
                        }
                        Err(GleanerError::LeaseConflict { .. }) => {
                            warn!(job_id = %job.id, "Lease lost before completion; abandoning work");
                        }
                        Err(e) => {
                            error!(job_id = %job.id, error = %e, "Failed to mark job complete");
                        }
                    }
                }
                Err(e) => {
                    let reason = format!("blob_store: {}", e);
                    self.fail_job(&job.id, &token, &reason).await;
                }
            },
            Ok(ChainOutcome::Exhausted { failure_reason }) => {
                self.fail_job(&job.id, &token, &failure_reason).await;
            }
            Err(e) => {
                // Infrastructure failure — most likely the event log. A
                // worker that cannot log must not proceed; the lease will
                // expire and the sweeper requeues the job.
                error!(job_id = %job.id, error = %e, "Worker aborting job");
            }
        }
    }

    async fn fail_job(&self, job_id: &JobId, token: &LeaseToken, reason: &str) {
        match self.store.fail(job_id, token, reason).await {
            Ok(()) => {
                self.jobs_failed.fetch_add(1, Ordering::Relaxed);
                counter!(pipeline_metrics::names::JOBS_FAILED_TOTAL).increment(1);
                warn!(job_id = %job_id, reason = %reason, "Job failed");
            }
            Err(GleanerError::LeaseConflict { .. }) => {
                warn!(job_id = %job_id, "Lease lost before failure could be recorded");
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to mark job failed");
            }
        }
    }

    /// Spawns a ticker extending the lease until aborted or the lease is
    /// lost.
    fn spawn_heartbeat(&self, job_id: JobId, token: LeaseToken) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let interval = self.heartbeat_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                if !store.heartbeat(&job_id, &token).await {
                    // Lease is gone; stop heartbeating and let the owning
                    // task discover the conflict on its terminal call.
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;
    use gleaner_resilience::CircuitBreakerRegistry;
    use gleaner_store::{InMemoryJobStore, StoreConfig};

    fn pool() -> WorkerPool {
        let log = Arc::new(EventLog::in_memory());
        let store = Arc::new(InMemoryJobStore::new(StoreConfig::default(), log.clone()));
        let chain = Arc::new(ResolverChain::new(
            Arc::new(CircuitBreakerRegistry::with_defaults()),
            0.5,
        ));
        WorkerPool::new(
            store,
            log,
            chain,
            Arc::new(InMemoryBlobStore::new()),
            WorkerPoolConfig::default(),
            Duration::from_secs(15),
        )
    }

    #[test]
    fn test_pool_starts_stopped() {
        let pool = pool();
        assert!(!pool.is_running());
        assert_eq!(pool.jobs_processed(), 0);
        assert_eq!(pool.jobs_failed(), 0);
    }

    #[test]
    fn test_stats_shape() {
        let pool = pool();
        let stats = pool.stats();
        assert_eq!(stats.concurrency, 4);
        assert!(!stats.running);
        assert_eq!(stats.id, pool.id());
    }
}
