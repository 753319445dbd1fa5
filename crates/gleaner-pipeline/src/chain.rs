//! The ordered resolver chain.
//!
//! Resolvers are tried in a fixed priority order configured per source
//! kind. Each is gated by its circuit breaker and governed by its retry
//! policy; the first success stops the chain, even if a later resolver
//! might yield higher confidence.

use crate::metrics as pipeline_metrics;
use crate::resolver::{ChainEntry, ResolutionResult, Resolver};
use gleaner_core::{Artifact, GleanerResult, LeaseToken, SourceKind};
use gleaner_resilience::{CircuitBreakerRegistry, RetryPolicy};
use gleaner_store::{event_payload, EventLog, EventType, Job, JobStore};
use ::metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of running the chain for one job.
#[derive(Debug)]
pub enum ChainOutcome {
    /// A resolver produced an artifact.
    Resolved {
        /// Name of the winning resolver.
        resolver: String,
        /// The artifact, not yet persisted.
        artifact: Artifact,
        /// The resolver's confidence.
        confidence: f32,
        /// True when confidence fell below the acceptance threshold. The
        /// result is still accepted, just flagged.
        low_confidence: bool,
    },

    /// Every resolver was exhausted without success.
    Exhausted {
        /// Terminal outcome of the last resolver attempted.
        failure_reason: String,
    },
}

/// Ordered, breaker-gated resolver chains keyed by source kind.
pub struct ResolverChain {
    chains: HashMap<SourceKind, Vec<ChainEntry>>,
    breakers: Arc<CircuitBreakerRegistry>,
    acceptance_threshold: f32,
}

impl ResolverChain {
    /// Creates an empty chain set.
    pub fn new(breakers: Arc<CircuitBreakerRegistry>, acceptance_threshold: f32) -> Self {
        Self {
            chains: HashMap::new(),
            breakers,
            acceptance_threshold,
        }
    }

    /// Registers a resolver at the end of the chain for a source kind.
    ///
    /// Registration order is invocation order.
    pub fn register(
        &mut self,
        kind: SourceKind,
        resolver: Arc<dyn Resolver>,
        retry: RetryPolicy,
    ) -> &mut Self {
        self.chains
            .entry(kind)
            .or_default()
            .push(ChainEntry::new(resolver, retry));
        self
    }

    /// The breaker registry gating this chain.
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Names of resolvers configured for a source kind, in order.
    pub fn resolver_names(&self, kind: SourceKind) -> Vec<String> {
        self.chains
            .get(&kind)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| e.resolver.name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Runs the chain for a leased job.
    ///
    /// Emits PROCESS/RETRY/SKIP and resolver-level FAIL events, and records
    /// each invocation on the job via [`JobStore::record_attempt`]. Errors
    /// are infrastructure failures (event log, lease conflict) only —
    /// resolver outcomes never escape as errors.
    pub async fn resolve(
        &self,
        job: &Job,
        token: &LeaseToken,
        store: &dyn JobStore,
        log: &EventLog,
    ) -> GleanerResult<ChainOutcome> {
        let kind = job.candidate.source_kind;
        let Some(entries) = self.chains.get(&kind) else {
            warn!(job_id = %job.id, source_kind = %kind, "No resolvers configured");
            return Ok(ChainOutcome::Exhausted {
                failure_reason: format!("no resolvers configured for {}", kind),
            });
        };

        let mut last_failure = format!("no resolvers configured for {}", kind);

        for entry in entries {
            let name = entry.resolver.name().to_string();

            if !self.breakers.allow(&name) {
                debug!(job_id = %job.id, resolver = %name, "Skipping resolver: circuit open");
                log.append(
                    EventType::Skip,
                    &job.id,
                    Some(&name),
                    event_payload([("reason", "circuit_open")]),
                )?;
                counter!(pipeline_metrics::names::RESOLVER_SKIPS_TOTAL).increment(1);
                last_failure = format!("{}: circuit_open", name);
                continue;
            }

            match self
                .run_resolver(entry, &name, job, token, store, log)
                .await?
            {
                ResolverVerdict::Won {
                    artifact,
                    confidence,
                } => {
                    let low_confidence = confidence < self.acceptance_threshold;
                    if low_confidence {
                        warn!(
                            job_id = %job.id,
                            resolver = %name,
                            confidence,
                            threshold = self.acceptance_threshold,
                            "Accepting low-confidence result"
                        );
                    }
                    return Ok(ChainOutcome::Resolved {
                        resolver: name,
                        artifact,
                        confidence,
                        low_confidence,
                    });
                }
                ResolverVerdict::Advance { reason } => {
                    last_failure = format!("{}: {}", name, reason);
                }
            }
        }

        Ok(ChainOutcome::Exhausted {
            failure_reason: last_failure,
        })
    }

    /// Runs one resolver with its retry budget against a job.
    async fn run_resolver(
        &self,
        entry: &ChainEntry,
        name: &str,
        job: &Job,
        token: &LeaseToken,
        store: &dyn JobStore,
        log: &EventLog,
    ) -> GleanerResult<ResolverVerdict> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            store.record_attempt(&job.id, token, name).await?;
            log.append(
                EventType::Process,
                &job.id,
                Some(name),
                event_payload([("attempt", attempt.to_string())]),
            )?;

            let result = entry.resolver.try_resolve(&job.candidate).await;
            debug!(job_id = %job.id, resolver = %name, attempt, outcome = %result, "Resolver attempt finished");

            match result {
                ResolutionResult::Success {
                    artifact,
                    confidence,
                } => {
                    self.breakers.record_outcome(name, true);
                    return Ok(ResolverVerdict::Won {
                        artifact,
                        confidence,
                    });
                }
                ResolutionResult::NotFound => {
                    // Benign miss: no breaker penalty.
                    log.append(
                        EventType::Fail,
                        &job.id,
                        Some(name),
                        event_payload([("reason", "not_found")]),
                    )?;
                    return Ok(ResolverVerdict::Advance {
                        reason: "not_found".to_string(),
                    });
                }
                ResolutionResult::Permanent(detail) => {
                    self.breakers.record_outcome(name, false);
                    log.append(
                        EventType::Fail,
                        &job.id,
                        Some(name),
                        event_payload([("reason", "permanent_error"), ("detail", detail.as_str())]),
                    )?;
                    return Ok(ResolverVerdict::Advance {
                        reason: "permanent_error".to_string(),
                    });
                }
                ResolutionResult::Transient(detail) => {
                    if entry.retry.should_retry(attempt) {
                        let delay = entry.retry.next_delay(attempt);
                        log.append(
                            EventType::Retry,
                            &job.id,
                            Some(name),
                            event_payload([
                                ("reason", "transient_error".to_string()),
                                ("detail", detail.clone()),
                                ("attempt", attempt.to_string()),
                                ("delay_ms", delay.as_millis().to_string()),
                            ]),
                        )?;
                        counter!(pipeline_metrics::names::RESOLVER_RETRIES_TOTAL).increment(1);
                        // Local to this worker; other workers keep running.
                        tokio::time::sleep(delay).await;
                    } else {
                        self.breakers.record_outcome(name, false);
                        log.append(
                            EventType::Fail,
                            &job.id,
                            Some(name),
                            event_payload([
                                ("reason", "retries_exhausted"),
                                ("detail", detail.as_str()),
                            ]),
                        )?;
                        return Ok(ResolverVerdict::Advance {
                            reason: "retries_exhausted".to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Per-resolver decision inside the chain loop.
enum ResolverVerdict {
    Won { artifact: Artifact, confidence: f32 },
    Advance { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gleaner_core::{CandidateItem, SourceKind};
    use gleaner_store::{EventRecord, InMemoryJobStore, StoreConfig, Submission};
    use parking_lot::Mutex;

    /// Scripted resolver returning canned results in order.
    struct ScriptedResolver {
        name: String,
        script: Mutex<Vec<ResolutionResult>>,
        calls: Mutex<u32>,
    }

    impl ScriptedResolver {
        fn new(name: &str, script: Vec<ResolutionResult>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                script: Mutex::new(script),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl Resolver for ScriptedResolver {
        fn name(&self) -> &str {
            &self.name
        }

        async fn try_resolve(&self, _candidate: &CandidateItem) -> ResolutionResult {
            *self.calls.lock() += 1;
            let mut script = self.script.lock();
            if script.is_empty() {
                ResolutionResult::NotFound
            } else {
                script.remove(0)
            }
        }
    }

    fn success(confidence: f32) -> ResolutionResult {
        ResolutionResult::Success {
            artifact: Artifact::text("resolved text"),
            confidence,
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::exponential(max_attempts)
            .with_base_delay(std::time::Duration::from_millis(1))
            .without_jitter()
    }

    async fn leased_job(
        store: &InMemoryJobStore,
        candidate: CandidateItem,
    ) -> (Job, LeaseToken) {
        let submission = store.submit(candidate, false).await.unwrap();
        assert!(matches!(submission, Submission::Created(_)));
        let leased = store.lease_next().await.unwrap().unwrap();
        (leased.job, leased.lease.token)
    }

    fn event_kinds(events: &[EventRecord]) -> Vec<(EventType, Option<String>)> {
        events
            .iter()
            .map(|e| (e.event_type, e.resolver_name.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_first_success_wins_and_order_is_deterministic() {
        let log = Arc::new(EventLog::in_memory());
        let store = InMemoryJobStore::new(StoreConfig::default(), log.clone());

        let a = ScriptedResolver::new("a", vec![ResolutionResult::NotFound]);
        let b = ScriptedResolver::new("b", vec![success(0.9)]);
        let c = ScriptedResolver::new("c", vec![success(1.0)]);

        let mut chain = ResolverChain::new(Arc::new(CircuitBreakerRegistry::with_defaults()), 0.5);
        chain
            .register(SourceKind::Article, a.clone(), fast_retry(2))
            .register(SourceKind::Article, b.clone(), fast_retry(2))
            .register(SourceKind::Article, c.clone(), fast_retry(2));

        assert_eq!(chain.resolver_names(SourceKind::Article), vec!["a", "b", "c"]);
        assert!(chain.resolver_names(SourceKind::Media).is_empty());

        let candidate = CandidateItem::new(SourceKind::Article, "https://example.com/x", "test");
        let (job, token) = leased_job(&store, candidate).await;

        let outcome = chain.resolve(&job, &token, &store, &log).await.unwrap();
        match outcome {
            ChainOutcome::Resolved {
                resolver,
                confidence,
                low_confidence,
                ..
            } => {
                assert_eq!(resolver, "b");
                assert!((confidence - 0.9).abs() < f32::EPSILON);
                assert!(!low_confidence);
            }
            other => panic!("expected Resolved, got {:?}", other),
        }

        // Resolver 3 was never invoked.
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(c.calls(), 0);

        // DISCOVER, PROCESS(a), FAIL(a, not_found), PROCESS(b).
        let kinds = event_kinds(&log.snapshot());
        assert_eq!(
            kinds,
            vec![
                (EventType::Discover, None),
                (EventType::Process, Some("a".to_string())),
                (EventType::Fail, Some("a".to_string())),
                (EventType::Process, Some("b".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_transient_retries_then_advances() {
        let log = Arc::new(EventLog::in_memory());
        let store = InMemoryJobStore::new(StoreConfig::default(), log.clone());

        let flaky = ScriptedResolver::new(
            "flaky",
            vec![
                ResolutionResult::Transient("503".into()),
                ResolutionResult::Transient("503".into()),
                ResolutionResult::Transient("503".into()),
            ],
        );
        let backup = ScriptedResolver::new("backup", vec![success(0.8)]);

        let breakers = Arc::new(CircuitBreakerRegistry::with_defaults());
        let mut chain = ResolverChain::new(breakers.clone(), 0.5);
        chain
            .register(SourceKind::Article, flaky.clone(), fast_retry(3))
            .register(SourceKind::Article, backup.clone(), fast_retry(3));

        let candidate = CandidateItem::new(SourceKind::Article, "https://example.com/y", "test");
        let (job, token) = leased_job(&store, candidate).await;

        let outcome = chain.resolve(&job, &token, &store, &log).await.unwrap();
        assert!(matches!(outcome, ChainOutcome::Resolved { ref resolver, .. } if resolver == "backup"));

        // Full budget used on the flaky resolver.
        assert_eq!(flaky.calls(), 3);

        let events = log.snapshot();
        let retries = events
            .iter()
            .filter(|e| e.event_type == EventType::Retry)
            .count();
        assert_eq!(retries, 2);

        // Exhaustion recorded one breaker failure for the flaky resolver.
        let fail = events
            .iter()
            .find(|e| {
                e.event_type == EventType::Fail && e.resolver_name.as_deref() == Some("flaky")
            })
            .unwrap();
        assert_eq!(fail.payload_get("reason"), Some("retries_exhausted"));

        // The job's attempt count covers all invocations.
        let job = store.get(&job.id).await.unwrap();
        assert_eq!(job.attempt_count, 4);
    }

    #[tokio::test]
    async fn test_permanent_error_advances_without_retry() {
        let log = Arc::new(EventLog::in_memory());
        let store = InMemoryJobStore::new(StoreConfig::default(), log.clone());

        let broken = ScriptedResolver::new(
            "broken",
            vec![ResolutionResult::Permanent("unsupported layout".into())],
        );
        let backup = ScriptedResolver::new("backup", vec![success(0.8)]);

        let mut chain = ResolverChain::new(Arc::new(CircuitBreakerRegistry::with_defaults()), 0.5);
        chain
            .register(SourceKind::Article, broken.clone(), fast_retry(5))
            .register(SourceKind::Article, backup, fast_retry(5));

        let candidate = CandidateItem::new(SourceKind::Article, "https://example.com/z", "test");
        let (job, token) = leased_job(&store, candidate).await;

        let outcome = chain.resolve(&job, &token, &store, &log).await.unwrap();
        assert!(matches!(outcome, ChainOutcome::Resolved { .. }));
        assert_eq!(broken.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_resolver_outcome() {
        let log = Arc::new(EventLog::in_memory());
        let store = InMemoryJobStore::new(StoreConfig::default(), log.clone());

        let a = ScriptedResolver::new("a", vec![ResolutionResult::NotFound]);
        let b = ScriptedResolver::new("b", vec![ResolutionResult::Permanent("bad".into())]);

        let mut chain = ResolverChain::new(Arc::new(CircuitBreakerRegistry::with_defaults()), 0.5);
        chain
            .register(SourceKind::Article, a, fast_retry(1))
            .register(SourceKind::Article, b, fast_retry(1));

        let candidate = CandidateItem::new(SourceKind::Article, "https://example.com/w", "test");
        let (job, token) = leased_job(&store, candidate).await;

        let outcome = chain.resolve(&job, &token, &store, &log).await.unwrap();
        match outcome {
            ChainOutcome::Exhausted { failure_reason } => {
                assert_eq!(failure_reason, "b: permanent_error");
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_breaker_skips_resolver() {
        let log = Arc::new(EventLog::in_memory());
        let store = InMemoryJobStore::new(StoreConfig::default(), log.clone());

        let guarded = ScriptedResolver::new("guarded", vec![success(0.9)]);
        let backup = ScriptedResolver::new("backup", vec![success(0.7)]);

        let breakers = Arc::new(CircuitBreakerRegistry::with_defaults());
        // Trip the breaker for "guarded" ahead of time.
        for _ in 0..5 {
            breakers.record_outcome("guarded", false);
        }

        let mut chain = ResolverChain::new(breakers, 0.5);
        chain
            .register(SourceKind::Article, guarded.clone(), fast_retry(1))
            .register(SourceKind::Article, backup, fast_retry(1));

        let candidate = CandidateItem::new(SourceKind::Article, "https://example.com/s", "test");
        let (job, token) = leased_job(&store, candidate).await;

        let outcome = chain.resolve(&job, &token, &store, &log).await.unwrap();
        assert!(matches!(outcome, ChainOutcome::Resolved { ref resolver, .. } if resolver == "backup"));

        // Never invoked; skipped with an event.
        assert_eq!(guarded.calls(), 0);
        let events = log.snapshot();
        let skip = events
            .iter()
            .find(|e| e.event_type == EventType::Skip)
            .unwrap();
        assert_eq!(skip.resolver_name.as_deref(), Some("guarded"));
        assert_eq!(skip.payload_get("reason"), Some("circuit_open"));
    }

    #[tokio::test]
    async fn test_low_confidence_accepted_and_flagged() {
        let log = Arc::new(EventLog::in_memory());
        let store = InMemoryJobStore::new(StoreConfig::default(), log.clone());

        let weak = ScriptedResolver::new("weak", vec![success(0.2)]);
        let strong = ScriptedResolver::new("strong", vec![success(1.0)]);

        let mut chain = ResolverChain::new(Arc::new(CircuitBreakerRegistry::with_defaults()), 0.5);
        chain
            .register(SourceKind::Article, weak, fast_retry(1))
            .register(SourceKind::Article, strong.clone(), fast_retry(1));

        let candidate = CandidateItem::new(SourceKind::Article, "https://example.com/l", "test");
        let (job, token) = leased_job(&store, candidate).await;

        let outcome = chain.resolve(&job, &token, &store, &log).await.unwrap();
        match outcome {
            ChainOutcome::Resolved {
                resolver,
                low_confidence,
                ..
            } => {
                // First success wins even though a stronger resolver follows.
                assert_eq!(resolver, "weak");
                assert!(low_confidence);
            }
            other => panic!("expected Resolved, got {:?}", other),
        }
        assert_eq!(strong.calls(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_kind_exhausts() {
        let log = Arc::new(EventLog::in_memory());
        let store = InMemoryJobStore::new(StoreConfig::default(), log.clone());

        let chain = ResolverChain::new(Arc::new(CircuitBreakerRegistry::with_defaults()), 0.5);

        let candidate = CandidateItem::new(SourceKind::Media, "https://example.com/m", "test");
        let (job, token) = leased_job(&store, candidate).await;

        let outcome = chain.resolve(&job, &token, &store, &log).await.unwrap();
        assert!(matches!(outcome, ChainOutcome::Exhausted { .. }));
    }
}
