//! The resolver seam.
//!
//! A resolver is one pluggable discovery strategy: given a candidate, it
//! attempts to produce a usable artifact from one external source. Concrete
//! site/source adapters live outside the pipeline and implement
//! [`Resolver`]; the chain is agnostic to how a resolver works internally.

use async_trait::async_trait;
use gleaner_core::{Artifact, CandidateItem};
use gleaner_resilience::RetryPolicy;
use std::fmt;
use std::sync::Arc;

/// Outcome of a single resolver invocation.
///
/// This taxonomy never escapes the resolver chain as an error: each
/// variant drives a different chain decision.
#[derive(Debug, Clone)]
pub enum ResolutionResult {
    /// An artifact was produced. Stops the chain — first success wins.
    Success {
        /// The resolved artifact.
        artifact: Artifact,
        /// Resolver's own confidence in the artifact, 0.0 to 1.0.
        confidence: f32,
    },

    /// This source does not have the content. Benign: the chain advances
    /// with no circuit breaker penalty.
    NotFound,

    /// A failure that may succeed on retry (timeout, rate limit, 5xx).
    /// Retried against the same resolver up to its attempt budget.
    Transient(String),

    /// A failure that will not succeed on retry for this candidate.
    /// Penalizes the breaker and advances the chain immediately.
    Permanent(String),
}

impl fmt::Display for ResolutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionResult::Success { confidence, .. } => {
                write!(f, "success (confidence {:.2})", confidence)
            }
            ResolutionResult::NotFound => write!(f, "not_found"),
            ResolutionResult::Transient(reason) => write!(f, "transient_error: {}", reason),
            ResolutionResult::Permanent(reason) => write!(f, "permanent_error: {}", reason),
        }
    }
}

/// A pluggable discovery strategy.
///
/// Implementations must bound their own I/O (see
/// [`gleaner_resilience::with_timeout`]) and report a timeout as
/// [`ResolutionResult::Transient`] rather than hanging: the pipeline never
/// forcibly kills worker tasks.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Stable name, used for circuit breaker keying and event attribution.
    fn name(&self) -> &str;

    /// Attempts to produce an artifact for the candidate.
    async fn try_resolve(&self, candidate: &CandidateItem) -> ResolutionResult;
}

/// One slot in a resolver chain: the resolver plus its retry policy.
#[derive(Clone)]
pub struct ChainEntry {
    /// The resolver.
    pub resolver: Arc<dyn Resolver>,

    /// Retry policy applied to transient failures of this resolver.
    pub retry: RetryPolicy,
}

impl ChainEntry {
    /// Creates an entry with the given retry policy.
    pub fn new(resolver: Arc<dyn Resolver>, retry: RetryPolicy) -> Self {
        Self { resolver, retry }
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEntry")
            .field("resolver", &self.resolver.name())
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver;

    #[async_trait]
    impl Resolver for FixedResolver {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn try_resolve(&self, _candidate: &CandidateItem) -> ResolutionResult {
            ResolutionResult::NotFound
        }
    }

    #[tokio::test]
    async fn test_resolver_object_safety() {
        let resolver: Arc<dyn Resolver> = Arc::new(FixedResolver);
        let candidate = CandidateItem::new(
            gleaner_core::SourceKind::Article,
            "https://example.com",
            "test",
        );
        assert!(matches!(
            resolver.try_resolve(&candidate).await,
            ResolutionResult::NotFound
        ));
    }

    #[test]
    fn test_result_display() {
        assert_eq!(ResolutionResult::NotFound.to_string(), "not_found");
        assert!(ResolutionResult::Transient("503".into())
            .to_string()
            .contains("transient_error"));
    }
}
