//! # Gleaner Pipeline
//!
//! The resilient discovery-and-ingestion pipeline: candidates submitted
//! through the [`IngestService`] are deduplicated, queued, and leased to a
//! [`WorkerPool`] that runs the [`ResolverChain`] — an ordered list of
//! pluggable discovery strategies, each gated by a per-resolver circuit
//! breaker and governed by a retry policy. First success wins; artifacts
//! go to the blob store collaborator and every transition lands in the
//! event log.

pub mod blob;
pub mod chain;
pub mod config;
pub mod metrics;
pub mod resolver;
pub mod service;
pub mod worker;

pub use blob::{BlobStore, InMemoryBlobStore};
pub use chain::{ChainOutcome, ResolverChain};
pub use config::{GleanerConfig, PipelineConfig, WorkerPoolConfig};
pub use resolver::{ChainEntry, ResolutionResult, Resolver};
pub use service::{AnalyticsReport, AnalyticsView, IngestService};
pub use worker::{WorkerPool, WorkerPoolStats};

/// Re-export of commonly used types.
pub mod prelude {
    pub use crate::blob::BlobStore;
    pub use crate::resolver::{ResolutionResult, Resolver};
    pub use crate::service::IngestService;
    pub use crate::worker::WorkerPool;
    pub use gleaner_core::{Artifact, CandidateItem, JobId, SourceKind};
    pub use gleaner_store::{JobState, JobStore};
}
