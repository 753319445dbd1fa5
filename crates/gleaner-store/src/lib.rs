//! # Gleaner Store
//!
//! Durable persistence for the ingestion pipeline:
//!
//! - Job records and their state machine (`PENDING → RUNNING → COMPLETED |
//!   FAILED`), with tokenized leases and expiry-based requeue
//! - The append-only event log — the single source of truth for
//!   observability; the job store's current-state table is a convenience
//!   cache rebuildable by replaying the log
//! - Read-only analytics views computed from log scans

pub mod analytics;
pub mod config;
pub mod event;
pub mod event_log;
pub mod job;
pub mod memory;
pub mod replay;
pub mod store;

pub use analytics::{
    error_breakdown, resolver_reliability, status_counts, throughput, ErrorBucket,
    ResolverReliability, StatusCounts, Throughput, TimeWindow,
};
pub use config::StoreConfig;
pub use event::{event_payload, EventPayload, EventRecord, EventType};
pub use event_log::EventLog;
pub use job::{Job, JobState, Lease, LeasedJob, Submission};
pub use memory::InMemoryJobStore;
pub use replay::replayed_states;
pub use store::JobStore;
