//! Pipeline configuration.

use gleaner_core::TelemetryConfig;
use gleaner_resilience::BreakerConfig;
use gleaner_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for an embedded pipeline.
///
/// The host supplies this however it loads configuration; the pipeline
/// only defines the shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GleanerConfig {
    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Job store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Default circuit breaker configuration; per-resolver overrides go
    /// through the registry at registration time.
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Pipeline configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Resolver chain and worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Results with confidence below this are accepted but flagged
    /// low-confidence.
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f32,

    /// Worker pool configuration.
    #[serde(default)]
    pub worker: WorkerPoolConfig,
}

fn default_acceptance_threshold() -> f32 {
    0.5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: default_acceptance_threshold(),
            worker: WorkerPoolConfig::default(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Polling interval in milliseconds when no job is available.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Heartbeat interval in seconds while processing a job. Should be a
    /// fraction of the store's lease TTL.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Shutdown drain timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    100
}

fn default_heartbeat_interval() -> u64 {
    20
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl WorkerPoolConfig {
    /// Returns the poll interval as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the heartbeat interval as a Duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Returns the shutdown timeout as a Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert!((config.acceptance_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.worker.concurrency, 4);
    }

    #[test]
    fn test_gleaner_config_deserialize_empty() {
        let config: GleanerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.store.lease_ttl_secs, 60);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.pipeline.worker.poll_interval_ms, 100);
    }

    #[test]
    fn test_worker_config_durations() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(20));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }
}
