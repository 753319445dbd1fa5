//! Job store configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Lease time-to-live in seconds. A running job whose lease outlives
    /// this without a heartbeat is returned to pending by the sweeper.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,

    /// Interval between expired-lease sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: default_lease_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_lease_ttl() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    15
}

impl StoreConfig {
    /// Returns the lease TTL as a Duration.
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    /// Returns the sweep interval as a Duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
