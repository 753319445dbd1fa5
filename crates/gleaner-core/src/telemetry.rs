//! Tracing setup for pipeline binaries and tests.

use crate::error::GleanerResult;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether tracing output is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Service name attached to log lines.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Emit JSON-formatted log lines instead of human-readable ones.
    #[serde(default)]
    pub json_output: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_service_name() -> String {
    "gleaner".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            service_name: default_service_name(),
            json_output: false,
        }
    }
}

/// Initialize the tracing subscriber with the given configuration.
///
/// Respects `RUST_LOG` when set; defaults to info with debug for gleaner
/// crates. Safe to call once per process; a second call returns an error
/// from the subscriber and is reported as a configuration error.
pub fn init_tracing(config: &TelemetryConfig) -> GleanerResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gleaner=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = if config.json_output {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| {
        crate::GleanerError::Configuration(format!("failed to init tracing: {}", e))
    })?;

    tracing::info!(service_name = %config.service_name, "Telemetry initialized");
    Ok(())
}
