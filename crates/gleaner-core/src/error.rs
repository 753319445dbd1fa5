//! Unified error types for all layers of the pipeline.

use thiserror::Error;

/// Result type alias using [`GleanerError`].
pub type GleanerResult<T> = Result<T, GleanerError>;

/// Unified error type for the Gleaner pipeline.
///
/// Covers domain, store, resilience, and infrastructure errors. Resolver
/// outcomes are NOT errors — they are expressed by the pipeline's
/// `ResolutionResult` taxonomy and never escape the resolver chain.
#[derive(Error, Debug)]
pub enum GleanerError {
    // ============ Domain Errors ============
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict error (e.g., state transition on a terminal job)
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ Store Errors ============
    /// Lease token does not match the job's current lease. The caller must
    /// abandon its work; the job was not mutated.
    #[error("Lease conflict on job {job_id}: {reason}")]
    LeaseConflict { job_id: String, reason: String },

    /// Job store error
    #[error("Store error: {0}")]
    Storage(String),

    /// Event log append or recovery error
    #[error("Event log error: {0}")]
    EventLog(String),

    // ============ Resilience Errors ============
    /// Circuit breaker open
    #[error("Service unavailable: circuit breaker open for {0}")]
    CircuitBreakerOpen(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============ Infrastructure Errors ============
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GleanerError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::LeaseConflict { .. } => "LEASE_CONFLICT",
            Self::Storage(_) => "STORE_ERROR",
            Self::EventLog(_) => "EVENT_LOG_ERROR",
            Self::CircuitBreakerOpen(_) => "CIRCUIT_BREAKER_OPEN",
            Self::Timeout(_) => "TIMEOUT",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a lease conflict error.
    #[must_use]
    pub fn lease_conflict<T: ToString, U: Into<String>>(job_id: T, reason: U) -> Self {
        Self::LeaseConflict {
            job_id: job_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a store error.
    #[must_use]
    pub fn storage<T: Into<String>>(message: T) -> Self {
        Self::Storage(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if this error is retriable at the infrastructure level.
    ///
    /// A lease conflict is never retriable: the caller lost ownership and
    /// must abandon the job rather than retry the mutation.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::EventLog(_) | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for GleanerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(GleanerError::not_found("Job", 1).error_code(), "NOT_FOUND");
        assert_eq!(
            GleanerError::lease_conflict("job-1", "token mismatch").error_code(),
            "LEASE_CONFLICT"
        );
        assert_eq!(
            GleanerError::CircuitBreakerOpen("resolver-a".into()).error_code(),
            "CIRCUIT_BREAKER_OPEN"
        );
        assert_eq!(
            GleanerError::Timeout("resolver call".into()).error_code(),
            "TIMEOUT"
        );
    }

    #[test]
    fn test_retriable_errors() {
        assert!(GleanerError::storage("lock poisoned").is_retriable());
        assert!(GleanerError::EventLog("disk full".into()).is_retriable());
        assert!(GleanerError::Timeout("slow upstream".into()).is_retriable());
    }

    #[test]
    fn test_lease_conflict_not_retriable() {
        let err = GleanerError::lease_conflict("job-9", "stale token");
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_error_constructors() {
        let not_found = GleanerError::not_found("Job", "abc");
        assert!(not_found.to_string().contains("Job"));

        let conflict = GleanerError::lease_conflict("job-1", "expired");
        let msg = conflict.to_string();
        assert!(msg.contains("job-1") && msg.contains("expired"));

        let validation = GleanerError::validation("empty origin_url");
        assert!(validation.to_string().contains("empty origin_url"));
    }

    #[test]
    fn test_from_serde_json() {
        let bad = serde_json::from_str::<serde_json::Value>("{");
        let err = GleanerError::from(bad.unwrap_err());
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }
}
