//! Per-resolver circuit breakers.
//!
//! One state machine per resolver name isolates a flaky upstream source so
//! its failures do not consume retry budget on every job that reaches it,
//! and probes recovery automatically instead of requiring manual re-enable.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Requests are allowed.
    Closed,
    /// Requests are rejected until the cooldown elapses.
    Open,
    /// A limited number of trial requests are allowed.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before opening the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds to wait in the open state before probing recovery. Slow or
    /// expensive resolvers should configure a proportionally longer value.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Trial requests allowed while half-open, before the gate re-closes
    /// until a trial resolves.
    #[serde(default = "default_half_open_trial_limit")]
    pub half_open_trial_limit: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_half_open_trial_limit() -> u32 {
    1
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            half_open_trial_limit: default_half_open_trial_limit(),
        }
    }
}

impl BreakerConfig {
    /// Returns the cooldown as a Duration.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Point-in-time view of a breaker, for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Resolver name this breaker guards.
    pub name: String,

    /// Current state.
    pub state: BreakerState,

    /// Consecutive failures recorded while closed.
    pub consecutive_failures: u32,

    /// Trial permits remaining while half-open.
    pub half_open_trial_remaining: u32,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_trial_remaining: u32,
}

/// Failure-isolation state machine for a single resolver.
pub struct CircuitBreaker {
    name: String,
    inner: Mutex<BreakerInner>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_trial_remaining: 0,
            }),
            config,
        }
    }

    /// Creates a new circuit breaker with default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, BreakerConfig::default())
    }

    /// Returns the name of the resolver this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current state.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Checks whether a request may proceed.
    ///
    /// While open and inside the cooldown window this has no side effects.
    /// Once the cooldown elapses the breaker transitions to half-open and
    /// hands out up to `half_open_trial_limit` trial permits; further calls
    /// return false until a trial resolves via [`Self::record_outcome`].
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.cooldown())
                    .unwrap_or(true);
                if !elapsed {
                    return false;
                }

                inner.state = BreakerState::HalfOpen;
                inner.half_open_trial_remaining = self.config.half_open_trial_limit;
                debug!(breaker = %self.name, "Circuit breaker transitioning to half-open");

                inner.half_open_trial_remaining -= 1;
                true
            }
            BreakerState::HalfOpen => {
                if inner.half_open_trial_remaining == 0 {
                    return false;
                }
                inner.half_open_trial_remaining -= 1;
                true
            }
        }
    }

    /// Records the outcome of a permitted request.
    pub fn record_outcome(&self, success: bool) {
        let mut inner = self.inner.lock();

        match (inner.state, success) {
            (BreakerState::Closed, true) => {
                inner.consecutive_failures = 0;
            }
            (BreakerState::Closed, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "Circuit breaker opened"
                    );
                }
            }
            (BreakerState::HalfOpen, true) => {
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.half_open_trial_remaining = 0;
                debug!(breaker = %self.name, "Circuit breaker closed after successful trial");
            }
            (BreakerState::HalfOpen, false) => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_trial_remaining = 0;
                warn!(breaker = %self.name, "Circuit breaker reopened after failed trial");
            }
            (BreakerState::Open, _) => {
                // Outcome from a request permitted before the breaker
                // opened; the cooldown timer already reflects the newest
                // failure, nothing to update.
            }
        }
    }

    /// Manually resets the breaker to closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.half_open_trial_remaining = 0;
        debug!(breaker = %self.name, "Circuit breaker manually reset");
    }

    /// Returns a point-in-time snapshot.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_trial_remaining: inner.half_open_trial_remaining,
        }
    }

    #[cfg(test)]
    fn force_cooldown_elapsed(&self) {
        let mut inner = self.inner.lock();
        // A missing opened_at is treated as elapsed by allow().
        inner.opened_at = Instant::now().checked_sub(self.config.cooldown());
    }
}

/// Keyed store of circuit breakers, one per resolver name.
///
/// Injected into workers rather than accessed as ambient global state, so
/// it stays testable and swappable.
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: BreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Creates a registry with the given default configuration.
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            default_config,
        }
    }

    /// Creates a registry with default breaker configuration.
    pub fn with_defaults() -> Self {
        Self::new(BreakerConfig::default())
    }

    /// Registers a per-resolver configuration override.
    ///
    /// Replaces any existing breaker for the name, resetting its state.
    pub fn configure(&self, name: impl Into<String>, config: BreakerConfig) {
        let name = name.into();
        let breaker = Arc::new(CircuitBreaker::new(name.clone(), config));
        self.breakers.write().insert(name, breaker);
    }

    /// Checks whether a request to the named resolver may proceed.
    pub fn allow(&self, name: &str) -> bool {
        self.breaker(name).allow()
    }

    /// Records the outcome of a permitted request to the named resolver.
    pub fn record_outcome(&self, name: &str, success: bool) {
        self.breaker(name).record_outcome(success);
    }

    /// Returns the current state of the named resolver's breaker.
    pub fn state(&self, name: &str) -> BreakerState {
        self.breaker(name).state()
    }

    /// Returns snapshots of every registered breaker.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> = self
            .breakers
            .read()
            .values()
            .map(|b| b.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(name, self.default_config.clone()))
            })
            .clone()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(threshold: u32) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            cooldown_secs: 60,
            half_open_trial_limit: 1,
        }
    }

    #[test]
    fn test_initial_state_closed() {
        let cb = CircuitBreaker::with_defaults("test");
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.allow());
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("test", fast_config(3));

        cb.record_outcome(false);
        cb.record_outcome(false);
        assert_eq!(cb.state(), BreakerState::Closed);

        cb.record_outcome(false);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = CircuitBreaker::new("test", fast_config(3));

        cb.record_outcome(false);
        cb.record_outcome(false);
        cb.record_outcome(true);
        cb.record_outcome(false);
        cb.record_outcome(false);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_allow_has_no_side_effects_while_open() {
        let cb = CircuitBreaker::new("test", fast_config(1));
        cb.record_outcome(false);
        assert_eq!(cb.state(), BreakerState::Open);

        for _ in 0..10 {
            assert!(!cb.allow());
        }
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn test_half_open_single_trial() {
        let cb = CircuitBreaker::new("test", fast_config(1));
        cb.record_outcome(false);
        cb.force_cooldown_elapsed();

        // First call after cooldown grants the single trial permit.
        assert!(cb.allow());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        // Gate is re-closed until the trial resolves.
        assert!(!cb.allow());
        assert!(!cb.allow());
    }

    #[test]
    fn test_half_open_success_closes() {
        let cb = CircuitBreaker::new("test", fast_config(1));
        cb.record_outcome(false);
        cb.force_cooldown_elapsed();

        assert!(cb.allow());
        cb.record_outcome(true);
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.allow());
        assert_eq!(cb.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("test", fast_config(1));
        cb.record_outcome(false);
        cb.force_cooldown_elapsed();

        assert!(cb.allow());
        cb.record_outcome(false);
        assert_eq!(cb.state(), BreakerState::Open);
        // Cooldown restarted, so the gate stays shut.
        assert!(!cb.allow());
    }

    #[test]
    fn test_half_open_trial_limit_respected() {
        let config = BreakerConfig {
            failure_threshold: 1,
            cooldown_secs: 60,
            half_open_trial_limit: 2,
        };
        let cb = CircuitBreaker::new("test", config);
        cb.record_outcome(false);
        cb.force_cooldown_elapsed();

        assert!(cb.allow());
        assert!(cb.allow());
        assert!(!cb.allow());
    }

    #[test]
    fn test_registry_isolates_resolvers() {
        let registry = CircuitBreakerRegistry::new(fast_config(1));

        registry.record_outcome("flaky", false);
        assert!(!registry.allow("flaky"));
        assert!(registry.allow("steady"));
    }

    #[test]
    fn test_registry_configure_override() {
        let registry = CircuitBreakerRegistry::with_defaults();
        registry.configure(
            "expensive",
            BreakerConfig {
                failure_threshold: 1,
                cooldown_secs: 300,
                half_open_trial_limit: 1,
            },
        );

        registry.record_outcome("expensive", false);
        assert_eq!(registry.state("expensive"), BreakerState::Open);
    }

    #[test]
    fn test_registry_snapshot_sorted() {
        let registry = CircuitBreakerRegistry::with_defaults();
        registry.allow("zeta");
        registry.allow("alpha");

        let snapshots = registry.snapshot();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name, "alpha");
        assert_eq!(snapshots[1].name, "zeta");
    }

    #[test]
    fn test_breaker_config_default() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.cooldown_secs, 60);
        assert_eq!(config.half_open_trial_limit, 1);
    }

    #[test]
    fn test_breaker_config_deserialize_defaults() {
        let config: BreakerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.failure_threshold, 5);
    }
}
