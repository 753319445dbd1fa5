//! Retry policies for transient resolver failures.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// base × 2^(attempt-1), capped.
    Exponential,
    /// base × attempt, capped.
    Linear,
    /// base × fib(attempt), capped.
    Fibonacci,
}

/// Retry policy configuration.
///
/// `max_attempts` is the total attempt budget for one resolver on one job,
/// including the initial attempt. Once exhausted, the resolver chain
/// advances rather than retrying the same resolver indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Backoff strategy.
    pub strategy: BackoffStrategy,

    /// Total attempts allowed, including the first.
    pub max_attempts: u32,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,

    /// Apply ±20% randomized jitter to computed delays, so many jobs
    /// hitting the same resolver do not retry in lockstep.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3)
    }
}

impl RetryPolicy {
    /// Creates an exponential backoff policy.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            max_attempts,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }

    /// Creates a linear backoff policy.
    pub fn linear(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            strategy: BackoffStrategy::Linear,
            max_attempts,
            base_delay_ms,
            max_delay_ms: base_delay_ms.saturating_mul(max_attempts.max(1) as u64),
            jitter: true,
        }
    }

    /// Creates a fibonacci backoff policy.
    pub fn fibonacci(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            strategy: BackoffStrategy::Fibonacci,
            max_attempts,
            base_delay_ms,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the maximum delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Disables jitter.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Returns true if another attempt fits the budget.
    ///
    /// `attempt_number` is 1-based: `should_retry(1)` asks whether a second
    /// attempt may follow the first.
    pub fn should_retry(&self, attempt_number: u32) -> bool {
        attempt_number < self.max_attempts
    }

    /// Computes the delay before retry number `attempt` (1-based).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = match self.strategy {
            BackoffStrategy::Exponential => {
                let exp = (attempt - 1).min(32);
                self.base_delay_ms.saturating_mul(1u64 << exp)
            }
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(attempt as u64),
            BackoffStrategy::Fibonacci => self.base_delay_ms.saturating_mul(fib(attempt)),
        };

        let capped = base.min(self.max_delay_ms);

        let final_delay = if self.jitter {
            apply_jitter(capped)
        } else {
            capped
        };

        Duration::from_millis(final_delay)
    }
}

/// Iterative fibonacci: fib(1) = 1, fib(2) = 1, fib(3) = 2, ...
fn fib(n: u32) -> u64 {
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 2..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    if n <= 1 {
        1
    } else {
        b
    }
}

/// Scales a delay by a random factor in [0.8, 1.2].
fn apply_jitter(delay_ms: u64) -> u64 {
    let factor = 0.8 + rand_unit() * 0.4;
    (delay_ms as f64 * factor) as u64
}

/// Simple pseudo-random unit value using an LCG over the system clock.
fn rand_unit() -> f64 {
    use std::time::SystemTime;

    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    // LCG parameters
    let a: u64 = 6364136223846793005;
    let c: u64 = 1442695040888963407;

    let random = seed.wrapping_mul(a).wrapping_add(c);
    (random % 10_000) as f64 / 10_000.0
}
