//! Read-only analytics views over event log scans.
//!
//! Every view is a pure function of a record slice, optionally
//! time-windowed. Malformed records never reach these functions — the log
//! drops them at recovery time.

use crate::event::{EventRecord, EventType};
use crate::job::JobState;
use crate::replay::replayed_states;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Optional time window for a log scan.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,

    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// A window covering all time.
    pub fn all() -> Self {
        Self::default()
    }

    /// Window starting at `since`, unbounded above.
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: None,
        }
    }

    /// Returns true if the timestamp falls inside the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if ts < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if ts >= until {
                return false;
            }
        }
        true
    }
}

/// Current job counts by state, derived from a full log scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Jobs waiting to be leased.
    pub pending: u64,

    /// Jobs currently being processed.
    pub running: u64,

    /// Jobs resolved successfully.
    pub completed: u64,

    /// Jobs that exhausted every resolver.
    pub failed: u64,
}

impl StatusCounts {
    /// Total jobs observed.
    pub fn total(&self) -> u64 {
        self.pending + self.running + self.completed + self.failed
    }
}

/// Throughput over a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Throughput {
    /// Jobs completed in the window.
    pub completed: u64,

    /// Jobs terminally failed in the window.
    pub failed: u64,

    /// Completed + failed.
    pub total_processed: u64,

    /// Average terminal outcomes per second across the window.
    pub avg_per_second: f64,

    /// Percentage of processed jobs that completed.
    pub success_rate: f64,
}

/// One grouped failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBucket {
    /// The `reason` payload value of FAIL/RETRY events.
    pub reason: String,

    /// Occurrences in the window.
    pub count: u64,
}

/// Per-resolver reliability derived from the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverReliability {
    /// Resolver name.
    pub resolver: String,

    /// PROCESS events (invocations).
    pub attempts: u64,

    /// COMPLETE events attributed to this resolver.
    pub successes: u64,

    /// FAIL events attributed to this resolver.
    pub failures: u64,

    /// RETRY events attributed to this resolver.
    pub retries: u64,

    /// SKIP events (circuit breaker open).
    pub skips: u64,

    /// successes / attempts, as a percentage; 100 when never attempted.
    pub success_rate: f64,
}

/// Counts jobs by their replayed current state.
pub fn status_counts(events: &[EventRecord]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for state in replayed_states(events).values() {
        match state {
            JobState::Pending => counts.pending += 1,
            JobState::Running => counts.running += 1,
            JobState::Completed => counts.completed += 1,
            JobState::Failed => counts.failed += 1,
        }
    }
    counts
}

/// Computes throughput over the window.
pub fn throughput(events: &[EventRecord], window: TimeWindow) -> Throughput {
    let mut completed = 0u64;
    let mut failed = 0u64;
    let mut first: Option<DateTime<Utc>> = None;
    let mut last: Option<DateTime<Utc>> = None;

    for event in events.iter().filter(|e| window.contains(e.timestamp)) {
        first.get_or_insert(event.timestamp);
        last = Some(event.timestamp);
        match event.event_type {
            EventType::Complete => completed += 1,
            EventType::Fail if event.is_terminal_failure() => failed += 1,
            _ => {}
        }
    }

    let total_processed = completed + failed;

    let span_secs = match (window.since.or(first), window.until.or(last)) {
        (Some(start), Some(end)) if end > start => (end - start).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    };
    let avg_per_second = if span_secs > 0.0 {
        total_processed as f64 / span_secs
    } else {
        0.0
    };

    let success_rate = if total_processed > 0 {
        (completed as f64 / total_processed as f64) * 100.0
    } else {
        100.0
    };

    Throughput {
        completed,
        failed,
        total_processed,
        avg_per_second,
        success_rate,
    }
}

/// Groups FAIL and RETRY events by their `reason` payload, most frequent
/// first.
pub fn error_breakdown(events: &[EventRecord], window: TimeWindow) -> Vec<ErrorBucket> {
    let mut buckets: BTreeMap<String, u64> = BTreeMap::new();

    for event in events.iter().filter(|e| window.contains(e.timestamp)) {
        if !matches!(event.event_type, EventType::Fail | EventType::Retry) {
            continue;
        }
        let reason = event.payload_get("reason").unwrap_or("unknown").to_string();
        *buckets.entry(reason).or_insert(0) += 1;
    }

    let mut result: Vec<ErrorBucket> = buckets
        .into_iter()
        .map(|(reason, count)| ErrorBucket { reason, count })
        .collect();
    result.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
    result
}

/// Computes reliability figures for one resolver.
pub fn resolver_reliability(events: &[EventRecord], resolver: &str) -> ResolverReliability {
    let mut stats = ResolverReliability {
        resolver: resolver.to_string(),
        attempts: 0,
        successes: 0,
        failures: 0,
        retries: 0,
        skips: 0,
        success_rate: 100.0,
    };

    for event in events {
        if event.resolver_name.as_deref() != Some(resolver) {
            continue;
        }
        match event.event_type {
            EventType::Process => stats.attempts += 1,
            EventType::Complete => stats.successes += 1,
            EventType::Fail => stats.failures += 1,
            EventType::Retry => stats.retries += 1,
            EventType::Skip => stats.skips += 1,
            EventType::Discover => {}
        }
    }

    if stats.attempts > 0 {
        stats.success_rate = (stats.successes as f64 / stats.attempts as f64) * 100.0;
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{event_payload, EventPayload};
    use gleaner_core::JobId;

    fn record(
        seq: u64,
        event_type: EventType,
        job: &str,
        resolver: Option<&str>,
        payload: EventPayload,
    ) -> EventRecord {
        EventRecord {
            sequence: seq,
            timestamp: Utc::now(),
            event_type,
            job_id: JobId::from_string(job),
            resolver_name: resolver.map(str::to_string),
            payload,
        }
    }

    fn sample_events() -> Vec<EventRecord> {
        vec![
            record(1, EventType::Discover, "job-1", None, EventPayload::new()),
            record(2, EventType::Process, "job-1", Some("a"), EventPayload::new()),
            record(3, EventType::Fail, "job-1", Some("a"), event_payload([("reason", "not_found")])),
            record(4, EventType::Process, "job-1", Some("b"), EventPayload::new()),
            record(5, EventType::Complete, "job-1", Some("b"), EventPayload::new()),
            record(6, EventType::Discover, "job-2", None, EventPayload::new()),
            record(7, EventType::Process, "job-2", Some("a"), EventPayload::new()),
            record(
                8,
                EventType::Fail,
                "job-2",
                Some("a"),
                event_payload([("reason", "exhausted"), ("terminal", "true")]),
            ),
            record(9, EventType::Discover, "job-3", None, EventPayload::new()),
        ]
    }

    #[test]
    fn test_status_counts() {
        let counts = status_counts(&sample_events());
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.running, 0);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_throughput_counts_terminal_outcomes() {
        let t = throughput(&sample_events(), TimeWindow::all());
        assert_eq!(t.completed, 1);
        assert_eq!(t.failed, 1);
        assert_eq!(t.total_processed, 2);
        assert!((t.success_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_throughput_empty_window() {
        let window = TimeWindow {
            since: Some(Utc::now() + chrono::Duration::hours(1)),
            until: None,
        };
        let t = throughput(&sample_events(), window);
        assert_eq!(t.total_processed, 0);
        assert!((t.success_rate - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_error_breakdown_sorted() {
        let mut events = sample_events();
        events.push(record(
            10,
            EventType::Retry,
            "job-3",
            Some("a"),
            event_payload([("reason", "timeout")]),
        ));
        events.push(record(
            11,
            EventType::Retry,
            "job-3",
            Some("a"),
            event_payload([("reason", "timeout")]),
        ));

        let buckets = error_breakdown(&events, TimeWindow::all());
        assert_eq!(buckets[0].reason, "timeout");
        assert_eq!(buckets[0].count, 2);
        assert!(buckets.iter().any(|b| b.reason == "not_found" && b.count == 1));
    }

    #[test]
    fn test_resolver_reliability() {
        let stats = resolver_reliability(&sample_events(), "a");
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.successes, 0);
        assert_eq!(stats.failures, 2);
        assert!((stats.success_rate - 0.0).abs() < f64::EPSILON);

        let stats_b = resolver_reliability(&sample_events(), "b");
        assert_eq!(stats_b.attempts, 1);
        assert_eq!(stats_b.successes, 1);
        assert!((stats_b.success_rate - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_resolver_reliability_untouched_resolver() {
        let stats = resolver_reliability(&sample_events(), "zzz");
        assert_eq!(stats.attempts, 0);
        assert!((stats.success_rate - 100.0).abs() < f64::EPSILON);
    }
}
