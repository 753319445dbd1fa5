//! Rebuilding job state from the event log.
//!
//! The store's current-state table is a convenience cache; this module is
//! the proof: replaying the log yields the same states the live store
//! reports.

use crate::event::{EventRecord, EventType};
use crate::job::JobState;
use gleaner_core::JobId;
use std::collections::BTreeMap;

/// Derives the current state of every job seen in the log.
///
/// Events must be supplied in sequence order (as [`crate::EventLog`]
/// returns them). Resolver-level FAIL events do not change job state; only
/// a FAIL carrying the terminal marker does.
pub fn replayed_states(events: &[EventRecord]) -> BTreeMap<JobId, JobState> {
    let mut states = BTreeMap::new();

    for event in events {
        match event.event_type {
            EventType::Discover => {
                states.insert(event.job_id.clone(), JobState::Pending);
            }
            EventType::Process => {
                states.insert(event.job_id.clone(), JobState::Running);
            }
            EventType::Complete => {
                states.insert(event.job_id.clone(), JobState::Completed);
            }
            EventType::Fail => {
                if event.is_terminal_failure() {
                    states.insert(event.job_id.clone(), JobState::Failed);
                }
            }
            EventType::Retry => {
                if event.payload_get("reason") == Some("lease_expired") {
                    states.insert(event.job_id.clone(), JobState::Pending);
                }
            }
            EventType::Skip => {}
        }
    }

    states
}
