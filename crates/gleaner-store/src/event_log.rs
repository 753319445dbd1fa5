//! The append-only event log.
//!
//! Single source of truth for observability. Records are framed as JSON
//! Lines: one record per line, safely truncatable at any line boundary.
//! The job store's current-state table is a derived cache over this log.

use crate::event::{EventPayload, EventRecord, EventType};
use gleaner_core::{GleanerError, GleanerResult, JobId};
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Attempts for a single sink write before the append is declared failed.
const WRITE_ATTEMPTS: u32 = 3;

/// Capacity of the tail broadcast channel. Lagging subscribers miss
/// events; they never block the pipeline.
const TAIL_CAPACITY: usize = 256;

struct LogInner {
    next_sequence: u64,
    records: Vec<EventRecord>,
    sink: Option<BufWriter<File>>,
}

/// Append-only, totally ordered event log.
pub struct EventLog {
    inner: Mutex<LogInner>,
    tail_tx: broadcast::Sender<EventRecord>,
    path: Option<PathBuf>,
}

impl EventLog {
    /// Creates a log with no durable sink (tests, embedded use).
    pub fn in_memory() -> Self {
        let (tail_tx, _) = broadcast::channel(TAIL_CAPACITY);
        Self {
            inner: Mutex::new(LogInner {
                next_sequence: 1,
                records: Vec::new(),
                sink: None,
            }),
            tail_tx,
            path: None,
        }
    }

    /// Opens a file-backed log, replaying any existing records.
    ///
    /// Malformed or partial trailing lines (e.g. from a crash mid-write)
    /// are skipped rather than failing the scan; the sequence counter
    /// resumes after the highest replayed sequence.
    pub fn open(path: impl AsRef<Path>) -> GleanerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut records = Vec::new();
        let mut skipped = 0usize;

        if path.exists() {
            let file = File::open(&path)
                .map_err(|e| GleanerError::EventLog(format!("open {}: {}", path.display(), e)))?;
            for line in BufReader::new(file).lines() {
                let line = line
                    .map_err(|e| GleanerError::EventLog(format!("read {}: {}", path.display(), e)))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<EventRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(_) => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            warn!(path = %path.display(), skipped, "Skipped malformed event log records during recovery");
        }

        let next_sequence = records.last().map(|r| r.sequence + 1).unwrap_or(1);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| GleanerError::EventLog(format!("append-open {}: {}", path.display(), e)))?;

        let (tail_tx, _) = broadcast::channel(TAIL_CAPACITY);
        debug!(path = %path.display(), replayed = records.len(), next_sequence, "Event log opened");

        Ok(Self {
            inner: Mutex::new(LogInner {
                next_sequence,
                records,
                sink: Some(BufWriter::new(file)),
            }),
            tail_tx,
            path: Some(path),
        })
    }

    /// Appends an event, assigning its sequence number and timestamp.
    ///
    /// The sink write is retried a bounded number of times; if every
    /// attempt fails the append returns an error and nothing is recorded —
    /// a worker that cannot log must not silently proceed.
    pub fn append(
        &self,
        event_type: EventType,
        job_id: &JobId,
        resolver_name: Option<&str>,
        payload: EventPayload,
    ) -> GleanerResult<EventRecord> {
        let mut inner = self.inner.lock();

        let record = EventRecord {
            sequence: inner.next_sequence,
            timestamp: Utc::now(),
            event_type,
            job_id: job_id.clone(),
            resolver_name: resolver_name.map(str::to_string),
            payload,
        };

        if inner.sink.is_some() {
            let line = serde_json::to_string(&record)?;
            let sink = inner.sink.as_mut().ok_or_else(|| {
                GleanerError::EventLog("sink disappeared during append".to_string())
            })?;
            write_line(sink, &line)?;
        }

        inner.next_sequence += 1;
        inner.records.push(record.clone());
        drop(inner);

        // Tail subscribers are best-effort; a closed or lagging receiver
        // must not affect the append.
        let _ = self.tail_tx.send(record.clone());

        Ok(record)
    }

    /// Returns a copy of every record, in sequence order.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.inner.lock().records.clone()
    }

    /// Returns records with sequence strictly greater than `after`.
    pub fn events_since(&self, after: u64) -> Vec<EventRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.sequence > after)
            .cloned()
            .collect()
    }

    /// Number of records in the log.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns true if the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes to the live tail of the log.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.tail_tx.subscribe()
    }

    /// Path of the durable sink, when file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Writes and flushes one framed record, retrying transient I/O errors.
fn write_line(sink: &mut BufWriter<File>, line: &str) -> GleanerResult<()> {
    let mut last_err = None;
    for attempt in 1..=WRITE_ATTEMPTS {
        let result = writeln!(sink, "{}", line).and_then(|()| sink.flush());
        match result {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(attempt, error = %e, "Event log write failed");
                last_err = Some(e);
                if attempt < WRITE_ATTEMPTS {
                    std::thread::sleep(std::time::Duration::from_millis(5 * attempt as u64));
                }
            }
        }
    }

    Err(GleanerError::EventLog(format!(
        "write failed after {} attempts: {}",
        WRITE_ATTEMPTS,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}
