//! Result types produced by a scan.
//!
//! [`MatchRecord`]s are created by workers and never modified afterwards.
//! [`ScanCounters`] is the one piece of state every worker writes to, so each
//! field is an atomic that only ever grows during a run. The final
//! [`ScanReport`] owns the sorted records plus a snapshot of the counters.
use serde::Serialize;
use std::cmp::Ordering as CmpOrdering;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ScanResult;

/// One matching line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    /// The file the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub line_number: usize,
    /// The line without its terminator
    pub line_text: String,
}

impl MatchRecord {
    pub fn new(path: impl Into<PathBuf>, line_number: usize, line_text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line_number,
            line_text: line_text.into(),
        }
    }
}

impl Ord for MatchRecord {
    /// Path first, then line number; the text only breaks ties
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.path
            .cmp(&other.path)
            .then(self.line_number.cmp(&other.line_number))
            .then_with(|| self.line_text.cmp(&other.line_text))
    }
}

impl PartialOrd for MatchRecord {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Shared counters updated concurrently by workers
#[derive(Debug, Default)]
pub struct ScanCounters {
    files_scanned: AtomicUsize,
    matches_found: AtomicUsize,
    errors: AtomicUsize,
    binary_files: AtomicUsize,
    files_skipped: AtomicUsize,
}

impl ScanCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one finished file and the number of lines it matched
    pub fn record_file(&self, matches: usize) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
        self.matches_found.fetch_add(matches, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_binary(&self) {
        self.binary_files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            matches_found: self.matches_found.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            binary_files: self.binary_files.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ScanCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub files_scanned: usize,
    pub matches_found: usize,
    pub errors: usize,
    pub binary_files: usize,
    pub files_skipped: usize,
}

/// Why a scan returned partial results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The wall-clock budget ran out before every file was scanned
    DeadlineExceeded,
    /// A worker thread died and its queued files were not all scanned
    WorkerFailure,
}

/// The outcome of a scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Matches sorted by path, then line number
    pub matches: Vec<MatchRecord>,
    /// Files opened and read by a worker
    pub files_scanned: usize,
    /// Matching lines across all files
    pub matches_found: usize,
    /// Entries that could not be listed or opened
    pub errors: usize,
    /// Files abandoned after a NUL byte was seen
    pub binary_files: usize,
    /// Queued files dropped once the deadline passed
    pub files_skipped: usize,
    #[serde(serialize_with = "serialize_elapsed")]
    pub elapsed: Duration,
    /// False when the deadline cut the scan short or a worker failed
    pub complete: bool,
    pub abort_reason: Option<AbortReason>,
}

impl ScanReport {
    pub fn new(
        matches: Vec<MatchRecord>,
        counters: CounterSnapshot,
        elapsed: Duration,
        abort_reason: Option<AbortReason>,
    ) -> Self {
        Self {
            matches,
            files_scanned: counters.files_scanned,
            matches_found: counters.matches_found,
            errors: counters.errors,
            binary_files: counters.binary_files,
            files_skipped: counters.files_skipped,
            elapsed,
            complete: abort_reason.is_none(),
            abort_reason,
        }
    }

    /// Number of distinct files with at least one match
    pub fn files_with_matches(&self) -> usize {
        let mut count = 0;
        let mut last: Option<&PathBuf> = None;
        for record in &self.matches {
            if last != Some(&record.path) {
                count += 1;
                last = Some(&record.path);
            }
        }
        count
    }

    pub fn to_json_pretty(&self) -> ScanResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn serialize_elapsed<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}
