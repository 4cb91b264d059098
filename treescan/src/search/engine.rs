use crossbeam_channel::bounded;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::collector::ResultCollector;
use super::deadline::DeadlineGuard;
use super::matcher::CompiledPattern;
use super::pool::WorkerPool;
use super::walker::{TreeWalker, WalkOutcome};
use super::worker::{FileOpener, FsOpener, WorkerContext};
use crate::config::ScanOptions;
use crate::errors::{ScanError, ScanResult};
use crate::filters::{DeviceScope, PathFilter};
use crate::results::{AbortReason, ScanCounters, ScanReport};

/// Lifecycle of one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Walking,
    Draining,
    Sorting,
    Done,
    Aborted,
}

impl ScanPhase {
    fn can_advance_to(self, next: ScanPhase) -> bool {
        matches!(
            (self, next),
            (ScanPhase::Idle, ScanPhase::Walking)
                | (ScanPhase::Walking, ScanPhase::Draining)
                | (ScanPhase::Draining, ScanPhase::Sorting)
                | (ScanPhase::Sorting, ScanPhase::Done)
                | (ScanPhase::Sorting, ScanPhase::Aborted)
        )
    }
}

/// Tracks the current phase and the first reason the scan was cut short.
///
/// An abort is recorded while walking or draining but does not skip the
/// remaining phases: the pool is still joined and the results still drained
/// and sorted, so the scan ends in `Aborted` with everything collected.
#[derive(Debug)]
struct PhaseTracker {
    phase: ScanPhase,
    abort: Option<AbortReason>,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            phase: ScanPhase::Idle,
            abort: None,
        }
    }

    fn advance(&mut self, next: ScanPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid scan transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!("Scan phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn abort(&mut self, reason: AbortReason) {
        debug_assert!(matches!(self.phase, ScanPhase::Walking | ScanPhase::Draining));
        if self.abort.is_none() {
            warn!("Scan aborted while {:?}: {:?}", self.phase, reason);
            self.abort = Some(reason);
        }
    }

    fn finish(&mut self) -> Option<AbortReason> {
        let last = if self.abort.is_some() {
            ScanPhase::Aborted
        } else {
            ScanPhase::Done
        };
        self.advance(last);
        self.abort
    }
}

/// Runs scans with a fixed set of options.
///
/// ```rust,ignore
/// let report = Scanner::new(ScanOptions::default()).scan("src", "todo")?;
/// for m in &report.matches {
///     println!("{}:{}:{}", m.path.display(), m.line_number, m.line_text);
/// }
/// ```
pub struct Scanner {
    options: ScanOptions,
    opener: Arc<dyn FileOpener>,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            opener: Arc::new(FsOpener),
        }
    }

    /// Replaces how workers open files
    pub fn with_opener(mut self, opener: Arc<dyn FileOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Scans every accepted file below `root` for lines matching `pattern`.
    ///
    /// Returns `Err` only when the scan cannot start: a missing or
    /// unreadable root, a bad pattern or glob, or no threads. Everything
    /// after that is reflected in the report.
    pub fn scan(&self, root: impl AsRef<Path>, pattern: &str) -> ScanResult<ScanReport> {
        let started = Instant::now();
        let guard = DeadlineGuard::after(self.options.timeout);
        let root = root.as_ref();
        info!("Starting scan of {} for pattern: {}", root.display(), pattern);

        let root_meta = fs::metadata(root).map_err(|e| ScanError::from_root_io(root, e))?;
        if !root_meta.is_dir() {
            return Err(ScanError::root_not_directory(root));
        }
        fs::read_dir(root).map_err(|e| ScanError::from_root_io(root, e))?;

        let pattern = Arc::new(CompiledPattern::with_options(
            pattern,
            self.options.case_mode,
            self.options.literal,
        )?);
        debug!(
            "Compiled pattern {:?} (case sensitive: {})",
            pattern.raw_pattern(),
            pattern.is_case_sensitive()
        );

        let scope = DeviceScope::from_metadata(&root_meta);
        let filter = PathFilter::from_options(root, scope, &self.options)?;
        let walker = TreeWalker::from_options(root, filter, &self.options);

        let cancel = guard.signal();
        let counters = Arc::new(ScanCounters::new());
        let mut phase = PhaseTracker::new();

        // Idle -> Walking
        phase.advance(ScanPhase::Walking);
        let (result_tx, result_rx) = bounded(self.options.result_capacity);
        let collector = ResultCollector::start(result_rx)?;
        let ctx = WorkerContext::new(
            result_tx,
            Arc::clone(&counters),
            cancel.clone(),
            Arc::clone(&self.opener),
        );
        let mut pool = match WorkerPool::start(
            self.options.worker_count,
            self.options.queue_capacity,
            ctx,
        ) {
            Ok(pool) => {
                debug!("Started {} workers", pool.size());
                pool
            }
            Err(e) => {
                // The failed pool already joined its workers and dropped every sender
                collector.finish();
                return Err(e);
            }
        };

        match walker.walk(&mut pool, &pattern, &cancel, &counters) {
            WalkOutcome::Finished => {}
            WalkOutcome::DeadlineExceeded => phase.abort(AbortReason::DeadlineExceeded),
            WalkOutcome::SinkClosed => phase.abort(AbortReason::WorkerFailure),
        }

        // Walking -> Draining: close the job queue and wait for in-flight files
        phase.advance(ScanPhase::Draining);
        let pool_outcome = pool.close_and_wait();
        if !pool_outcome.is_clean() {
            phase.abort(AbortReason::WorkerFailure);
        }
        if counters.snapshot().files_skipped > 0 {
            phase.abort(AbortReason::DeadlineExceeded);
        }

        // Draining -> Sorting: the last result sender went away with the workers
        phase.advance(ScanPhase::Sorting);
        let matches = collector.finish();

        let abort_reason = phase.finish();
        let report = ScanReport::new(matches, counters.snapshot(), started.elapsed(), abort_reason);

        info!(
            "Scan {}: {} matches in {} files scanned ({} errors) in {:?}",
            if report.complete { "complete" } else { "incomplete" },
            report.matches_found,
            report.files_scanned,
            report.errors,
            report.elapsed
        );
        Ok(report)
    }
}

/// Scans `root` for lines matching `pattern`
pub fn scan(root: impl AsRef<Path>, pattern: &str, options: &ScanOptions) -> ScanResult<ScanReport> {
    Scanner::new(options.clone()).scan(root, pattern)
}
