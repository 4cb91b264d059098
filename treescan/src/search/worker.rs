use crossbeam_channel::{Receiver, Sender};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

use super::deadline::CancelSignal;
use super::matcher::{self, CompiledPattern};
use crate::results::{MatchRecord, ScanCounters};

const BUFFER_CAPACITY: usize = 64 * 1024;

/// One file to scan. Consumed by exactly one worker.
#[derive(Debug, Clone)]
pub struct Job {
    pub path: PathBuf,
    pub pattern: Arc<CompiledPattern>,
}

/// Opens files for workers. The default reads from disk; tests swap in
/// instrumented openers.
pub trait FileOpener: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsOpener;

impl FileOpener for FsOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }
}

/// What scanning one file produced
#[derive(Debug, Default)]
pub struct FileScan {
    /// Records accepted by the sink
    pub matches: usize,
    /// Lines read, including the one that revealed binary content
    pub lines: usize,
    pub binary: bool,
    /// A read failure part-way through; earlier matches still count
    pub error: Option<io::Error>,
}

/// Scans `reader` line by line, handing each match to `emit`.
///
/// Stops at the first line containing a NUL byte. `emit` returns false when
/// the sink has gone away, which also stops the scan.
pub fn scan_lines<R, F>(mut reader: R, path: &Path, pattern: &CompiledPattern, mut emit: F) -> FileScan
where
    R: BufRead,
    F: FnMut(MatchRecord) -> bool,
{
    let mut scan = FileScan::default();
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                scan.error = Some(e);
                break;
            }
        }
        scan.lines += 1;

        if matcher::is_binary_line(&buf) {
            scan.binary = true;
            break;
        }

        let line = strip_terminator(&buf);
        let text = String::from_utf8_lossy(line);
        if matcher::matches(&text, pattern) {
            if !emit(MatchRecord::new(path, scan.lines, text.into_owned())) {
                break;
            }
            scan.matches += 1;
        }
    }

    scan
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// State shared by every worker in a pool
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub results: Sender<MatchRecord>,
    pub counters: Arc<ScanCounters>,
    pub cancel: CancelSignal,
    pub opener: Arc<dyn FileOpener>,
    /// Jobs taken off the queue and finished, scanned or skipped
    pub completed: Arc<AtomicUsize>,
}

impl WorkerContext {
    pub fn new(
        results: Sender<MatchRecord>,
        counters: Arc<ScanCounters>,
        cancel: CancelSignal,
        opener: Arc<dyn FileOpener>,
    ) -> Self {
        Self {
            results,
            counters,
            cancel,
            opener,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// A long-lived scan loop bound to one thread
pub(crate) struct Worker {
    id: usize,
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(id: usize, ctx: WorkerContext) -> Self {
        Self { id, ctx }
    }

    /// Processes jobs until the queue is closed and empty
    pub fn run(self, jobs: Receiver<Job>) {
        trace!("Worker {} started", self.id);
        for job in jobs.iter() {
            if self.ctx.cancel.is_cancelled() {
                self.ctx.counters.record_skipped();
            } else {
                self.process(&job);
            }
            self.ctx.completed.fetch_add(1, Ordering::AcqRel);
        }
        trace!("Worker {} finished", self.id);
    }

    fn process(&self, job: &Job) {
        trace!("Worker {} scanning {}", self.id, job.path.display());

        let file = match self.ctx.opener.open(&job.path) {
            Ok(file) => file,
            Err(e) => {
                warn!("Failed to open {}: {}", job.path.display(), e);
                self.ctx.counters.record_error();
                return;
            }
        };

        let reader = BufReader::with_capacity(BUFFER_CAPACITY, file);
        let results = &self.ctx.results;
        let scan = scan_lines(reader, &job.path, &job.pattern, |record| {
            results.send(record).is_ok()
        });

        if scan.binary {
            trace!("Binary content in {}, stopped at line {}", job.path.display(), scan.lines);
            self.ctx.counters.record_binary();
        }
        if let Some(e) = &scan.error {
            warn!("Failed to read {}: {}", job.path.display(), e);
            self.ctx.counters.record_error();
        }
        self.ctx.counters.record_file(scan.matches);
    }
}
