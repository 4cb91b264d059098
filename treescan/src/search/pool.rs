use crossbeam_channel::{bounded, SendError, Sender};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

use super::worker::{Job, Worker, WorkerContext};
use crate::errors::{ScanError, ScanResult};

/// How a pool ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PoolOutcome {
    pub submitted: usize,
    pub completed: usize,
    /// Worker threads that panicked instead of draining the queue
    pub panicked: usize,
}

impl PoolOutcome {
    /// Every submitted job was finished by a worker that exited normally
    pub fn is_clean(&self) -> bool {
        self.panicked == 0 && self.submitted == self.completed
    }
}

/// A fixed set of worker threads fed from one bounded queue.
///
/// `submit` blocks while the queue is full, so the walker can never run
/// more than `queue_capacity` files ahead of the workers, and at most one
/// file per worker is open at a time.
pub(crate) struct WorkerPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    submitted: usize,
    completed: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawns `size` workers sharing a queue of `queue_capacity` jobs
    pub(crate) fn start(
        size: NonZeroUsize,
        queue_capacity: usize,
        ctx: WorkerContext,
    ) -> ScanResult<Self> {
        let (sender, receiver) = bounded::<Job>(queue_capacity);
        let mut pool = Self {
            sender: Some(sender),
            handles: Vec::with_capacity(size.get()),
            submitted: 0,
            completed: Arc::clone(&ctx.completed),
        };

        for id in 0..size.get() {
            let name = format!("treescan-worker-{}", id);
            let worker = Worker::new(id, ctx.clone());
            let jobs = receiver.clone();
            match thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker.run(jobs))
            {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    // Dropping the pool joins the workers already running
                    return Err(ScanError::worker_spawn(name, e));
                }
            }
        }

        debug!(
            "Started {} workers with a queue of {} jobs",
            size, queue_capacity
        );
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Queues a job, blocking while the queue is full.
    ///
    /// Hands the job back if no worker is left to receive it.
    pub fn submit(&mut self, job: Job) -> Result<(), Job> {
        let Some(sender) = &self.sender else {
            return Err(job);
        };
        match sender.send(job) {
            Ok(()) => {
                self.submitted += 1;
                Ok(())
            }
            Err(SendError(job)) => Err(job),
        }
    }

    /// Closes the queue and blocks until every worker has exited.
    ///
    /// Workers drain whatever is still queued before they see the close, so
    /// on return every submitted job has been finished or the worker that
    /// held it panicked.
    pub fn close_and_wait(mut self) -> PoolOutcome {
        self.shutdown()
    }

    fn shutdown(&mut self) -> PoolOutcome {
        drop(self.sender.take());

        let mut panicked = 0;
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!("{} panicked", name);
                panicked += 1;
            }
        }

        let outcome = PoolOutcome {
            submitted: self.submitted,
            completed: self.completed.load(Ordering::Acquire),
            panicked,
        };
        if !outcome.is_clean() {
            warn!(
                "Worker pool finished {} of {} jobs ({} workers panicked)",
                outcome.completed, outcome.submitted, outcome.panicked
            );
        }
        outcome
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{MatchRecord, ScanCounters};
    use crate::search::deadline::DeadlineGuard;
    use crate::search::matcher::CompiledPattern;
    use crate::search::worker::FileOpener;
    use crossbeam_channel::unbounded;
    use std::io::{self, Cursor, Read};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    struct MemoryOpener;

    impl FileOpener for MemoryOpener {
        fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
            if path.ends_with("missing.txt") {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            Ok(Box::new(Cursor::new(b"foo\nbar\nfoo bar\n".to_vec())))
        }
    }

    fn context(results: Sender<MatchRecord>, guard: &DeadlineGuard) -> (WorkerContext, Arc<ScanCounters>) {
        let counters = Arc::new(ScanCounters::new());
        let ctx = WorkerContext::new(
            results,
            Arc::clone(&counters),
            guard.signal(),
            Arc::new(MemoryOpener),
        );
        (ctx, counters)
    }

    fn job(name: &str, pattern: &Arc<CompiledPattern>) -> Job {
        Job {
            path: PathBuf::from(name),
            pattern: Arc::clone(pattern),
        }
    }

    #[test]
    fn test_pool_processes_every_job() {
        let (tx, rx) = unbounded();
        let guard = DeadlineGuard::after(Duration::from_secs(60));
        let (ctx, counters) = context(tx, &guard);
        let pattern = Arc::new(CompiledPattern::new("foo").unwrap());

        let mut pool = WorkerPool::start(NonZeroUsize::new(3).unwrap(), 2, ctx).unwrap();
        assert_eq!(pool.size(), 3);
        for i in 0..20 {
            pool.submit(job(&format!("f{}.txt", i), &pattern)).unwrap();
        }
        let outcome = pool.close_and_wait();

        assert!(outcome.is_clean());
        assert_eq!(outcome.submitted, 20);
        assert_eq!(outcome.completed, 20);

        let records: Vec<_> = rx.try_iter().collect();
        assert_eq!(records.len(), 40);
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.files_scanned, 20);
        assert_eq!(snapshot.matches_found, 40);
    }

    #[test]
    fn test_open_failure_does_not_stop_pool() {
        let (tx, rx) = unbounded();
        let guard = DeadlineGuard::after(Duration::from_secs(60));
        let (ctx, counters) = context(tx, &guard);
        let pattern = Arc::new(CompiledPattern::new("foo").unwrap());

        let mut pool = WorkerPool::start(NonZeroUsize::new(2).unwrap(), 4, ctx).unwrap();
        pool.submit(job("missing.txt", &pattern)).unwrap();
        pool.submit(job("present.txt", &pattern)).unwrap();
        let outcome = pool.close_and_wait();

        assert!(outcome.is_clean());
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.files_scanned, 1);
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_cancelled_pool_skips_queued_jobs() {
        let (tx, rx) = unbounded();
        let guard = DeadlineGuard::after(Duration::from_secs(60));
        guard.signal().cancel();
        let (ctx, counters) = context(tx, &guard);
        let pattern = Arc::new(CompiledPattern::new("foo").unwrap());

        let mut pool = WorkerPool::start(NonZeroUsize::new(2).unwrap(), 8, ctx).unwrap();
        for i in 0..5 {
            pool.submit(job(&format!("f{}.txt", i), &pattern)).unwrap();
        }
        let outcome = pool.close_and_wait();

        assert_eq!(outcome.completed, 5);
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.files_skipped, 5);
        assert_eq!(snapshot.files_scanned, 0);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_dropping_pool_joins_workers() {
        let (tx, rx) = unbounded();
        let guard = DeadlineGuard::after(Duration::from_secs(60));
        let (ctx, _counters) = context(tx, &guard);
        let pattern = Arc::new(CompiledPattern::new("foo").unwrap());

        let mut pool = WorkerPool::start(NonZeroUsize::new(2).unwrap(), 1, ctx).unwrap();
        pool.submit(job("a.txt", &pattern)).unwrap();
        drop(pool);

        // Every worker held a result sender; all are gone once joined
        assert_eq!(rx.iter().count(), 2);
    }
}
