use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Stand-in deadline when the timeout does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Wall-clock budget for one scan
#[derive(Debug, Clone)]
pub struct DeadlineGuard {
    signal: CancelSignal,
}

impl DeadlineGuard {
    pub fn new(deadline: Instant) -> Self {
        Self {
            signal: CancelSignal {
                deadline,
                cancelled: Arc::new(AtomicBool::new(false)),
            },
        }
    }

    /// A guard expiring `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self::new(
            now.checked_add(timeout)
                .or_else(|| now.checked_add(FAR_FUTURE))
                .unwrap_or(now),
        )
    }

    /// Handle checked by the walker and the workers
    pub fn signal(&self) -> CancelSignal {
        self.signal.clone()
    }
}

/// Cooperative cancellation flag.
///
/// Checked at safe points only: before a job is submitted and before a
/// worker opens a file. Reads already in progress always finish.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    deadline: Instant,
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    /// True once the deadline has passed or [`cancel`](Self::cancel) was called.
    /// Latches: stays true after the first expiry is seen.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        if Instant::now() >= self.deadline {
            if !self.cancelled.swap(true, Ordering::AcqRel) {
                debug!("Scan deadline reached");
            }
            return true;
        }
        false
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
