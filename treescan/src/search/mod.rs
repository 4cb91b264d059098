//! The concurrent scan pipeline.
//!
//! ```text
//! TreeWalker --Job--> WorkerPool (n x Worker) --MatchRecord--> ResultCollector
//!     ^                    ^                                         |
//!     +---- CancelSignal --+                                   sorted Vec
//! ```
//!
//! The walker runs on the calling thread and is the only producer of jobs.
//! Both queues are bounded, so a slow disk or a slow collector pushes back on
//! the walker instead of growing memory. Shutdown is two-phase: the job queue
//! is closed and every worker joined before the result queue can close,
//! which is what lets the collector know it has seen every match.
pub mod collector;
pub mod deadline;
pub mod engine;
pub mod matcher;
pub(crate) mod pool;
pub mod walker;
pub mod worker;

pub use collector::ResultCollector;
pub use deadline::{CancelSignal, DeadlineGuard};
pub use engine::{scan, ScanPhase, Scanner};
pub use matcher::CompiledPattern;
pub use walker::{TreeWalker, WalkOutcome};
pub use worker::{FileOpener, FsOpener, Job};
