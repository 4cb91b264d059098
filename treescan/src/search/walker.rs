use ignore::{DirEntry, WalkBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::deadline::CancelSignal;
use super::matcher::CompiledPattern;
use super::pool::WorkerPool;
use super::worker::Job;
use crate::config::ScanOptions;
use crate::filters::{Descent, EntryInfo, PathFilter};
use crate::results::ScanCounters;

/// Why a walk stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Every reachable entry was visited
    Finished,
    /// The deadline passed; no further jobs were submitted
    DeadlineExceeded,
    /// The job sink stopped accepting work
    SinkClosed,
}

/// Single depth-first pass over the tree below a root
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
    filter: Arc<PathFilter>,
    respect_ignore_files: bool,
    max_depth: Option<usize>,
}

impl TreeWalker {
    pub fn new(root: impl Into<PathBuf>, filter: PathFilter) -> Self {
        Self {
            root: root.into(),
            filter: Arc::new(filter),
            respect_ignore_files: false,
            max_depth: None,
        }
    }

    pub fn from_options(root: impl Into<PathBuf>, filter: PathFilter, options: &ScanOptions) -> Self {
        Self {
            respect_ignore_files: options.respect_ignore_files,
            max_depth: options.max_depth,
            ..Self::new(root, filter)
        }
    }

    /// Walks the tree, submitting one job per accepted file to `pool`
    pub(crate) fn walk(
        &self,
        pool: &mut WorkerPool,
        pattern: &Arc<CompiledPattern>,
        cancel: &CancelSignal,
        counters: &Arc<ScanCounters>,
    ) -> WalkOutcome {
        self.walk_with(cancel, counters, |path| {
            pool.submit(Job {
                path,
                pattern: Arc::clone(pattern),
            })
            .is_ok()
        })
    }

    /// Walks the tree, handing each accepted file path to `submit`.
    ///
    /// `submit` returns false once it can take no more work. Unreadable
    /// directories and entries are logged, counted and skipped.
    pub fn walk_with<F>(&self, cancel: &CancelSignal, counters: &Arc<ScanCounters>, mut submit: F) -> WalkOutcome
    where
        F: FnMut(PathBuf) -> bool,
    {
        debug!("Walking {}", self.root.display());

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(self.respect_ignore_files)
            .hidden(false)
            .follow_links(false)
            .max_depth(self.max_depth);
        if self.respect_ignore_files {
            builder.require_git(false);
        }

        let filter = Arc::clone(&self.filter);
        let prune_counters = Arc::clone(counters);
        builder.filter_entry(move |entry| keep_entry(&filter, &prune_counters, entry));

        let mut submitted = 0usize;
        for result in builder.build() {
            if cancel.is_cancelled() {
                debug!("Walk stopped by deadline after {} jobs", submitted);
                return WalkOutcome::DeadlineExceeded;
            }

            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    counters.record_error();
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                continue;
            }

            let info = self.filter.entry_info(entry.path(), file_type);
            if !self.filter.should_process(&info) {
                trace!("Not scanning {}", entry.path().display());
                continue;
            }

            if !submit(entry.into_path()) {
                debug!("Job sink closed after {} jobs", submitted);
                return WalkOutcome::SinkClosed;
            }
            submitted += 1;
        }

        debug!("Walk finished, {} jobs submitted", submitted);
        WalkOutcome::Finished
    }
}

/// `filter_entry` hook: false drops the entry and, for directories, its subtree
fn keep_entry(filter: &PathFilter, counters: &ScanCounters, entry: &DirEntry) -> bool {
    let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
    if !is_dir {
        return true;
    }

    let info = match entry.metadata() {
        Ok(meta) => EntryInfo::from_metadata(entry.path(), &meta),
        Err(err) => {
            warn!("Pruning {}: cannot read metadata: {}", entry.path().display(), err);
            counters.record_error();
            EntryInfo::unreadable(entry.path(), true)
        }
    };

    match filter.should_descend(&info) {
        Descent::Prune => {
            trace!("Pruned {}", entry.path().display());
            false
        }
        Descent::Descend | Descent::Skip => true,
    }
}
