use crossbeam_channel::Receiver;
use rayon::prelude::*;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

use crate::errors::{ScanError, ScanResult};
use crate::results::MatchRecord;

/// Drains the result queue on its own thread.
///
/// Records arrive in whatever order workers finish them. Nothing is
/// ordered until [`finish`](Self::finish), which runs only after every
/// sender has been dropped.
pub struct ResultCollector {
    handle: JoinHandle<Vec<MatchRecord>>,
}

impl ResultCollector {
    pub fn start(receiver: Receiver<MatchRecord>) -> ScanResult<Self> {
        let name = "treescan-collector";
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || receiver.iter().collect::<Vec<_>>())
            .map_err(|e| ScanError::worker_spawn(name, e))?;
        Ok(Self { handle })
    }

    /// Waits for the queue to close, then returns the records sorted by
    /// path and line number. Blocks until every result sender is dropped.
    pub fn finish(self) -> Vec<MatchRecord> {
        let mut records = match self.handle.join() {
            Ok(records) => records,
            Err(_) => {
                error!("Result collector panicked; no matches recovered");
                Vec::new()
            }
        };
        debug!("Sorting {} matches", records.len());
        sort_records(&mut records);
        records
    }
}

/// Total order used for every report: path, then line number
pub fn sort_records(records: &mut [MatchRecord]) {
    records.par_sort_unstable();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_collector_sorts_out_of_order_input() {
        let (tx, rx) = bounded(2);
        let collector = ResultCollector::start(rx).unwrap();

        let producers: Vec<_> = ["c.txt", "a.txt", "b.txt"]
            .into_iter()
            .map(|name| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for line in (1..=5).rev() {
                        tx.send(MatchRecord::new(name, line, "x")).unwrap();
                    }
                })
            })
            .collect();
        drop(tx);
        for producer in producers {
            producer.join().unwrap();
        }

        let records = collector.finish();
        assert_eq!(records.len(), 15);
        let mut expected = records.clone();
        expected.sort_by(|a, b| a.path.cmp(&b.path).then(a.line_number.cmp(&b.line_number)));
        assert_eq!(records, expected);
        assert_eq!(records[0], MatchRecord::new("a.txt", 1, "x"));
        assert_eq!(records[14], MatchRecord::new("c.txt", 5, "x"));
    }

    #[test]
    fn test_collector_with_no_results() {
        let (tx, rx) = bounded::<MatchRecord>(1);
        let collector = ResultCollector::start(rx).unwrap();
        drop(tx);
        assert!(collector.finish().is_empty());
    }

    #[test]
    fn test_line_numbers_sort_numerically() {
        let mut records = vec![
            MatchRecord::new("a.txt", 10, "x"),
            MatchRecord::new("a.txt", 9, "x"),
            MatchRecord::new("a.txt", 100, "x"),
        ];
        sort_records(&mut records);
        let lines: Vec<_> = records.iter().map(|r| r.line_number).collect();
        assert_eq!(lines, vec![9, 10, 100]);
    }
}
