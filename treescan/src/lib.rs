pub mod config;
pub mod errors;
pub mod filters;
pub mod results;
pub mod search;

pub use config::{CaseMode, ScanOptions, ScanOverrides};
pub use errors::{ScanError, ScanResult};
pub use results::{AbortReason, MatchRecord, ScanReport};
pub use search::{scan, Scanner};
