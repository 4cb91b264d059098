use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ScanError, ScanResult};

/// Directory-name fragments pruned from every walk unless overridden.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &["node_modules", "__pycache__", ".cache", ".vagrant"];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How letter case is treated when matching lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseMode {
    /// Case-sensitive only if the pattern contains an upper-case character
    #[default]
    Smart,
    Sensitive,
    Insensitive,
}

/// Options for a single scan.
///
/// # Configuration Locations
///
/// Options can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.treescan.yaml` in the current directory
/// 3. Global `$HOME/.config/treescan/config.yaml`
///
/// # Configuration Format
///
/// ```yaml
/// # Worker threads (default: twice the CPU count)
/// worker_count: 8
///
/// # Wall-clock budget for the whole scan
/// timeout: "2m"
///
/// # Directory-name fragments to prune
/// exclude_dirs:
///   - "node_modules"
///   - "target"
///
/// # Scan regular files reached through symlinks
/// follow_symlink_files: false
///
/// # smart | sensitive | insensitive
/// case_mode: "smart"
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
///
/// Command-line flags take precedence over file values, see
/// [`ScanOptions::merge_with_cli`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Number of worker threads, which is also the cap on open files
    pub worker_count: NonZeroUsize,

    /// Scan budget; once spent no new files are started
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// Directories whose name contains any of these fragments are pruned
    pub exclude_dirs: Vec<String>,

    /// Whether symlinks to regular files are scanned (directory links never are)
    pub follow_symlink_files: bool,

    /// Capacity of the job queue between the walker and the workers
    pub queue_capacity: usize,

    /// Capacity of the result queue between the workers and the collector
    pub result_capacity: usize,

    pub case_mode: CaseMode,

    /// Treat the pattern as a fixed string instead of a regular expression
    pub literal: bool,

    /// Optional list of file extensions to include (e.g., ["rs", "toml"])
    /// If None, all file extensions are included
    pub file_extensions: Option<Vec<String>>,

    /// Glob patterns a file's root-relative path must match, if any are given
    pub include_globs: Vec<String>,

    /// Honor .gitignore and .ignore files while walking
    pub respect_ignore_files: bool,

    /// Maximum directory depth below the root
    pub max_depth: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

pub fn default_worker_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get().max(1) * 2).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ScanOptions {
    fn default() -> Self {
        let worker_count = default_worker_count();
        Self {
            worker_count,
            timeout: DEFAULT_TIMEOUT,
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            follow_symlink_files: false,
            queue_capacity: worker_count.get() * 4,
            result_capacity: 1024,
            case_mode: CaseMode::Smart,
            literal: false,
            file_extensions: None,
            include_globs: Vec::new(),
            respect_ignore_files: false,
            max_depth: None,
            log_level: default_log_level(),
        }
    }
}

/// Values given on the command line; `None` leaves the file value alone
#[derive(Debug, Clone, Default)]
pub struct ScanOverrides {
    pub worker_count: Option<NonZeroUsize>,
    pub timeout: Option<Duration>,
    pub exclude_dirs: Option<Vec<String>>,
    pub follow_symlink_files: bool,
    pub case_mode: Option<CaseMode>,
    pub literal: bool,
    pub file_extensions: Option<Vec<String>>,
    pub include_globs: Vec<String>,
    pub respect_ignore_files: bool,
    pub max_depth: Option<usize>,
    pub log_level: Option<String>,
}

impl ScanOptions {
    /// Loads options from the default locations plus a specific file
    pub fn load_from(config_path: Option<&Path>) -> ScanResult<Self> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ScanError::config_error(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("treescan/config.yaml")),
            Some(PathBuf::from(".treescan.yaml")),
            config_path.map(PathBuf::from),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        let options: ScanOptions = builder.build()?.try_deserialize()?;
        Ok(options)
    }

    /// Merges command-line values over file values
    pub fn merge_with_cli(mut self, cli: ScanOverrides) -> Self {
        if let Some(workers) = cli.worker_count {
            self.worker_count = workers;
            self.queue_capacity = workers.get() * 4;
        }
        if let Some(timeout) = cli.timeout {
            self.timeout = timeout;
        }
        if let Some(exclude_dirs) = cli.exclude_dirs {
            self.exclude_dirs = exclude_dirs;
        }
        if cli.follow_symlink_files {
            self.follow_symlink_files = true;
        }
        if let Some(case_mode) = cli.case_mode {
            self.case_mode = case_mode;
        }
        if cli.literal {
            self.literal = true;
        }
        if cli.file_extensions.is_some() {
            self.file_extensions = cli.file_extensions;
        }
        if !cli.include_globs.is_empty() {
            self.include_globs = cli.include_globs;
        }
        if cli.respect_ignore_files {
            self.respect_ignore_files = true;
        }
        if cli.max_depth.is_some() {
            self.max_depth = cli.max_depth;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
