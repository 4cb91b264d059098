use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::{num::NonZeroUsize, path::PathBuf, time::Duration};
use tracing_subscriber::EnvFilter;
use treescan::{scan, CaseMode, ScanOptions, ScanOverrides, ScanReport};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Pattern to search for (regular expression unless --fixed-strings)
    pattern: String,

    /// Root directory to scan
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Give up after this long, e.g. 30s or 5m
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Prune directories whose name contains this text (repeatable)
    #[arg(long = "exclude-dir")]
    exclude_dirs: Vec<String>,

    /// Scan regular files reached through symlinks
    #[arg(long)]
    follow_symlink_files: bool,

    /// File extensions to include (e.g. rs,go,js)
    #[arg(short = 'e', long)]
    extensions: Option<String>,

    /// Only scan files whose path below the root matches this glob (repeatable)
    #[arg(short = 'g', long = "glob")]
    globs: Vec<String>,

    /// Treat the pattern as a literal string
    #[arg(short = 'F', long)]
    fixed_strings: bool,

    /// Match case exactly
    #[arg(short = 's', long, conflicts_with = "ignore_case")]
    case_sensitive: bool,

    /// Ignore case
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Honor .gitignore and .ignore files
    #[arg(long)]
    respect_ignore: bool,

    /// Maximum directory depth below the root
    #[arg(long)]
    max_depth: Option<usize>,

    /// Show only statistics, not matches
    #[arg(long)]
    stats: bool,

    /// Print the report as JSON
    #[arg(long, conflicts_with = "stats")]
    json: bool,

    /// Configuration file to load on top of the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ScanOverrides {
        let case_mode = if self.case_sensitive {
            Some(CaseMode::Sensitive)
        } else if self.ignore_case {
            Some(CaseMode::Insensitive)
        } else {
            None
        };

        ScanOverrides {
            worker_count: self.threads,
            timeout: self.timeout,
            exclude_dirs: (!self.exclude_dirs.is_empty()).then(|| self.exclude_dirs.clone()),
            follow_symlink_files: self.follow_symlink_files,
            case_mode,
            literal: self.fixed_strings,
            file_extensions: self.extensions.as_ref().map(|e| {
                e.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
            include_globs: self.globs.clone(),
            respect_ignore_files: self.respect_ignore,
            max_depth: self.max_depth,
            log_level: self.log_level.clone(),
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let options = ScanOptions::load_from(cli.config.as_deref())
        .context("failed to load configuration")?
        .merge_with_cli(cli.overrides());
    init_logging(&options.log_level);

    let report = scan(&cli.root, &cli.pattern, &options)
        .with_context(|| format!("cannot scan {}", cli.root.display()))?;

    if cli.json {
        println!("{}", report.to_json_pretty()?);
    } else {
        print_report(&report, cli.stats);
    }
    Ok(())
}

fn print_report(report: &ScanReport, stats_only: bool) {
    if !stats_only {
        for m in &report.matches {
            println!(
                "{}:{}:{}",
                m.path.display().to_string().blue(),
                m.line_number.to_string().green(),
                m.line_text
            );
        }
        println!();
    }

    println!(
        "Found {} matches in {} files ({} files scanned) in {:.2?}",
        report.matches_found,
        report.files_with_matches(),
        report.files_scanned,
        report.elapsed
    );
    if report.errors > 0 {
        println!("{}", format!("{} entries could not be read", report.errors).yellow());
    }
    if !report.complete {
        eprintln!(
            "{}",
            "warning: scan stopped early; results are incomplete".yellow()
        );
    }
}
