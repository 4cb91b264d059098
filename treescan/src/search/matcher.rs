use regex::{Regex, RegexBuilder};

use crate::config::CaseMode;
use crate::errors::{ScanError, ScanResult};

/// A pattern compiled once per scan and shared read-only by every worker
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    raw_pattern: String,
    case_sensitive: bool,
    matcher: Regex,
}

impl CompiledPattern {
    /// Compiles `raw` as a regular expression using smart case
    pub fn new(raw: &str) -> ScanResult<Self> {
        Self::with_options(raw, CaseMode::Smart, false)
    }

    /// Compiles `raw`, escaping it first when `literal` is set
    pub fn with_options(raw: &str, case_mode: CaseMode, literal: bool) -> ScanResult<Self> {
        let case_sensitive = match case_mode {
            CaseMode::Smart => has_uppercase(raw),
            CaseMode::Sensitive => true,
            CaseMode::Insensitive => false,
        };

        let source = if literal {
            regex::escape(raw)
        } else {
            raw.to_string()
        };

        let matcher = RegexBuilder::new(&source)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| ScanError::invalid_pattern(e.to_string()))?;

        Ok(Self {
            raw_pattern: raw.to_string(),
            case_sensitive,
            matcher,
        })
    }

    pub fn raw_pattern(&self) -> &str {
        &self.raw_pattern
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

/// Smart case: any upper-case character makes the pattern case-sensitive
pub fn has_uppercase(pattern: &str) -> bool {
    pattern.chars().any(char::is_uppercase)
}

/// Whether a single line matches the pattern
pub fn matches(line: &str, pattern: &CompiledPattern) -> bool {
    pattern.matcher.is_match(line)
}

/// A NUL byte anywhere in a line marks the whole file as binary
pub fn is_binary_line(line: &[u8]) -> bool {
    line.contains(&0)
}
