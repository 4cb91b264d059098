//! Decides which parts of the tree a scan visits.
//!
//! The walker hands every entry to a [`PathFilter`] as an [`EntryInfo`]: a
//! plain snapshot of the name, kind and device of the entry. Keeping the
//! filter a pure function of that snapshot means the pruning rules can be
//! exercised without building a real directory tree, mounts included.
use glob::Pattern;
use std::fs::{FileType, Metadata};
use std::path::{Path, PathBuf};

use crate::config::ScanOptions;
use crate::errors::{ScanError, ScanResult};

/// Version-control metadata directories, never listed
const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn", ".bzr", "_darcs", "CVS"];

/// What the walker should do with a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descent {
    /// Enter the directory and list its children
    Descend,
    /// Drop the directory and everything below it
    Prune,
    /// Not a directory; nothing to descend into
    Skip,
}

/// Device identifier of the scan root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceScope {
    pub root_device_id: Option<u64>,
}

impl DeviceScope {
    pub fn new(root_device_id: Option<u64>) -> Self {
        Self { root_device_id }
    }

    /// Captures the device of the root directory
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self::new(device_id(meta))
    }

    /// True unless both ids are known and differ
    pub fn contains(&self, device: Option<u64>) -> bool {
        match (self.root_device_id, device) {
            (Some(root), Some(dev)) => root == dev,
            _ => true,
        }
    }
}

/// Filesystem device of an entry, where the platform exposes one
pub fn device_id(meta: &Metadata) -> Option<u64> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Some(meta.dev())
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        None
    }
}

/// Snapshot of one directory entry, taken without following symlinks
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub path: PathBuf,
    pub is_dir: bool,
    pub is_file: bool,
    pub is_symlink: bool,
    /// Whether a symlink resolves to a regular file
    pub symlink_to_file: bool,
    /// `None` when metadata could not be read
    pub device: Option<u64>,
    pub metadata_error: bool,
}

impl EntryInfo {
    /// Builds the snapshot from `lstat`-style metadata
    pub fn from_metadata(path: impl Into<PathBuf>, meta: &Metadata) -> Self {
        Self {
            device: device_id(meta),
            ..Self::from_file_type(path, meta.file_type())
        }
    }

    /// Snapshot from the file type alone; symlink targets are left unresolved
    pub fn from_file_type(path: impl Into<PathBuf>, file_type: FileType) -> Self {
        Self {
            path: path.into(),
            is_dir: file_type.is_dir(),
            is_file: file_type.is_file(),
            is_symlink: file_type.is_symlink(),
            symlink_to_file: false,
            device: None,
            metadata_error: false,
        }
    }

    /// Follows a symlink with `stat` to see whether it points at a regular file
    pub fn resolve_symlink(mut self) -> Self {
        if self.is_symlink {
            self.symlink_to_file = std::fs::metadata(&self.path)
                .map(|target| target.is_file())
                .unwrap_or(false);
        }
        self
    }

    /// Snapshot for an entry whose metadata could not be read
    pub fn unreadable(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            is_dir,
            is_file: false,
            is_symlink: false,
            symlink_to_file: false,
            device: None,
            metadata_error: true,
        }
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Pruning and acceptance rules for one scan
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    scope: DeviceScope,
    exclude_dirs: Vec<String>,
    follow_symlink_files: bool,
    file_extensions: Option<Vec<String>>,
    include_globs: Vec<Pattern>,
}

impl PathFilter {
    pub fn new(root: impl Into<PathBuf>, scope: DeviceScope) -> Self {
        Self {
            root: root.into(),
            scope,
            exclude_dirs: Vec::new(),
            follow_symlink_files: false,
            file_extensions: None,
            include_globs: Vec::new(),
        }
    }

    /// Builds the filter from scan options, compiling any include globs
    pub fn from_options(
        root: impl Into<PathBuf>,
        scope: DeviceScope,
        options: &ScanOptions,
    ) -> ScanResult<Self> {
        let include_globs = options
            .include_globs
            .iter()
            .map(|g| {
                Pattern::new(g)
                    .map_err(|e| ScanError::config_error(format!("invalid glob '{}': {}", g, e)))
            })
            .collect::<ScanResult<Vec<_>>>()?;

        Ok(Self {
            exclude_dirs: options.exclude_dirs.clone(),
            follow_symlink_files: options.follow_symlink_files,
            file_extensions: options.file_extensions.clone(),
            include_globs,
            ..Self::new(root, scope)
        })
    }

    pub fn with_exclude_dirs(mut self, exclude_dirs: Vec<String>) -> Self {
        self.exclude_dirs = exclude_dirs;
        self
    }

    pub fn with_follow_symlink_files(mut self, follow: bool) -> Self {
        self.follow_symlink_files = follow;
        self
    }

    /// Snapshot of a walked non-directory. Symlink targets are only looked
    /// up when symlinked files can be scanned at all.
    pub fn entry_info(&self, path: &Path, file_type: FileType) -> EntryInfo {
        let info = EntryInfo::from_file_type(path, file_type);
        if self.follow_symlink_files {
            info.resolve_symlink()
        } else {
            info
        }
    }

    /// Decides whether the walker enters an entry
    pub fn should_descend(&self, entry: &EntryInfo) -> Descent {
        if entry.is_symlink {
            // Directory links are never followed; file links go to should_process
            return Descent::Skip;
        }
        if !entry.is_dir {
            return Descent::Skip;
        }
        if entry.metadata_error {
            return Descent::Prune;
        }

        let name = entry.name();
        if VCS_DIRS.contains(&name.as_str()) {
            return Descent::Prune;
        }
        if self
            .exclude_dirs
            .iter()
            .any(|fragment| !fragment.is_empty() && name.contains(fragment.as_str()))
        {
            return Descent::Prune;
        }
        if !self.scope.contains(entry.device) {
            return Descent::Prune;
        }
        Descent::Descend
    }

    /// Decides whether a non-directory entry becomes a scan job
    pub fn should_process(&self, entry: &EntryInfo) -> bool {
        let accepted_kind = if entry.is_symlink {
            self.follow_symlink_files && entry.symlink_to_file
        } else {
            entry.is_file
        };
        accepted_kind
            && has_valid_extension(&entry.path, &self.file_extensions)
            && self.matches_globs(&entry.path)
    }

    fn matches_globs(&self, path: &Path) -> bool {
        if self.include_globs.is_empty() {
            return true;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let normalized = relative.to_string_lossy().replace('\\', "/");
        self.include_globs.iter().any(|p| p.matches(&normalized))
    }
}

/// Checks if a file should be included in the scan based on its extension
pub fn has_valid_extension(path: &Path, extensions: &Option<Vec<String>>) -> bool {
    match extensions {
        None => true,
        Some(exts) => path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| exts.iter().any(|e| e.eq_ignore_ascii_case(ext))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(path: &str, device: u64) -> EntryInfo {
        EntryInfo {
            path: PathBuf::from(path),
            is_dir: true,
            is_file: false,
            is_symlink: false,
            symlink_to_file: false,
            device: Some(device),
            metadata_error: false,
        }
    }

    fn file(path: &str) -> EntryInfo {
        EntryInfo {
            path: PathBuf::from(path),
            is_dir: false,
            is_file: true,
            is_symlink: false,
            symlink_to_file: false,
            device: Some(1),
            metadata_error: false,
        }
    }

    fn file_link(path: &str) -> EntryInfo {
        EntryInfo {
            is_file: false,
            is_symlink: true,
            symlink_to_file: true,
            ..file(path)
        }
    }

    fn filter() -> PathFilter {
        PathFilter::new("/root", DeviceScope::new(Some(1)))
            .with_exclude_dirs(vec!["node_modules".to_string(), "cache".to_string()])
    }

    #[test]
    fn test_vcs_directories_pruned() {
        let filter = filter();
        assert_eq!(filter.should_descend(&dir("/root/.git", 1)), Descent::Prune);
        assert_eq!(filter.should_descend(&dir("/root/a/.hg", 1)), Descent::Prune);
        assert_eq!(filter.should_descend(&dir("/root/.svn", 1)), Descent::Prune);
        assert_eq!(filter.should_descend(&dir("/root/.github", 1)), Descent::Descend);
        assert_eq!(filter.should_descend(&dir("/root/src", 1)), Descent::Descend);
    }

    #[test]
    fn test_excluded_substrings_pruned() {
        let filter = filter();
        assert_eq!(
            filter.should_descend(&dir("/root/web/node_modules", 1)),
            Descent::Prune
        );
        assert_eq!(filter.should_descend(&dir("/root/.cache", 1)), Descent::Prune);
        assert_eq!(filter.should_descend(&dir("/root/pip-cache-x", 1)), Descent::Prune);
        assert_eq!(filter.should_descend(&dir("/root/node", 1)), Descent::Descend);
    }

    #[test]
    fn test_empty_fragment_prunes_nothing() {
        let filter = filter().with_exclude_dirs(vec![String::new()]);
        assert_eq!(filter.should_descend(&dir("/root/src", 1)), Descent::Descend);
    }

    #[test]
    fn test_foreign_device_pruned() {
        let filter = filter();
        assert_eq!(filter.should_descend(&dir("/root/mnt", 2)), Descent::Prune);
        assert_eq!(filter.should_descend(&dir("/root/local", 1)), Descent::Descend);

        let unknown_root = PathFilter::new("/root", DeviceScope::new(None));
        assert_eq!(unknown_root.should_descend(&dir("/root/mnt", 2)), Descent::Descend);
    }

    #[test]
    fn test_symlinked_directories_never_followed() {
        let mut link = dir("/root/link", 1);
        link.is_dir = false;
        link.is_symlink = true;
        assert_eq!(filter().should_descend(&link), Descent::Skip);
        assert!(!filter().should_process(&link));
    }

    #[test]
    fn test_unreadable_directory_pruned() {
        let entry = EntryInfo::unreadable("/root/locked", true);
        assert_eq!(filter().should_descend(&entry), Descent::Prune);
    }

    #[test]
    fn test_files_are_skipped_for_descent() {
        assert_eq!(filter().should_descend(&file("/root/a.txt")), Descent::Skip);
    }

    #[test]
    fn test_should_process_regular_files() {
        let filter = filter();
        assert!(filter.should_process(&file("/root/a.txt")));
        assert!(filter.should_process(&file("/root/blob.bin")));
        assert!(!filter.should_process(&dir("/root/src", 1)));
    }

    #[test]
    fn test_symlinked_files_follow_configuration() {
        let link = file_link("/root/alias.txt");
        assert!(!filter().should_process(&link));
        assert!(filter().with_follow_symlink_files(true).should_process(&link));

        let mut dangling = link.clone();
        dangling.symlink_to_file = false;
        assert!(!filter().with_follow_symlink_files(true).should_process(&dangling));
    }

    #[test]
    fn test_extension_and_glob_predicates() {
        let options = ScanOptions {
            file_extensions: Some(vec!["rs".to_string()]),
            include_globs: vec!["src/**".to_string()],
            ..ScanOptions::default()
        };
        let filter = PathFilter::from_options("/root", DeviceScope::new(None), &options).unwrap();
        assert!(filter.should_process(&file("/root/src/main.RS")));
        assert!(!filter.should_process(&file("/root/src/main.py")));
        assert!(!filter.should_process(&file("/root/tests/main.rs")));
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let options = ScanOptions {
            include_globs: vec!["[".to_string()],
            ..ScanOptions::default()
        };
        let result = PathFilter::from_options("/root", DeviceScope::new(None), &options);
        assert!(matches!(result, Err(ScanError::ConfigError(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_target_resolved_only_when_followed() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("target.txt");
        std::fs::write(&target, "x")?;
        let link = dir.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link)?;
        let file_type = std::fs::symlink_metadata(&link)?.file_type();

        let ignored = filter().entry_info(&link, file_type);
        assert!(ignored.is_symlink);
        assert!(!ignored.symlink_to_file);

        let followed = filter()
            .with_follow_symlink_files(true)
            .entry_info(&link, file_type);
        assert!(followed.symlink_to_file);

        std::fs::remove_file(&target)?;
        let dangling = filter()
            .with_follow_symlink_files(true)
            .entry_info(&link, file_type);
        assert!(!dangling.symlink_to_file);
        Ok(())
    }

    #[test]
    fn test_has_valid_extension() {
        let extensions = Some(vec!["rs".to_string()]);
        assert!(has_valid_extension(Path::new("test.rs"), &extensions));
        assert!(has_valid_extension(Path::new("test.RS"), &extensions));
        assert!(!has_valid_extension(Path::new("test.py"), &extensions));
        assert!(!has_valid_extension(Path::new("test"), &extensions));
        assert!(has_valid_extension(Path::new("test.rs"), &None));
    }
}
