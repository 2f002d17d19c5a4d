//! Conversion task model and source-tree discovery
//!
//! A [`ConversionTask`] ties one FLAC source file to its prospective M4A
//! destination. The destination is a pure function of the source path and the
//! two root directories: the path relative to the source root is mirrored
//! under the destination root with the extension swapped. No task ever
//! influences another task's destination.
//!
//! # Freshness
//!
//! A destination is "fresh" when it exists and its last-modified time is
//! strictly newer than the source's. This is the only durable state the tool
//! reasons about between runs. The comparison is strict with no tolerance
//! window, so filesystems with coarse or skewed mtime resolution can
//! misclassify a file that was converted within the same clock tick; the
//! remedy is simply re-running, which overwrites the destination.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Extension of the lossless sources this tool looks for.
pub const SOURCE_EXT: &str = "flac";

/// Extension of the compressed output container.
pub const TARGET_EXT: &str = "m4a";

/// One discovered source file and its computed destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTask {
    /// Absolute (or as-given) path to the FLAC source.
    pub source: PathBuf,
    /// Source path relative to the source root.
    pub relative: PathBuf,
    /// Mirrored destination path with the target extension.
    pub dest: PathBuf,
}

impl ConversionTask {
    /// Build a task for `source`, which must live under `source_root`.
    ///
    /// Returns `None` if `source` is not inside `source_root`.
    pub fn resolve(source_root: &Path, dest_root: &Path, source: &Path) -> Option<Self> {
        let relative = source.strip_prefix(source_root).ok()?.to_path_buf();
        let dest = dest_root.join(&relative).with_extension(TARGET_EXT);
        Some(Self {
            source: source.to_path_buf(),
            relative,
            dest,
        })
    }

    /// Directory the destination file lands in.
    pub fn dest_dir(&self) -> &Path {
        self.dest.parent().unwrap_or_else(|| Path::new(""))
    }

    /// True when the destination exists and is strictly newer than the source.
    pub fn is_fresh(&self) -> bool {
        match (mtime(&self.dest), mtime(&self.source)) {
            (Some(dest), Some(source)) => dest > source,
            _ => false,
        }
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Enumerate every `*.flac` file under `source_root`, recursively.
///
/// Extension matching is case-insensitive. Order is whatever the directory
/// walk yields; tasks are independent so order carries no meaning.
pub fn discover(source_root: &Path, dest_root: &Path) -> Vec<ConversionTask> {
    WalkDir::new(source_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(SOURCE_EXT))
                .unwrap_or(false)
        })
        .filter_map(|e| ConversionTask::resolve(source_root, dest_root, e.path()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap().write_all(b"x").unwrap();
    }

    fn set_mtime(path: &Path, when: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    #[test]
    fn test_destination_mirrors_relative_path() {
        let task = ConversionTask::resolve(
            Path::new("/music/flac"),
            Path::new("/music/m4a"),
            Path::new("/music/flac/album/track1.flac"),
        )
        .unwrap();

        assert_eq!(task.relative, Path::new("album/track1.flac"));
        assert_eq!(task.dest, Path::new("/music/m4a/album/track1.m4a"));
        assert_eq!(task.dest_dir(), Path::new("/music/m4a/album"));
    }

    #[test]
    fn test_resolve_rejects_path_outside_root() {
        let task = ConversionTask::resolve(
            Path::new("/music/flac"),
            Path::new("/music/m4a"),
            Path::new("/elsewhere/track.flac"),
        );
        assert!(task.is_none());
    }

    #[test]
    fn test_missing_destination_is_not_fresh() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.flac");
        touch(&src);

        let task =
            ConversionTask::resolve(dir.path(), &dir.path().join("out"), &src).unwrap();
        assert!(!task.is_fresh());
    }

    #[test]
    fn test_newer_destination_is_fresh() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.flac");
        let dst = dir.path().join("out").join("a.m4a");
        touch(&src);
        touch(&dst);

        // Source well in the past, destination at "now".
        set_mtime(&src, SystemTime::now() - Duration::from_secs(3600));

        let task =
            ConversionTask::resolve(dir.path(), &dir.path().join("out"), &src).unwrap();
        assert!(task.is_fresh());
    }

    #[test]
    fn test_older_destination_is_stale() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.flac");
        let dst = dir.path().join("out").join("a.m4a");
        touch(&src);
        touch(&dst);

        set_mtime(&dst, SystemTime::now() - Duration::from_secs(3600));

        let task =
            ConversionTask::resolve(dir.path(), &dir.path().join("out"), &src).unwrap();
        assert!(!task.is_fresh());
    }

    #[test]
    fn test_discover_finds_flac_recursively() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("one.flac"));
        touch(&dir.path().join("album/two.FLAC"));
        touch(&dir.path().join("album/cover.jpg"));
        touch(&dir.path().join("notes.txt"));

        let tasks = discover(dir.path(), &dir.path().join("out"));
        let mut names: Vec<_> = tasks
            .iter()
            .map(|t| t.relative.to_string_lossy().into_owned())
            .collect();
        names.sort();

        assert_eq!(names, vec!["album/two.FLAC", "one.flac"]);
    }

    #[test]
    fn test_discover_empty_tree() {
        let dir = TempDir::new().unwrap();
        assert!(discover(dir.path(), &dir.path().join("out")).is_empty());
    }
}
