//! Removable-device discovery and library sync
//!
//! A device qualifies as a sync target when its mount root contains a
//! `Music` directory (any capitalization). Discovery is deliberately dumb:
//! on Linux the candidates are whatever is mounted under the conventional
//! removable-media prefixes, on macOS everything in `/Volumes`. There is no
//! udev/DiskArbitration integration; a mount that looks like a music player
//! is treated as one, and the per-device confirmation prompt is the real
//! safety net.

use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A mounted device carrying a music directory at its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicDevice {
    /// Mount point of the device.
    pub mount: PathBuf,
    /// The `Music` directory found at the mount root.
    pub music_dir: PathBuf,
}

/// Find every mounted removable device exposing a music directory.
pub fn removable_music_mounts() -> Vec<MusicDevice> {
    candidate_mounts()
        .into_iter()
        .filter_map(|mount| {
            music_dir_at(&mount).map(|music_dir| MusicDevice { mount, music_dir })
        })
        .collect()
}

#[cfg(target_os = "macos")]
fn candidate_mounts() -> Vec<PathBuf> {
    let entries = match fs::read_dir("/Volumes") {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.file_name().map(|n| n != "Macintosh HD").unwrap_or(false))
        .collect()
}

#[cfg(not(target_os = "macos"))]
fn candidate_mounts() -> Vec<PathBuf> {
    let mounts = match fs::read_to_string("/proc/mounts") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    parse_proc_mounts(&mounts)
}

/// Pull removable-looking mount points out of `/proc/mounts` content.
///
/// The second whitespace-separated field is the mount point, with spaces and
/// other separators octal-escaped.
#[cfg(any(not(target_os = "macos"), test))]
fn parse_proc_mounts(content: &str) -> Vec<PathBuf> {
    const PREFIXES: [&str; 3] = ["/media/", "/run/media/", "/mnt/"];

    content
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(unescape_mount_path)
        .filter(|p| PREFIXES.iter().any(|prefix| p.starts_with(prefix)))
        .map(PathBuf::from)
        .collect()
}

/// Decode the octal escapes `/proc/mounts` uses (`\040` space, `\011` tab,
/// `\012` newline, `\134` backslash).
///
/// Escapes decode to raw bytes; a non-ASCII device label arrives as one
/// escape per UTF-8 byte, so the bytes are collected first and converted to
/// a string once at the end.
#[cfg(any(not(target_os = "macos"), test))]
fn unescape_mount_path(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).ok();
            if let Some(code) = digits.and_then(|d| u8::from_str_radix(d, 8).ok()) {
                out.push(code);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Look for a `Music` directory (case-insensitive) at the mount root.
fn music_dir_at(mount: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(mount).ok()?;
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let matches = name
            .to_str()
            .map(|n| n.eq_ignore_ascii_case("music"))
            .unwrap_or(false);
        if matches && entry.path().is_dir() {
            return Some(entry.path());
        }
    }
    None
}

/// Recursively copy `src` into `dst`, preserving modification times.
///
/// Returns the number of files copied. Directory structure is mirrored;
/// existing files at the destination are overwritten.
pub fn copy_tree(src: &Path, dst: &Path, quiet: bool) -> io::Result<u64> {
    let files: Vec<PathBuf> = WalkDir::new(src)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();

    let pb = if !quiet && files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut copied = 0u64;
    for file in &files {
        let relative = file
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = dst.join(relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(file, &target)?;
        copy_mtime(file, &target)?;

        copied += 1;
        if let Some(ref pb) = pb {
            pb.inc(1);
            pb.set_message(relative.display().to_string());
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    Ok(copied)
}

fn copy_mtime(from: &Path, to: &Path) -> io::Result<()> {
    let mtime = fs::metadata(from)?.modified()?;
    File::options().write(true).open(to)?.set_modified(mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap().write_all(content).unwrap();
    }

    #[test]
    fn test_parse_proc_mounts_filters_prefixes() {
        let content = "\
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
tmpfs /tmp tmpfs rw 0 0
/dev/sda1 /media/usb0 vfat rw,nosuid 0 0
/dev/sdb1 /run/media/alex/WALKMAN vfat rw 0 0
/dev/sdc1 /mnt/backup ext4 rw 0 0
";
        let mounts = parse_proc_mounts(content);
        assert_eq!(
            mounts,
            vec![
                PathBuf::from("/media/usb0"),
                PathBuf::from("/run/media/alex/WALKMAN"),
                PathBuf::from("/mnt/backup"),
            ]
        );
    }

    #[test]
    fn test_parse_proc_mounts_unescapes_spaces() {
        let content = "/dev/sda1 /media/My\\040Player vfat rw 0 0\n";
        let mounts = parse_proc_mounts(content);
        assert_eq!(mounts, vec![PathBuf::from("/media/My Player")]);
    }

    #[test]
    fn test_unescape_passthrough() {
        assert_eq!(unescape_mount_path("/media/usb"), "/media/usb");
        assert_eq!(unescape_mount_path("/media/a\\134b"), "/media/a\\b");
        // Truncated escape stays literal
        assert_eq!(unescape_mount_path("/media/a\\04"), "/media/a\\04");
    }

    #[test]
    fn test_unescape_multibyte_label() {
        // "Café" escapes its é as two octal bytes (0xC3 0xA9)
        assert_eq!(
            unescape_mount_path("/media/Caf\\303\\251"),
            "/media/Café"
        );
    }

    #[test]
    fn test_music_dir_at_case_insensitive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("MUSIC")).unwrap();

        let found = music_dir_at(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("MUSIC"));
    }

    #[test]
    fn test_music_dir_at_ignores_files() {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("Music"), b"not a dir");
        assert!(music_dir_at(dir.path()).is_none());
    }

    #[test]
    fn test_copy_tree_mirrors_structure_and_mtimes() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        let file_a = src.path().join("album/track1.m4a");
        let file_b = src.path().join("track2.m4a");
        write_file(&file_a, b"aaaa");
        write_file(&file_b, b"bb");

        let old = SystemTime::now() - Duration::from_secs(86_400);
        File::options()
            .write(true)
            .open(&file_a)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let copied = copy_tree(src.path(), dst.path(), true).unwrap();
        assert_eq!(copied, 2);

        let copy_a = dst.path().join("album/track1.m4a");
        assert_eq!(fs::read(&copy_a).unwrap(), b"aaaa");
        assert_eq!(fs::read(dst.path().join("track2.m4a")).unwrap(), b"bb");

        let src_mtime = fs::metadata(&file_a).unwrap().modified().unwrap();
        let dst_mtime = fs::metadata(&copy_a).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dst_mtime);
    }

    #[test]
    fn test_copy_tree_empty_source() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        assert_eq!(copy_tree(src.path(), dst.path(), true).unwrap(), 0);
    }
}
