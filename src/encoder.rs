//! ffmpeg subprocess protocol
//!
//! All media work is delegated to an external `ffmpeg` binary; this module
//! owns the three invocations the conversion procedure is built from:
//!
//! 1. **extract_cover**: pull the attached-picture stream out of the source
//!    into a standalone JPEG. Best-effort; callers treat failure as "no cover
//!    available", never as a conversion failure.
//! 2. **transcode**: encode the audio stream only into an AAC/M4A file,
//!    carrying over the source's metadata tags and enabling MP4 fast-start.
//!    Failure here is the one hard failure of a task.
//! 3. **remux_with_cover**: stream-copy the transcoded audio together with
//!    the cover as an `attached_pic` stream. No re-encoding happens; failure
//!    means the caller falls back to the cover-less transcode.
//!
//! Each call is synchronous and waited to completion. Success requires both a
//! zero exit status and a non-empty output file; ffmpeg happily exits 0 after
//! writing nothing when a source has no picture stream.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Audio bitrate ffmpeg encodes at, in kbps.
const DEFAULT_BITRATE_KBPS: u32 = 256;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("ffmpeg not found on PATH - install ffmpeg to convert")]
    FfmpegNotFound,

    #[error("ffmpeg exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("ffmpeg produced no output at {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Seam between the driver and the external encoder.
///
/// The driver only ever talks to this trait, so tests can substitute a mock
/// that touches files instead of spawning processes.
pub trait Encoder {
    /// Extract the embedded cover image into `cover_out` (JPEG).
    fn extract_cover(&self, source: &Path, cover_out: &Path) -> Result<(), EncodeError>;

    /// Transcode the audio stream of `source` into `audio_out`.
    fn transcode(&self, source: &Path, audio_out: &Path) -> Result<(), EncodeError>;

    /// Remux `audio` and `cover` into `out` without re-encoding.
    fn remux_with_cover(&self, audio: &Path, cover: &Path, out: &Path)
        -> Result<(), EncodeError>;
}

/// The real thing: spawns an `ffmpeg` binary for every operation.
pub struct FfmpegEncoder {
    binary: PathBuf,
    bitrate_kbps: u32,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
        }
    }
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    /// Run ffmpeg with `args`, then require a non-empty file at `output`.
    fn run(&self, args: &[&std::ffi::OsStr], output: &Path) -> Result<(), EncodeError> {
        log::debug!("ffmpeg {:?}", args);

        let result = Command::new(&self.binary).args(args).output();

        let out = match result {
            Ok(out) => out,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EncodeError::FfmpegNotFound);
            }
            Err(e) => return Err(EncodeError::Io(e)),
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(EncodeError::Failed {
                status: out.status.code().unwrap_or(-1),
                stderr: stderr_tail(&stderr),
            });
        }

        if !non_empty_file(output) {
            return Err(EncodeError::EmptyOutput(output.to_path_buf()));
        }

        Ok(())
    }
}

impl Encoder for FfmpegEncoder {
    fn extract_cover(&self, source: &Path, cover_out: &Path) -> Result<(), EncodeError> {
        let args: Vec<&std::ffi::OsStr> = vec![
            "-i".as_ref(),
            source.as_os_str(),
            "-an".as_ref(),
            "-c:v".as_ref(),
            "copy".as_ref(),
            "-y".as_ref(),
            cover_out.as_os_str(),
        ];
        self.run(&args, cover_out)
    }

    fn transcode(&self, source: &Path, audio_out: &Path) -> Result<(), EncodeError> {
        let bitrate = format!("{}k", self.bitrate_kbps);
        let args: Vec<&std::ffi::OsStr> = vec![
            "-i".as_ref(),
            source.as_os_str(),
            // Audio only; a stray picture stream must not leak into this pass
            "-vn".as_ref(),
            "-c:a".as_ref(),
            "aac".as_ref(),
            "-b:a".as_ref(),
            bitrate.as_str().as_ref(),
            // Carry over tags from the source container
            "-map_metadata".as_ref(),
            "0".as_ref(),
            // Move the moov atom up front so players can start immediately
            "-movflags".as_ref(),
            "+faststart".as_ref(),
            "-y".as_ref(),
            audio_out.as_os_str(),
        ];
        self.run(&args, audio_out)
    }

    fn remux_with_cover(
        &self,
        audio: &Path,
        cover: &Path,
        out: &Path,
    ) -> Result<(), EncodeError> {
        let args: Vec<&std::ffi::OsStr> = vec![
            "-i".as_ref(),
            audio.as_os_str(),
            "-i".as_ref(),
            cover.as_os_str(),
            "-map".as_ref(),
            "0:a".as_ref(),
            "-map".as_ref(),
            "1".as_ref(),
            "-c".as_ref(),
            "copy".as_ref(),
            "-disposition:v:0".as_ref(),
            "attached_pic".as_ref(),
            "-movflags".as_ref(),
            "+faststart".as_ref(),
            "-y".as_ref(),
            out.as_os_str(),
        ];
        self.run(&args, out)
    }
}

/// True when `path` exists and holds at least one byte.
pub fn non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Last few stderr lines, enough to identify the failure without the banner.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().rev().take(3).collect();
    lines.into_iter().rev().collect::<Vec<_>>().join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_non_empty_file() {
        let dir = TempDir::new().unwrap();

        let missing = dir.path().join("missing.jpg");
        assert!(!non_empty_file(&missing));

        let empty = dir.path().join("empty.jpg");
        std::fs::File::create(&empty).unwrap();
        assert!(!non_empty_file(&empty));

        let full = dir.path().join("full.jpg");
        std::fs::File::create(&full)
            .unwrap()
            .write_all(b"\xff\xd8")
            .unwrap();
        assert!(non_empty_file(&full));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = "banner\nconfig\nStream mapping:\nerror: no such stream\n";
        let tail = stderr_tail(stderr);
        assert!(tail.contains("error: no such stream"));
        assert!(!tail.contains("banner"));
    }

    #[test]
    fn test_stderr_tail_short_input() {
        assert_eq!(stderr_tail("only line"), "only line");
        assert_eq!(stderr_tail(""), "");
    }

    #[test]
    fn test_missing_binary_maps_to_not_found() {
        let dir = TempDir::new().unwrap();
        let encoder = FfmpegEncoder::new("/nonexistent/ffmpeg-binary");
        let err = encoder
            .transcode(&dir.path().join("in.flac"), &dir.path().join("out.m4a"))
            .unwrap_err();
        assert!(matches!(err, EncodeError::FfmpegNotFound));
    }
}
