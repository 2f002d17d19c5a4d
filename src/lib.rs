//! flacaway - Batch-convert a FLAC library to M4A/AAC
//!
//! flacaway mirrors a FLAC directory tree into an M4A/AAC tree, preserving
//! metadata tags and embedded cover art. All media work is delegated to an
//! external `ffmpeg` binary; this crate is the orchestration around it:
//! discovering sources, deciding per file whether to skip, convert, delete,
//! or report, and offering the cleanup and device-sync follow-ups.
//!
//! # How a run works
//!
//! Every source file gets exactly one disposition, decided by comparing
//! modification times:
//!
//! | Destination state | Convert run | Cleanup-only run |
//! |-------------------|-------------|------------------|
//! | fresh (newer)     | skip        | delete the source |
//! | stale or missing  | convert     | report as unconverted |
//!
//! Dry-run overlays either mode and prints intentions instead of acting.
//! Because freshness is the only state consulted, a second run over an
//! unchanged tree skips everything: the tool is idempotent.
//!
//! # Quick Start
//!
//! ```no_run
//! use flacaway::driver::{CancelToken, ConsolePrompt, Driver, RunConfig};
//! use flacaway::encoder::FfmpegEncoder;
//! use flacaway::mode::RunMode;
//!
//! let config = RunConfig {
//!     source_root: "/music/flac".into(),
//!     dest_root: "/music/m4a".into(),
//!     mode: RunMode::default(),
//!     quiet: false,
//! };
//!
//! let encoder = FfmpegEncoder::default();
//! let outcome = Driver::new(config, &encoder, &ConsolePrompt, CancelToken::new())
//!     .run()
//!     .expect("run failed");
//!
//! println!("converted {} file(s)", outcome.converted.len());
//! ```
//!
//! # Modules
//!
//! - [`task`]: source discovery and the source→destination path mapping
//! - [`mode`]: the immutable flag set one run executes under
//! - [`driver`]: the reconciliation state machine and post-run offers
//! - [`encoder`]: the ffmpeg subprocess protocol
//! - [`devices`]: removable-device discovery and library sync
//! - [`report`]: JSON run summaries

pub mod devices;
pub mod driver;
pub mod encoder;
pub mod mode;
pub mod report;
pub mod task;

pub use driver::{CancelToken, ConsolePrompt, Driver, Outcome, Prompt, RunConfig, RunError};
pub use encoder::{EncodeError, Encoder, FfmpegEncoder};
pub use mode::RunMode;
pub use task::{ConversionTask, SOURCE_EXT, TARGET_EXT};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Core types are re-exported from the crate root
        let mode = RunMode::default();
        assert!(!mode.dry_run);
        let _encoder = FfmpegEncoder::default();
        let _cancel = CancelToken::new();
    }

    #[test]
    fn test_extension_constants() {
        assert_eq!(SOURCE_EXT, "flac");
        assert_eq!(TARGET_EXT, "m4a");
    }
}
