//! Run mode: the immutable flag set resolved once per invocation
//!
//! The four flags are composable on the command line, but two combinations
//! dominate: a normal convert run and a cleanup-only run. Dry-run overlays
//! either one and suppresses every mutating action. The derivation helpers
//! below produce the exact modes the post-run offers re-invoke the driver
//! with.

use serde::Serialize;
use std::fmt;

/// Flags governing one run, resolved before any task executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunMode {
    /// Print intended actions only; never create, delete, or copy anything.
    pub dry_run: bool,
    /// Delete each source file once its destination is finalized.
    pub delete_after_convert: bool,
    /// Never transcode; only delete sources superseded by a fresh destination.
    pub cleanup_only: bool,
    /// After a fully successful convert run, offer to sync to removable devices.
    pub copy_to_devices: bool,
}

impl RunMode {
    /// Preview what a later cleanup run would delete.
    pub fn cleanup_preview(self) -> Self {
        Self {
            cleanup_only: true,
            dry_run: true,
            ..self
        }
    }

    /// Preview the conversions a normal run would perform.
    pub fn conversion_preview(self) -> Self {
        Self {
            cleanup_only: false,
            dry_run: true,
            ..self
        }
    }

    /// The same run with dry-run lifted, ready to mutate.
    pub fn realized(self) -> Self {
        Self {
            dry_run: false,
            ..self
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<&str> = Vec::new();
        if self.cleanup_only {
            parts.push("cleanup-only");
        } else {
            parts.push("convert");
        }
        if self.dry_run {
            parts.push("dry-run");
        }
        if self.delete_after_convert {
            parts.push("delete");
        }
        if self.copy_to_devices {
            parts.push("copy");
        }
        write!(f, "{}", parts.join("+"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_plain_convert() {
        let mode = RunMode::default();
        assert!(!mode.dry_run);
        assert!(!mode.delete_after_convert);
        assert!(!mode.cleanup_only);
        assert!(!mode.copy_to_devices);
    }

    #[test]
    fn test_cleanup_preview_sets_both_flags() {
        let mode = RunMode::default().cleanup_preview();
        assert!(mode.cleanup_only);
        assert!(mode.dry_run);
    }

    #[test]
    fn test_conversion_preview_clears_cleanup() {
        let mode = RunMode {
            cleanup_only: true,
            ..Default::default()
        }
        .conversion_preview();
        assert!(!mode.cleanup_only);
        assert!(mode.dry_run);
    }

    #[test]
    fn test_realized_preserves_other_flags() {
        let mode = RunMode {
            dry_run: true,
            cleanup_only: true,
            copy_to_devices: true,
            ..Default::default()
        }
        .realized();
        assert!(!mode.dry_run);
        assert!(mode.cleanup_only);
        assert!(mode.copy_to_devices);
    }

    #[test]
    fn test_display_summarizes_flags() {
        assert_eq!(RunMode::default().to_string(), "convert");
        assert_eq!(
            RunMode::default().cleanup_preview().to_string(),
            "cleanup-only+dry-run"
        );
    }
}
