//! Run report output
//!
//! Serializes one run's [`Outcome`] plus its configuration as pretty JSON,
//! for piping into whatever keeps score of a library migration. The report
//! is written only when asked for on the command line; console output stays
//! the primary surface.

use crate::driver::{Outcome, RunConfig};
use chrono::Local;
use serde::Serialize;
use std::io;
use std::path::Path;

#[derive(Serialize)]
struct Report<'a> {
    generated: String,
    source_root: &'a Path,
    dest_root: &'a Path,
    mode: crate::mode::RunMode,
    failed: bool,
    #[serde(flatten)]
    outcome: &'a Outcome,
}

/// Write the run report as JSON to `path`.
pub fn generate<P: AsRef<Path>>(
    path: P,
    config: &RunConfig,
    outcome: &Outcome,
) -> io::Result<()> {
    let report = Report {
        generated: Local::now().to_rfc3339(),
        source_root: &config.source_root,
        dest_root: &config.dest_root,
        mode: config.mode,
        failed: outcome.failed(),
        outcome,
    };

    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &report)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::RunMode;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_report_round_trips_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");

        let config = RunConfig {
            source_root: PathBuf::from("/music/flac"),
            dest_root: PathBuf::from("/music/m4a"),
            mode: RunMode::default(),
            quiet: true,
        };
        let mut outcome = Outcome::default();
        outcome.converted.push(PathBuf::from("/music/m4a/a.m4a"));
        outcome.skipped.push(PathBuf::from("/music/flac/b.flac"));
        outcome.cover_fallbacks = 1;

        generate(&path, &config, &outcome).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["converted"].as_array().unwrap().len(), 1);
        assert_eq!(parsed["skipped"].as_array().unwrap().len(), 1);
        assert_eq!(parsed["cover_fallbacks"], 1);
        assert_eq!(parsed["failed"], false);
        assert!(parsed["generated"].as_str().is_some());
    }
}
