//! Reconciliation driver: classify, convert, clean up
//!
//! The driver walks the source tree and takes exactly one terminal action per
//! discovered file:
//!
//! - **skip**: the destination is fresh and this is a convert run
//! - **delete**: the destination is fresh and this is a cleanup-only run
//! - **convert**: the destination is stale/missing in a convert run
//! - **report unconverted**: the destination is stale/missing in cleanup-only
//!
//! Dry-run overlays any of these and replaces the action with a printed
//! intention. Tasks are independent; processing is strictly sequential and
//! the [`Outcome`] accumulator is only touched by the task in flight.
//!
//! # Conversion procedure
//!
//! Conversion stages everything in a temporary directory created next to the
//! destination, so the final step is a same-filesystem rename:
//!
//! 1. cover extraction (best-effort, failure just means "no cover")
//! 2. audio transcode (the one hard failure of a task)
//! 3. remux with the cover as an attached picture (falls back to the
//!    cover-less transcode when it fails)
//!
//! The staging directory is dropped on every exit path, so no temporary
//! artifact survives a task, and an interrupted task never renames a
//! partially-finished file into place.

use crate::devices;
use crate::encoder::{non_empty_file, EncodeError, Encoder};
use crate::mode::RunMode;
use crate::task::{discover, ConversionTask};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("source directory not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("could not create destination directory {}: {source}", .path.display())]
    CreateDest {
        path: PathBuf,
        source: io::Error,
    },
}

/// Everything one invocation of the driver needs, resolved up front.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub mode: RunMode,
    /// Suppress progress and per-file output; errors still print.
    pub quiet: bool,
}

/// Cooperative cancellation flag, flipped from the SIGINT handler.
///
/// Checked before each task and between conversion steps. Once set, the
/// in-flight task is abandoned without finalizing its destination and all
/// remaining tasks and post-run prompts are skipped.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One conversion that could not complete.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub source: PathBuf,
    pub error: String,
}

/// Per-run accumulator, returned by the driver rather than kept as ambient
/// state: a run is a function of (source tree, mode) to (destination tree,
/// outcome).
#[derive(Debug, Default, Serialize)]
pub struct Outcome {
    /// Fresh destinations left alone during a convert run.
    pub skipped: Vec<PathBuf>,
    /// Destinations created (or previewed) this run.
    pub converted: Vec<PathBuf>,
    /// Sources removed (or previewed for removal).
    pub deleted: Vec<PathBuf>,
    /// Stale sources a cleanup-only run refused to delete.
    pub unconverted: Vec<PathBuf>,
    /// Conversions that kept their audio but lost the cover remux.
    pub cover_fallbacks: usize,
    /// Hard conversion failures.
    pub failures: Vec<Failure>,
    /// Sources that should have been deleted but could not be. Kept apart
    /// from `failures`: the aggregate failure flag tracks conversion
    /// attempts only.
    pub delete_errors: Vec<Failure>,
    /// True when the run stopped early on SIGINT.
    pub interrupted: bool,
}

impl Outcome {
    /// Did any conversion attempt fail this run?
    pub fn failed(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Yes/no confirmation seam.
///
/// Every post-run offer goes through this, so tests can script the answers
/// and non-interactive callers can refuse everything.
pub trait Prompt {
    fn confirm(&self, question: &str) -> bool;
}

/// Asks on stderr, reads one line from stdin. Only an explicit `y`/`yes`
/// counts as consent.
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn confirm(&self, question: &str) -> bool {
        eprint!("{} [y/N] ", question);
        io::stderr().flush().ok();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            return false;
        }
        matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

enum ConvertStatus {
    Done { cover_fallback: bool },
    Interrupted,
}

pub struct Driver<'a> {
    config: RunConfig,
    encoder: &'a dyn Encoder,
    prompt: &'a dyn Prompt,
    cancel: CancelToken,
}

impl<'a> Driver<'a> {
    pub fn new(
        config: RunConfig,
        encoder: &'a dyn Encoder,
        prompt: &'a dyn Prompt,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            encoder,
            prompt,
            cancel,
        }
    }

    /// Reconcile the whole tree, then walk through the post-run offers.
    pub fn run(&self) -> Result<Outcome, RunError> {
        let outcome = self.run_once()?;
        if !outcome.interrupted {
            self.post_run(&outcome)?;
        }
        Ok(outcome)
    }

    fn run_once(&self) -> Result<Outcome, RunError> {
        let mode = self.config.mode;

        if !self.config.source_root.is_dir() {
            return Err(RunError::MissingSource(self.config.source_root.clone()));
        }
        if !mode.dry_run {
            fs::create_dir_all(&self.config.dest_root).map_err(|e| RunError::CreateDest {
                path: self.config.dest_root.clone(),
                source: e,
            })?;
        }

        let tasks = discover(&self.config.source_root, &self.config.dest_root);

        if !self.config.quiet {
            eprintln!("\x1b[1mflacaway\x1b[0m - {} run", mode);
            eprintln!("{}", "─".repeat(70));
            eprintln!("Found {} FLAC file(s)\n", tasks.len());
        }

        let pb = if !self.config.quiet && !mode.dry_run && tasks.len() > 1 {
            let pb = ProgressBar::new(tasks.len() as u64);
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

        let mut outcome = Outcome::default();

        for task in &tasks {
            if self.cancel.is_cancelled() {
                outcome.interrupted = true;
                break;
            }
            if let Some(ref pb) = pb {
                pb.set_message(task.relative.display().to_string());
            }

            self.process(task, &mut outcome);

            if let Some(ref pb) = pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        self.print_summary(&outcome);
        Ok(outcome)
    }

    /// Classify one task and take its single terminal action.
    fn process(&self, task: &ConversionTask, outcome: &mut Outcome) {
        let mode = self.config.mode;

        if task.is_fresh() {
            if mode.cleanup_only {
                self.delete_source(task, outcome);
            } else {
                // Already converted; nothing to say unless asked
                log::debug!("up to date: {}", task.relative.display());
                outcome.skipped.push(task.source.clone());
            }
            return;
        }

        if mode.cleanup_only {
            // Cleanup never converts; surface what it had to leave behind
            if !self.config.quiet {
                println!(
                    "\x1b[33m[stale]\x1b[0m not yet converted: {}",
                    task.relative.display()
                );
            }
            outcome.unconverted.push(task.source.clone());
            return;
        }

        if mode.dry_run {
            println!(
                "[dry-run] convert {} -> {}",
                task.source.display(),
                task.dest.display()
            );
            outcome.converted.push(task.dest.clone());
            if mode.delete_after_convert {
                self.delete_source(task, outcome);
            }
            return;
        }

        match self.convert(task) {
            Ok(ConvertStatus::Done { cover_fallback }) => {
                log::info!("converted {}", task.relative.display());
                outcome.converted.push(task.dest.clone());
                if cover_fallback {
                    outcome.cover_fallbacks += 1;
                }
                if mode.delete_after_convert {
                    self.delete_source(task, outcome);
                }
            }
            Ok(ConvertStatus::Interrupted) => {
                outcome.interrupted = true;
            }
            Err(e) => {
                eprintln!(
                    "\x1b[31m[fail]\x1b[0m {}: {}",
                    task.relative.display(),
                    e
                );
                outcome.failures.push(Failure {
                    source: task.source.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// The three-step encoder protocol, staged in a scratch directory next to
    /// the destination so the finalize step is a plain rename.
    fn convert(&self, task: &ConversionTask) -> Result<ConvertStatus, EncodeError> {
        fs::create_dir_all(task.dest_dir())?;
        let stage = TempDir::with_prefix_in(".flacaway-", task.dest_dir())?;

        let cover = stage.path().join("cover.jpg");
        let audio = stage.path().join("audio.m4a");

        // Best-effort: a missing or broken picture stream is not an error
        let have_cover = match self.encoder.extract_cover(&task.source, &cover) {
            Ok(()) => non_empty_file(&cover),
            Err(e) => {
                log::debug!("no cover for {}: {}", task.relative.display(), e);
                false
            }
        };

        if self.cancel.is_cancelled() {
            return Ok(ConvertStatus::Interrupted);
        }

        self.encoder.transcode(&task.source, &audio)?;

        if self.cancel.is_cancelled() {
            return Ok(ConvertStatus::Interrupted);
        }

        let mut cover_fallback = false;
        let finished = if have_cover {
            let muxed = stage.path().join("muxed.m4a");
            match self.encoder.remux_with_cover(&audio, &cover, &muxed) {
                Ok(()) => muxed,
                Err(e) => {
                    log::warn!(
                        "cover remux failed for {}, keeping audio-only output: {}",
                        task.relative.display(),
                        e
                    );
                    cover_fallback = true;
                    audio
                }
            }
        } else {
            audio
        };

        if self.cancel.is_cancelled() {
            return Ok(ConvertStatus::Interrupted);
        }

        fs::rename(&finished, &task.dest)?;
        Ok(ConvertStatus::Done { cover_fallback })
    }

    /// Delete (or preview deleting) a source file and record it.
    fn delete_source(&self, task: &ConversionTask, outcome: &mut Outcome) {
        if self.config.mode.dry_run {
            println!("[dry-run] delete {}", task.source.display());
            outcome.deleted.push(task.source.clone());
            return;
        }

        match fs::remove_file(&task.source) {
            Ok(()) => {
                log::info!("deleted {}", task.relative.display());
                outcome.deleted.push(task.source.clone());
            }
            Err(e) => {
                eprintln!(
                    "\x1b[31m[fail]\x1b[0m could not delete {}: {}",
                    task.relative.display(),
                    e
                );
                outcome.delete_errors.push(Failure {
                    source: task.source.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    fn print_summary(&self, outcome: &Outcome) {
        if self.config.quiet {
            return;
        }

        eprintln!("\n{}", "─".repeat(70));
        eprintln!("\x1b[1mSummary ({}):\x1b[0m", self.config.mode);
        eprintln!("  \x1b[32m✓ Converted:\x1b[0m   {}", outcome.converted.len());
        eprintln!("  Skipped:       {}", outcome.skipped.len());
        eprintln!("  Deleted:       {}", outcome.deleted.len());
        if !outcome.unconverted.is_empty() {
            eprintln!(
                "  \x1b[33m? Unconverted:\x1b[0m {}",
                outcome.unconverted.len()
            );
        }
        if outcome.cover_fallbacks > 0 {
            eprintln!("  Cover dropped: {}", outcome.cover_fallbacks);
        }
        if outcome.failed() {
            eprintln!(
                "  \x1b[31m✗ Failed:\x1b[0m      {}",
                outcome.failures.len()
            );
        }
        if !outcome.delete_errors.is_empty() {
            eprintln!(
                "  \x1b[31m✗ Not deleted:\x1b[0m {}",
                outcome.delete_errors.len()
            );
        }
        if outcome.interrupted {
            eprintln!("  \x1b[31mInterrupted before completion\x1b[0m");
        }
    }

    /// The four post-run decisions, each gated on explicit confirmation.
    fn post_run(&self, outcome: &Outcome) -> Result<(), RunError> {
        let mode = self.config.mode;

        // 1. Device sync, only after a fully successful convert run
        if mode.copy_to_devices && !mode.cleanup_only && !outcome.failed() {
            self.offer_device_copy(mode.dry_run);
        }

        // 2. Cleanup left work behind: preview the conversion that would fix it
        if mode.cleanup_only && !outcome.unconverted.is_empty() {
            let question = format!(
                "{} file(s) are not yet converted. Preview the conversion with a dry run?",
                outcome.unconverted.len()
            );
            if self.prompt.confirm(&question) {
                self.rerun(mode.conversion_preview())?;
            }
        }

        // 3. A plain convert run: preview what cleanup would later remove
        if !mode.cleanup_only && !mode.delete_after_convert && !mode.dry_run {
            if self
                .prompt
                .confirm("Preview cleanup of already-converted sources with a dry run?")
            {
                self.rerun(mode.cleanup_preview())?;
            }
        }

        // 4. A dry run: offer the real thing
        if mode.dry_run && !mode.delete_after_convert {
            if self.prompt.confirm("Re-run for real now?") {
                self.rerun(mode.realized())?;
            }
        }

        Ok(())
    }

    fn offer_device_copy(&self, dry_run: bool) {
        let library = self
            .config
            .dest_root
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("library"));

        let mounts = devices::removable_music_mounts();
        if mounts.is_empty() {
            eprintln!("No removable devices with a Music directory found.");
            return;
        }

        for device in mounts {
            let target = device.music_dir.join(&library);

            if dry_run {
                println!(
                    "[dry-run] copy {} -> {}",
                    self.config.dest_root.display(),
                    target.display()
                );
                continue;
            }

            let question = format!(
                "Copy {} to {}?",
                self.config.dest_root.display(),
                target.display()
            );
            if !self.prompt.confirm(&question) {
                continue;
            }

            match devices::copy_tree(&self.config.dest_root, &target, self.config.quiet) {
                Ok(copied) => {
                    eprintln!("Copied {} file(s) to {}", copied, device.mount.display());
                }
                Err(e) => {
                    eprintln!(
                        "\x1b[31m[fail]\x1b[0m copy to {} failed: {}",
                        device.mount.display(),
                        e
                    );
                }
            }
        }
    }

    /// Re-enter the driver with a derived mode, as the offers do.
    fn rerun(&self, mode: RunMode) -> Result<(), RunError> {
        let config = RunConfig {
            mode,
            ..self.config.clone()
        };
        Driver::new(config, self.encoder, self.prompt, self.cancel.clone()).run()?;
        Ok(())
    }
}
