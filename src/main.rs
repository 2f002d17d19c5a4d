use clap::Parser;
use flacaway::driver::{CancelToken, ConsolePrompt, Driver, Prompt, RunConfig};
use flacaway::encoder::FfmpegEncoder;
use flacaway::mode::RunMode;
use flacaway::report;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flacaway")]
#[command(
    author,
    version,
    about = "Batch-convert a FLAC library to M4A/AAC, keeping tags and cover art"
)]
struct Args {
    /// Directory tree containing the FLAC sources
    source: Option<PathBuf>,

    /// Directory that receives the mirrored M4A tree
    dest: Option<PathBuf>,

    /// Print intended actions without touching anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Delete each source file after it converts successfully
    #[arg(long)]
    delete: bool,

    /// Only delete sources already superseded by a fresh destination; never convert
    #[arg(long)]
    cleanup_only: bool,

    /// After a fully successful run, offer to copy the destination tree to
    /// removable devices that carry a Music directory
    #[arg(long)]
    copy: bool,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Suppress progress and per-file output
    #[arg(short, long)]
    quiet: bool,

    /// Log per-file detail
    #[arg(short, long)]
    verbose: bool,
}

/// Conventional exit status for a SIGINT-terminated run.
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
            log::warn!("could not install interrupt handler: {}", e);
        }
    }

    let mode = RunMode {
        dry_run: args.dry_run,
        delete_after_convert: args.delete,
        cleanup_only: args.cleanup_only,
        copy_to_devices: args.copy,
    };

    let (source_root, dest_root, mode) = match (args.source.clone(), args.dest.clone()) {
        (Some(source), Some(dest)) => (source, dest, mode),
        (None, None) => match interactive_setup(mode) {
            Some(setup) => setup,
            None => {
                eprintln!("Nothing to do.");
                return;
            }
        },
        _ => {
            eprintln!("Usage: flacaway <SOURCE> <DEST> [OPTIONS]");
            eprintln!("Run 'flacaway --help' for more options.");
            std::process::exit(2);
        }
    };

    let config = RunConfig {
        source_root,
        dest_root,
        mode,
        quiet: args.quiet,
    };
    let encoder = FfmpegEncoder::default();

    let outcome = match Driver::new(config.clone(), &encoder, &ConsolePrompt, cancel).run() {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            std::process::exit(1);
        }
    };

    if let Some(ref path) = args.report {
        if let Err(e) = report::generate(path, &config, &outcome) {
            eprintln!("Failed to write report: {}", e);
            std::process::exit(1);
        }
        if !args.quiet {
            eprintln!("\nReport saved: {}", path.display());
        }
    }

    if outcome.interrupted {
        eprintln!("\nInterrupted.");
        std::process::exit(EXIT_INTERRUPTED);
    }
}

/// Zero-argument fallback: ask for the two directories interactively and
/// offer to start with a dry run.
fn interactive_setup(mode: RunMode) -> Option<(PathBuf, PathBuf, RunMode)> {
    eprintln!("No directories given.");
    let source = ask("Source directory (FLAC tree):")?;
    let dest = ask("Destination directory (M4A tree):")?;

    let mode = if ConsolePrompt.confirm("Start with a dry run (nothing will be written)?") {
        RunMode {
            dry_run: true,
            ..mode
        }
    } else {
        mode
    };

    Some((PathBuf::from(source), PathBuf::from(dest), mode))
}

fn ask(question: &str) -> Option<String> {
    eprint!("{} ", question);
    io::stderr().flush().ok();

    let mut input = String::new();
    io::stdin().read_line(&mut input).ok()?;
    let input = input.trim();
    if input.is_empty() {
        None
    } else {
        Some(input.to_string())
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto).ok();
}
