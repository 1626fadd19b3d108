//! archivekeeper - Integrity tracker for photo archives.
//!
//! Usage:
//!   keeper scan ROOT            Hash the archive and report changes since the last run
//!   keeper history ROOT         Show the audit log
//!   keeper forget ROOT PATH     Drop the record of a missing file
//!   keeper --help               Show help

mod logging;

use std::path::{Path, PathBuf};
use std::thread;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};

use archivekeeper_core::{EventKind, FileSettings, HashAlgorithm, KeeperConfig};
use archivekeeper_store::HistoryQuery;
use archivekeeper_track::{Tracker, format_size, render_history};

#[derive(Parser)]
#[command(
    name = "keeper",
    version,
    about = "Integrity tracker for photo archives",
    long_about = "archivekeeper fingerprints every file under an archive root and, on each \
                  run, reports what was added, modified, moved, lost or silently corrupted \
                  since the previous run.\n\n\
                  State lives in a SQLite store (by default `ROOT/.archivekeeper/state.db`) \
                  with an append-only audit log."
)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hash the archive and report changes since the previous run
    Scan {
        /// Archive root
        root: PathBuf,

        /// Snapshot database (defaults to ROOT/.archivekeeper/state.db)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Hashing threads (0 = one per core)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Digest algorithm; must match the store's
        #[arg(short, long)]
        algorithm: Option<HashAlgorithm>,

        /// Glob pattern to exclude (repeatable)
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,

        /// Include hidden files and directories
        #[arg(long)]
        include_hidden: bool,

        /// Follow symbolic links
        #[arg(long)]
        follow_symlinks: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Print hashing progress to stderr
        #[arg(long)]
        progress: bool,
    },

    /// Show the audit log, newest first
    History {
        /// Archive root
        root: PathBuf,

        /// Snapshot database (defaults to ROOT/.archivekeeper/state.db)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Only events touching this relative path
        #[arg(short, long)]
        path: Option<String>,

        /// Only events of this kind (e.g. corrupted, missing, moved)
        #[arg(short, long)]
        kind: Option<EventKind>,

        /// Maximum number of entries to show
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Drop the record of a missing file and log it as forgotten
    Forget {
        /// Archive root
        root: PathBuf,

        /// Path of the missing file, relative to the root
        path: String,

        /// Snapshot database (defaults to ROOT/.archivekeeper/state.db)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Flags that override the settings file.
#[derive(Default)]
struct Overrides {
    db: Option<PathBuf>,
    threads: Option<usize>,
    algorithm: Option<HashAlgorithm>,
    exclude: Vec<String>,
    include_hidden: bool,
    follow_symlinks: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.log_file.as_deref())?;
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::Scan {
            root,
            db,
            threads,
            algorithm,
            exclude,
            include_hidden,
            follow_symlinks,
            format,
            progress,
        } => {
            let overrides = Overrides {
                db,
                threads,
                algorithm,
                exclude,
                include_hidden,
                follow_symlinks,
            };
            let config = build_config(&settings, root, overrides)?;
            run_scan(config, format, progress)?;
        }
        Command::History {
            root,
            db,
            path,
            kind,
            limit,
            format,
        } => {
            let config = build_config(&settings, root, Overrides { db, ..Default::default() })?;
            let mut query = HistoryQuery::all().limit(limit);
            if let Some(path) = path {
                query = query.path(path);
            }
            if let Some(kind) = kind {
                query = query.kind(kind);
            }
            run_history(config, &query, format)?;
        }
        Command::Forget { root, path, db } => {
            let config = build_config(&settings, root, Overrides { db, ..Default::default() })?;
            run_forget(config, &path)?;
        }
    }

    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<FileSettings> {
    match path {
        Some(path) => FileSettings::load(path).wrap_err("Failed to load settings"),
        None => FileSettings::load_default().wrap_err("Failed to load default settings"),
    }
}

/// Layer defaults, the settings file and command-line flags, in that order.
fn build_config(
    settings: &FileSettings,
    root: PathBuf,
    overrides: Overrides,
) -> Result<KeeperConfig> {
    let mut builder = KeeperConfig::builder();
    builder.root(root);
    settings.apply(&mut builder);

    if let Some(db) = overrides.db {
        builder.database(db);
    }
    if let Some(threads) = overrides.threads {
        builder.threads(threads);
    }
    if let Some(algorithm) = overrides.algorithm {
        builder.hash_algorithm(algorithm);
    }
    if !overrides.exclude.is_empty() {
        let mut patterns = settings.exclude_patterns.clone().unwrap_or_default();
        patterns.extend(overrides.exclude);
        builder.exclude_patterns(patterns);
    }
    if overrides.include_hidden {
        builder.include_hidden(true);
    }
    if overrides.follow_symlinks {
        builder.follow_symlinks(true);
    }

    builder.build().map_err(|e| eyre!("Invalid configuration: {e}"))
}

/// Run one integrity pass and print the report.
fn run_scan(config: KeeperConfig, format: OutputFormat, progress: bool) -> Result<()> {
    eprintln!("Scanning {}...", config.root.display());

    let tracker = Tracker::new(config).wrap_err("Failed to start hashing pool")?;
    let reporter = progress.then(|| {
        let mut rx = tracker.subscribe();
        thread::spawn(move || {
            use tokio::sync::broadcast::error::RecvError;
            loop {
                match rx.blocking_recv() {
                    Ok(p) => eprint!(
                        "\r  {} files, {} ({}/s)   ",
                        p.files_hashed,
                        format_size(p.bytes_hashed),
                        format_size(p.bytes_per_second() as u64)
                    ),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
            eprintln!();
        })
    });

    let result = tracker.run();
    // Dropping the tracker closes the progress channel.
    drop(tracker);
    if let Some(handle) = reporter {
        let _ = handle.join();
    }
    let report = result.wrap_err("Run failed")?;

    match format {
        OutputFormat::Text => {
            println!();
            print!("{}", report.render_text());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Print the audit log.
fn run_history(config: KeeperConfig, query: &HistoryQuery, format: OutputFormat) -> Result<()> {
    let tracker = Tracker::new(config)?;
    let entries = tracker.history(query).wrap_err("Failed to read history")?;

    match format {
        OutputFormat::Text => print!("{}", render_history(&entries)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
    }

    Ok(())
}

/// Remove a missing record.
fn run_forget(config: KeeperConfig, path: &str) -> Result<()> {
    let tracker = Tracker::new(config)?;
    let entry = tracker
        .forget(path)
        .wrap_err_with(|| format!("Failed to forget {path}"))?;

    println!(
        "Forgot {} (last hash {}), audit entry #{}",
        entry.event.path,
        entry
            .event
            .old_hash
            .map(|h| h.short())
            .unwrap_or_else(|| "?".to_string()),
        entry.id.0
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_settings() {
        let settings = FileSettings {
            threads: Some(2),
            hash_algorithm: Some(HashAlgorithm::Blake3),
            exclude_patterns: Some(vec!["*.xmp".to_string()]),
            ..Default::default()
        };
        let overrides = Overrides {
            threads: Some(6),
            exclude: vec!["*.tmp".to_string()],
            ..Default::default()
        };
        let config = build_config(&settings, PathBuf::from("/archive"), overrides).unwrap();

        assert_eq!(config.threads, 6);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(config.exclude_patterns, ["*.xmp", "*.tmp"]);
    }

    #[test]
    fn test_parse_scan_arguments() {
        let cli = Cli::try_parse_from([
            "keeper", "-vv", "scan", "/archive", "--algorithm", "blake3", "-x", "*.xmp",
            "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Scan { algorithm, exclude, format, .. } => {
                assert_eq!(algorithm, Some(HashAlgorithm::Blake3));
                assert_eq!(exclude, ["*.xmp"]);
                assert!(matches!(format, OutputFormat::Json));
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_parse_history_kind() {
        let cli = Cli::try_parse_from(["keeper", "history", "/archive", "--kind", "read_error"])
            .unwrap();
        match cli.command {
            Command::History { kind, limit, .. } => {
                assert_eq!(kind, Some(EventKind::ReadError));
                assert_eq!(limit, 50);
            }
            _ => panic!("expected history"),
        }
    }
}
