//! # gitvault CLI - snapshot, find, extract, and compare
//!
//! Command-line surface over the gitvault engine.
//!
//! ## Usage
//! ```bash
//! # Initialize a backup repository in your home directory
//! gitvault init
//!
//! # Record a snapshot of the current state
//! gitvault commit
//!
//! # Find a file anywhere in history
//! gitvault find -a 'thesis.*\.tex$'
//!
//! # Extract a whole historical tree
//! gitvault extract HEAD~5 /tmp/restored
//!
//! # Open a visual diff between two snapshots
//! gitvault compare HEAD~5 HEAD
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use gitvault::store::ObjectStoreClient;
use gitvault::{
    format_bytes, Backup, GitStore, Materializer, ObjectId, PathMatcher, SearchOptions, Searcher,
    TreeDiffPresenter, TreeWalker, VaultError,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;

/// Personal backup and time travel over git
#[derive(Parser)]
#[command(name = "gitvault")]
#[command(version)]
#[command(about = "Snapshot a directory into git history; find, extract, and compare old states")]
struct Cli {
    /// Repository directory (defaults to $HOME for init/commit, the
    /// current directory otherwise)
    #[arg(short = 'C', long, global = true)]
    directory: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a backup repository
    Init,

    /// Record a snapshot of the current directory state
    Commit,

    /// Find files by path pattern, optionally across all history
    Find {
        /// Regular expression tested against each relative path
        pattern: String,

        /// Search only this ref instead of every ref
        #[arg(long, value_name = "REF")]
        start_ref: Option<String>,

        /// Search only this tree object instead of any refs
        #[arg(long, value_name = "TREE")]
        start_tree: Option<String>,

        /// When starting from refs, look through their complete history
        #[arg(short = 'a', long)]
        all_history: bool,

        /// Also extract each match here, under a per-commit subdirectory
        #[arg(long, value_name = "DIR")]
        extract_to: Option<PathBuf>,

        /// Pin the pattern to the start of the path
        #[arg(long)]
        anchored: bool,
    },

    /// Extract a whole tree-ish into a directory
    Extract {
        /// Ref, commit, or tree id to extract
        tree_ish: String,

        /// Destination directory
        output: PathBuf,
    },

    /// Open an external visual diff between two refs
    Compare {
        /// Left-hand ref or commit
        ref_a: String,

        /// Right-hand ref or commit
        ref_b: String,

        /// Diff program to invoke with the two staged directories
        #[arg(long, default_value = gitvault::compare::DEFAULT_DIFF_TOOL)]
        tool: String,
    },
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(e.exit_code().into());
    }
}

fn run(cli: Cli) -> gitvault::Result<()> {
    let directory = match cli.directory {
        Some(dir) => dir,
        None => match cli.command {
            // Backup lifecycle defaults to the home directory, like the
            // history it manages.
            Commands::Init | Commands::Commit => std::env::var_os("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| VaultError::usage("HOME is not set; pass --directory"))?,
            _ => PathBuf::from("."),
        },
    };

    match cli.command {
        Commands::Init => {
            let backup = Backup::new(&directory);
            backup.preflight()?;
            backup.init()?;
            println!(
                "{} You might want to tweak {} before the first real snapshot.",
                "Initialized.".green().bold(),
                directory.join(".gitignore").display()
            );
            println!("Run '{}' to record one.", "gitvault commit".bold());
            Ok(())
        }
        Commands::Commit => {
            let backup = Backup::new(&directory);
            backup.preflight()?;
            backup.commit()?;
            println!("{}", "Snapshot recorded.".green().bold());
            Ok(())
        }
        Commands::Find {
            pattern,
            start_ref,
            start_tree,
            all_history,
            extract_to,
            anchored,
        } => cmd_find(
            directory,
            pattern,
            start_ref,
            start_tree,
            all_history,
            extract_to,
            anchored,
        ),
        Commands::Extract { tree_ish, output } => cmd_extract(directory, tree_ish, output),
        Commands::Compare { ref_a, ref_b, tool } => cmd_compare(directory, ref_a, ref_b, tool),
    }
}

fn cmd_find(
    directory: PathBuf,
    pattern: String,
    start_ref: Option<String>,
    start_tree: Option<String>,
    all_history: bool,
    extract_to: Option<PathBuf>,
    anchored: bool,
) -> gitvault::Result<()> {
    let store = GitStore::new(directory);
    let matcher = if anchored {
        PathMatcher::anchored(&pattern)?
    } else {
        PathMatcher::new(&pattern)?
    };

    let options = SearchOptions {
        start_ref,
        start_tree: start_tree.as_deref().map(ObjectId::parse).transpose()?,
        all_history,
        extract_to,
    };

    let started = Instant::now();
    let searcher = Searcher::new(&store, matcher);
    let outcome = searcher.run(&options)?;

    for m in &outcome.matches {
        println!("{} {} {}", m.source, m.blob.id, m.blob.path.display());
    }

    for skipped in &outcome.skipped {
        eprintln!(
            "{}: skipped {}: {}",
            "warning".yellow(),
            skipped.descriptor,
            skipped.reason
        );
    }
    eprintln!(
        "{} matches across {} roots in {}",
        outcome.matches.len(),
        outcome.roots_scanned,
        humantime::format_duration(round_to_millis(started.elapsed()))
    );
    Ok(())
}

fn cmd_extract(directory: PathBuf, tree_ish: String, output: PathBuf) -> gitvault::Result<()> {
    let store = GitStore::new(directory);
    // Accept either a raw object id or anything rev-parse can resolve.
    let root = match ObjectId::parse(&tree_ish) {
        Ok(id) => id,
        Err(_) => store.resolve_ref(&tree_ish)?,
    };

    let started = Instant::now();
    let walker = TreeWalker::new(&store);
    let blobs = walker.expand(&root)?;

    let bar = ProgressBar::new(blobs.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap(),
    );

    let materializer = Materializer::new(&store);
    let mut report = gitvault::MaterializeReport::default();
    for blob in &blobs {
        println!("{} {:03o} {}", blob.id, blob.mode, blob.path.display());
        report.merge(materializer.materialize(std::slice::from_ref(blob), &output)?);
        bar.inc(1);
    }
    bar.finish_and_clear();

    for w in &report.warnings {
        eprintln!("{}: {}: {}", "warning".yellow(), w.path.display(), w.reason);
    }
    println!(
        "{} {} files, {} symlinks, {} in {}",
        "Extracted".green().bold(),
        report.files_written,
        report.symlinks_created,
        format_bytes(report.bytes_written),
        humantime::format_duration(round_to_millis(started.elapsed()))
    );
    Ok(())
}

fn cmd_compare(
    directory: PathBuf,
    ref_a: String,
    ref_b: String,
    tool: String,
) -> gitvault::Result<()> {
    let store = GitStore::new(directory);
    let root_a = store.resolve_ref(&ref_a)?;
    let root_b = store.resolve_ref(&ref_b)?;

    println!(
        "Comparing {} ({}) with {} ({})...",
        ref_a.bold(),
        root_a.short(),
        ref_b.bold(),
        root_b.short()
    );
    TreeDiffPresenter::new(&store).with_tool(tool).compare(&root_a, &root_b)
}

/// Keep humantime output readable by dropping sub-millisecond noise.
fn round_to_millis(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}
