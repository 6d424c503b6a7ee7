//! Main entry point for the xip CLI application.
//!
//! The command line stands in for a graphical front end: archive work runs
//! on a background task while this loop polls its progress at a fixed
//! interval, and listings are shown one folder level at a time.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use xip::cli::Command;
use xip::tree::{self, format_size};
use xip::{
    ArchiveEngine, ArchiveEntry, Cli, Operation, ProgressTally, RecentArchives, StagedSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let engine = ArchiveEngine::new(cli.engine_config());

    match &cli.command {
        Command::List {
            archive,
            prefix,
            all,
        } => {
            let entries = engine.list(archive).await?;
            remember(&cli.config, archive);
            if *all {
                print_table(&entries);
            } else {
                print_level(&entries, prefix);
            }
        }
        Command::Create { dest, sources } => {
            let operation = Operation::Create {
                sources: StagedSource::new(sources.iter().cloned()),
                dest: dest.clone(),
            };
            run_with_progress(&engine, operation, cli.quiet).await?;
            remember(&cli.config, dest);
            if !cli.quiet {
                println!("Archive created: {}", dest.display());
            }
        }
        Command::Extract {
            archive,
            members,
            dest_dir,
        } => {
            let operation = if members.is_empty() {
                Operation::ExtractAll {
                    archive: archive.clone(),
                    dest_dir: dest_dir.clone(),
                }
            } else {
                Operation::ExtractSubset {
                    archive: archive.clone(),
                    members: members.clone(),
                    dest_dir: dest_dir.clone(),
                }
            };
            run_with_progress(&engine, operation, cli.quiet).await?;
            if !cli.quiet {
                println!("Extracted to {}", dest_dir.display());
            }
        }
        Command::Repack {
            source,
            dest,
            selectors,
        } => {
            let operation = Operation::RepackSubset {
                source: source.clone(),
                selectors: selectors.clone(),
                dest: dest.clone(),
            };
            run_with_progress(&engine, operation, cli.quiet).await?;
            if !cli.quiet {
                println!("New archive created: {}", dest.display());
            }
        }
        Command::Staged { sources, prefix } => {
            let staged = StagedSource::new(sources.iter().cloned());
            let entries = staged.entries().context("cannot read staged files")?;
            print_level(&entries, prefix);
        }
        Command::Recent => {
            let recent = RecentArchives::load(&cli.config);
            if recent.is_empty() {
                println!("No recent files");
            }
            for path in recent.paths() {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}

/// Start `operation` in the background and poll its progress until it ends.
async fn run_with_progress(engine: &ArchiveEngine, operation: Operation, quiet: bool) -> Result<()> {
    let action = operation.name();
    let mut handle = engine.start(operation)?;
    let mut tally = ProgressTally::default();
    let mut ticker = tokio::time::interval(engine.config().poll_interval);

    loop {
        ticker.tick().await;
        // Checked before draining so no event sent before completion is missed.
        let finished = handle.is_finished();
        for event in handle.progress().drain() {
            tally.apply(event)?;
        }
        if !quiet {
            render(action, &tally);
        }
        if finished {
            break;
        }
    }
    if !quiet {
        eprintln!();
    }

    handle.wait().await?;
    Ok(())
}

fn render(action: &str, tally: &ProgressTally) {
    match tally.total {
        Some(total) => eprint!(
            "\r{action}: {}/{total} ({:.0}%)",
            tally.completed,
            tally.fraction() * 100.0
        ),
        None => eprint!("\r{action}: counting..."),
    }
}

fn remember(config: &Path, archive: &Path) {
    let archive = std::fs::canonicalize(archive).unwrap_or_else(|_| archive.to_path_buf());
    let mut recent = RecentArchives::load(config);
    recent.touch(&archive);
    if let Err(e) = recent.save(config) {
        warn!(error = %e, "could not update recent archives");
    }
}

/// One folder level: up node first, then children by name.
fn print_level(entries: &[ArchiveEntry], prefix: &str) {
    let nodes = tree::project(entries, prefix);
    if nodes.is_empty() {
        println!("(empty)");
        return;
    }
    for node in nodes {
        let name = if node.is_up() {
            "..".to_string()
        } else if node.is_directory() {
            format!("{}/", node.name)
        } else {
            node.name.clone()
        };
        let size = node.size.map(format_size).unwrap_or_default();
        let modified = node
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!("{:<40} {:>10}  {}", name, size, modified);
    }
}

/// Every member with sizes and compression ratio.
fn print_table(entries: &[ArchiveEntry]) {
    println!(
        "{:>10}  {:>10}  {:>5}  {:>19}  Name",
        "Length", "Size", "Cmpr", "Modified"
    );
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in entries {
        println!(
            "{:>10}  {:>10}  {}  {}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            entry.modified.format("%Y-%m-%d %H:%M:%S"),
            entry.path
        );
        if !entry.is_directory() {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>19}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );
}

/// Percentage saved by compression.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}
