use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "xip")]
#[command(version)]
#[command(about = "Browse, create and extract .xip/.xar archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  xip create docs.xip ~/docs notes.txt     archive a folder and a loose file\n  \
  xip list docs.xip --prefix docs/         browse one folder level\n  \
  xip extract docs.xip -d out docs/a.txt   extract a single member\n  \
  xip repack docs.xip part.xip docs/sub/   copy a folder into a new archive")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode: no progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Compression level for new archives (0 = store, 9 = best)
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9), global = true)]
    pub level: u32,

    /// Progress polling interval in milliseconds
    #[arg(long, default_value_t = 100, global = true)]
    pub poll_ms: u64,

    /// Recent-archives file (JSON)
    #[arg(long, value_name = "FILE", default_value = "config.json", global = true)]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show one folder level of an archive
    List {
        archive: PathBuf,
        /// Folder to show, e.g. "docs/" (default: top level)
        #[arg(long, default_value = "")]
        prefix: String,
        /// List every member instead of one level
        #[arg(short = 'a', long)]
        all: bool,
    },
    /// Create an archive from files and folders
    Create {
        dest: PathBuf,
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
    /// Extract all members, or only the named ones
    Extract {
        archive: PathBuf,
        /// Exact member names (default: all)
        members: Vec<String>,
        /// Destination directory
        #[arg(short = 'd', value_name = "DIR", default_value = ".")]
        dest_dir: PathBuf,
    },
    /// Copy selected members (or "folder/" prefixes) into a new archive
    Repack {
        source: PathBuf,
        dest: PathBuf,
        #[arg(required = true)]
        selectors: Vec<String>,
    },
    /// Browse files and folders as they would appear in a new archive
    Staged {
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// Show recently opened archives
    Recent,
}

impl Cli {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            compression_level: self.level,
            poll_interval: Duration::from_millis(self.poll_ms.max(1)),
        }
    }

    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}
