//! # xip
//!
//! Archive engine for `.xip` / `.xar` archives, which are standard ZIP files.
//!
//! The crate lists, creates, extracts and selectively repacks archives while
//! reporting progress to a caller running on another task, and projects the
//! flat member list into folder-style levels for browsing.
//!
//! ## Features
//!
//! - ZIP reading with STORED and DEFLATE members, ZIP64 directories and CRC checks
//! - ZIP writing with DEFLATE, staged through a temporary file and renamed into place
//! - Single-flight background operations with a `Total` then `Increment` progress stream
//! - Folder view over member paths, including folders that exist only as prefixes
//!
//! ## Example
//!
//! ```no_run
//! use xip::{ArchiveEngine, EngineConfig, tree};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = ArchiveEngine::new(EngineConfig::default());
//!     let entries = engine.list("photos.xip".as_ref()).await?;
//!
//!     for node in tree::project(&entries, "") {
//!         println!("{}{}", node.name, if node.is_directory() { "/" } else { "" });
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod progress;
pub mod tree;
pub mod zip;

pub use cli::Cli;
pub use codec::{ArchiveEntry, ArchiveReader, ArchiveWriter, list_entries};
pub use config::{EngineConfig, RecentArchives};
pub use engine::{ArchiveEngine, Operation, OperationHandle, Phase, StagedFile, StagedSource};
pub use error::{ArchiveError, EngineError};
pub use io::{LocalFileReader, ReadAt};
pub use progress::{ProgressEvent, ProgressReceiver, ProgressSender, ProgressTally};
pub use tree::{NodeKind, PathTreeNode};
pub use zip::{ZipExtractor, ZipFileEntry};
