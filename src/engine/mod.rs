//! Archive engine: the operations a presentation layer drives.
//!
//! Every mutating operation moves through `Counting -> Processing -> Done |
//! Failed`. An engine runs one operation at a time; starting another while
//! one is in flight fails with [`EngineError::Busy`] rather than queueing.
//! Listing takes the same slot. Operations run to completion or first failure; there is no cancellation.
//!
//! ```no_run
//! use xip::{ArchiveEngine, EngineConfig, Operation, StagedSource};
//!
//! # async fn demo() -> Result<(), xip::EngineError> {
//! let engine = ArchiveEngine::new(EngineConfig::default());
//! let mut handle = engine.start(Operation::Create {
//!     sources: StagedSource::new(["/home/me/docs"]),
//!     dest: "/home/me/docs.xip".into(),
//! })?;
//! while let Some(event) = handle.progress().recv().await {
//!     println!("{event:?}");
//! }
//! handle.wait().await
//! # }
//! ```

mod ops;
mod staging;

pub use staging::{StagedFile, StagedSource};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::codec::{self, ArchiveEntry};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::progress::{self, ProgressReceiver, ProgressSender, Reporter};

/// Lifecycle of the engine's current (or last) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Working out how many members the operation will touch.
    Counting,
    /// Total announced; members are being processed.
    Processing,
    Done,
    Failed,
}

impl Phase {
    pub fn is_running(self) -> bool {
        matches!(self, Phase::Counting | Phase::Processing)
    }
}

/// A mutating operation with owned inputs, for [`ArchiveEngine::start`].
#[derive(Debug, Clone)]
pub enum Operation {
    Create {
        sources: StagedSource,
        dest: PathBuf,
    },
    ExtractAll {
        archive: PathBuf,
        dest_dir: PathBuf,
    },
    /// `members` are exact member names; folders are not expanded.
    ExtractSubset {
        archive: PathBuf,
        members: Vec<String>,
        dest_dir: PathBuf,
    },
    /// Selectors ending in `/` select every member under that prefix.
    RepackSubset {
        source: PathBuf,
        selectors: Vec<String>,
        dest: PathBuf,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::ExtractAll { .. } => "extract-all",
            Operation::ExtractSubset { .. } => "extract-subset",
            Operation::RepackSubset { .. } => "repack-subset",
        }
    }
}

type PhaseCell = Arc<Mutex<Phase>>;

fn set_phase(cell: &Mutex<Phase>, phase: Phase) {
    *cell.lock().unwrap_or_else(PoisonError::into_inner) = phase;
}

/// Holds the engine's single-flight slot. Settles the phase when the
/// operation ends; a guard dropped unsettled (the worker panicked) marks it failed.
struct PhaseGuard {
    cell: PhaseCell,
    settled: bool,
}

impl PhaseGuard {
    fn settle(mut self, ok: bool) {
        set_phase(&self.cell, if ok { Phase::Done } else { Phase::Failed });
        self.settled = true;
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        if !self.settled {
            set_phase(&self.cell, Phase::Failed);
        }
    }
}

/// Per-operation state handed to the operation bodies.
pub(crate) struct OpContext<'a> {
    reporter: Reporter<'a>,
    phase: &'a Mutex<Phase>,
    compression_level: u32,
}

impl OpContext<'_> {
    /// Announce the unit count and leave the counting phase.
    fn total(&mut self, count: usize) {
        set_phase(self.phase, Phase::Processing);
        self.reporter.total(count as u64);
    }

    fn increment(&mut self) {
        self.reporter.increment();
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveEngine {
    config: EngineConfig,
    phase: PhaseCell,
}

impl ArchiveEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            phase: Arc::new(Mutex::new(Phase::Idle)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the single-flight slot.
    fn begin(&self) -> Result<PhaseGuard, EngineError> {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if phase.is_running() {
            return Err(EngineError::Busy);
        }
        *phase = Phase::Counting;
        Ok(PhaseGuard {
            cell: Arc::clone(&self.phase),
            settled: false,
        })
    }

    /// List an archive's members. Takes the single-flight slot like the
    /// mutating operations but emits no progress.
    pub async fn list(&self, archive: &Path) -> Result<Vec<ArchiveEntry>, EngineError> {
        let guard = self.begin()?;
        let result = codec::list_entries(archive).await.map_err(|e| {
            error!(archive = %archive.display(), error = %e, "list failed");
            EngineError::ListFailed(e)
        });
        guard.settle(result.is_ok());
        result
    }

    pub async fn create(
        &self,
        sources: &StagedSource,
        dest: &Path,
        progress: Option<&ProgressSender>,
    ) -> Result<(), EngineError> {
        let guard = self.begin()?;
        let operation = Operation::Create {
            sources: sources.clone(),
            dest: dest.to_path_buf(),
        };
        self.run(guard, &operation, progress).await
    }

    pub async fn extract_all(
        &self,
        archive: &Path,
        dest_dir: &Path,
        progress: Option<&ProgressSender>,
    ) -> Result<(), EngineError> {
        let guard = self.begin()?;
        let operation = Operation::ExtractAll {
            archive: archive.to_path_buf(),
            dest_dir: dest_dir.to_path_buf(),
        };
        self.run(guard, &operation, progress).await
    }

    pub async fn extract_subset(
        &self,
        archive: &Path,
        members: &[String],
        dest_dir: &Path,
        progress: Option<&ProgressSender>,
    ) -> Result<(), EngineError> {
        let guard = self.begin()?;
        let operation = Operation::ExtractSubset {
            archive: archive.to_path_buf(),
            members: members.to_vec(),
            dest_dir: dest_dir.to_path_buf(),
        };
        self.run(guard, &operation, progress).await
    }

    pub async fn repack_subset(
        &self,
        source: &Path,
        selectors: &[String],
        dest: &Path,
        progress: Option<&ProgressSender>,
    ) -> Result<(), EngineError> {
        let guard = self.begin()?;
        let operation = Operation::RepackSubset {
            source: source.to_path_buf(),
            selectors: selectors.to_vec(),
            dest: dest.to_path_buf(),
        };
        self.run(guard, &operation, progress).await
    }

    /// Extract a single member into `scratch_dir` for viewing and return
    /// where it landed.
    pub async fn preview_member(
        &self,
        archive: &Path,
        member: &str,
        scratch_dir: &Path,
    ) -> Result<PathBuf, EngineError> {
        let target = codec::member_destination(scratch_dir, member).map_err(EngineError::ExtractFailed)?;
        self.extract_subset(archive, &[member.to_string()], scratch_dir, None)
            .await?;
        Ok(target)
    }

    /// Run `operation` on a background task. Fails with [`EngineError::Busy`]
    /// if another operation is still running; must be called within a tokio runtime.
    pub fn start(&self, operation: Operation) -> Result<OperationHandle, EngineError> {
        let guard = self.begin()?;
        let (tx, rx) = progress::channel();
        let engine = self.clone();
        let task = tokio::spawn(async move { engine.run(guard, &operation, Some(&tx)).await });
        Ok(OperationHandle { progress: rx, task })
    }

    async fn run(
        &self,
        guard: PhaseGuard,
        operation: &Operation,
        progress: Option<&ProgressSender>,
    ) -> Result<(), EngineError> {
        let mut ctx = OpContext {
            reporter: Reporter::new(progress),
            phase: &self.phase,
            compression_level: self.config.compression_level,
        };
        info!(operation = operation.name(), "starting");

        let result = match operation {
            Operation::Create { sources, dest } => ops::create(sources, dest, &mut ctx)
                .await
                .map_err(EngineError::CreateFailed),
            Operation::ExtractAll { archive, dest_dir } => {
                ops::extract_all(archive, dest_dir, &mut ctx)
                    .await
                    .map_err(EngineError::ExtractFailed)
            }
            Operation::ExtractSubset {
                archive,
                members,
                dest_dir,
            } => ops::extract_subset(archive, members, dest_dir, &mut ctx)
                .await
                .map_err(EngineError::ExtractFailed),
            Operation::RepackSubset {
                source,
                selectors,
                dest,
            } => ops::repack_subset(source, selectors, dest, &mut ctx)
                .await
                .map_err(EngineError::RepackFailed),
        };

        match &result {
            Ok(()) => info!(operation = operation.name(), "finished"),
            Err(e) => error!(operation = operation.name(), error = %e, "failed"),
        }
        guard.settle(result.is_ok());
        result
    }
}

/// A background operation started with [`ArchiveEngine::start`].
#[derive(Debug)]
pub struct OperationHandle {
    progress: ProgressReceiver,
    task: JoinHandle<Result<(), EngineError>>,
}

impl OperationHandle {
    pub fn progress(&mut self) -> &mut ProgressReceiver {
        &mut self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the outcome.
    pub async fn wait(self) -> Result<(), EngineError> {
        self.task
            .await
            .map_err(|e| EngineError::Worker(e.to_string()))?
    }
}
