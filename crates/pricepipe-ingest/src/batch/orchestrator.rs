//! Batch orchestrator
//!
//! Runs every input file through the same sequence inside its own transaction:
//!
//! ```text
//! Pending -> StagingCleared -> Loaded -> Merged -> CheckpointComputed -> Committed
//! ```
//!
//! A failure at any step rolls the file back and the loop moves on, unless the
//! error is fatal. The checkpoint held in memory only advances once a file has
//! committed.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::filter::filter_file;
use super::models::MergeStats;
use super::source::enumerate_files;
use super::store::{IngestStore, PgIngestStore};
use crate::config::PipelineConfig;
use crate::db;
use crate::error::{IngestError, IngestResult};

/// Settings the orchestrator is constructed with
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub pipeline_name: String,
    /// Watermark seeded on the very first run
    pub sentinel_timestamp: DateTime<Utc>,
    /// Where batch files are picked up
    pub intake_dir: PathBuf,
}

/// Progress of a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    StagingCleared,
    Loaded,
    Merged,
    CheckpointComputed,
    Committed,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileState::Pending => "pending",
            FileState::StagingCleared => "staging_cleared",
            FileState::Loaded => "loaded",
            FileState::Merged => "merged",
            FileState::CheckpointComputed => "checkpoint_computed",
            FileState::Committed => "committed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    /// Every file was attempted; some may have failed
    Completed,
    /// Stopped early on a fatal error
    Aborted,
}

/// How one file ended
#[derive(Debug)]
pub enum FileOutcome {
    Committed {
        selected: usize,
        merge: MergeStats,
        /// Checkpoint value persisted with this file
        checkpoint: DateTime<Utc>,
    },
    /// Nothing in the file was newer than the checkpoint
    Skipped { total_rows: usize },
    /// Rolled back; `stage` is the last state reached before the error
    Failed { stage: FileState, error: IngestError },
}

#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Result of a completed run
#[derive(Debug)]
pub struct RunSummary {
    pub pipeline_name: String,
    pub initial_checkpoint: DateTime<Utc>,
    pub final_checkpoint: DateTime<Utc>,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    pub fn committed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Committed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|report| pred(&report.outcome)).count()
    }
}

type FileStepResult = Result<FileOutcome, (FileState, IngestError)>;

/// Sequences checkpoint, filter, staging and merge for one pipeline
pub struct BatchOrchestrator<S: IngestStore> {
    settings: BatchSettings,
    store: S,
    state: BatchState,
}

impl BatchOrchestrator<PgIngestStore> {
    /// Open the run's database connection and build an orchestrator on it
    pub async fn connect(config: &PipelineConfig) -> IngestResult<Self> {
        let pool = db::connect(&config.connection, config.connect_timeout()).await?;
        Ok(Self::new(config.batch_settings(), PgIngestStore::new(pool)))
    }
}

impl<S: IngestStore> BatchOrchestrator<S> {
    pub fn new(settings: BatchSettings, store: S) -> Self {
        Self {
            settings,
            store,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Process `files` (or the whole intake directory) once.
    ///
    /// The store is closed when this returns, successful or not, so an
    /// orchestrator runs at most once. `Err` is only returned for fatal errors;
    /// per-file failures are reported in the summary.
    pub async fn run(&mut self, files: Option<&[String]>) -> IngestResult<RunSummary> {
        let span = info_span!("batch_run", pipeline = %self.settings.pipeline_name);

        async move {
            self.state = BatchState::Running;
            let result = self.run_files(files).await;
            self.store.close().await;

            self.state = match result {
                Ok(_) => BatchState::Completed,
                Err(_) => BatchState::Aborted,
            };
            result
        }
        .instrument(span)
        .await
    }

    async fn run_files(&mut self, files: Option<&[String]>) -> IngestResult<RunSummary> {
        let init = self
            .store
            .load_checkpoint(&self.settings.pipeline_name, self.settings.sentinel_timestamp)
            .await?;

        if init.seeded {
            info!(checkpoint = %init.value, "No checkpoint yet, seeded with sentinel");
        } else {
            info!(checkpoint = %init.value, "Resuming from checkpoint");
        }

        self.store.ensure_item_prices().await?;

        let paths = enumerate_files(&self.settings.intake_dir, files).await?;
        info!(files = paths.len(), "Processing batch files");

        let mut current = init.value;
        let mut reports = Vec::with_capacity(paths.len());

        for path in paths {
            let outcome = match self.process_file(&path, current).await {
                Ok(outcome) => outcome,
                Err((stage, err)) => {
                    if let Err(e) = self.store.rollback().await {
                        warn!(file = %path.display(), error = %e, "Rollback failed");
                    }

                    if err.is_fatal() {
                        error!(
                            file = %path.display(),
                            stage = %stage,
                            error = %err,
                            checkpoint = %current,
                            "Fatal error, aborting batch run"
                        );
                        return Err(err);
                    }

                    FileOutcome::Failed { stage, error: err }
                },
            };

            if let FileOutcome::Committed { checkpoint, .. } = &outcome {
                current = *checkpoint;
            }

            log_outcome(&path, &outcome);
            reports.push(FileReport { path, outcome });
        }

        let summary = RunSummary {
            pipeline_name: self.settings.pipeline_name.clone(),
            initial_checkpoint: init.value,
            final_checkpoint: current,
            files: reports,
        };

        info!(
            committed = summary.committed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Batch run finished"
        );
        info!(checkpoint = %summary.final_checkpoint, "Checkpoint after run");

        Ok(summary)
    }

    async fn process_file(&mut self, path: &Path, current: DateTime<Utc>) -> FileStepResult {
        let mut stage = FileState::Pending;
        debug!(file = %path.display(), state = %stage, "Starting file");

        self.store.begin().await.map_err(|e| (stage, e))?;
        self.store.reset_staging().await.map_err(|e| (stage, e))?;
        stage = FileState::StagingCleared;
        debug!(state = %stage);

        let filtered = filter_file(path, current).await.map_err(|e| (stage, e))?;
        if filtered.is_empty() {
            self.store.rollback().await.map_err(|e| (stage, e))?;
            return Ok(FileOutcome::Skipped {
                total_rows: filtered.total_rows,
            });
        }

        let selected = filtered.selected.len();
        let file_max = filtered.max_system_timestamp;

        self.store
            .load_staging(&filtered.into_batch())
            .await
            .map_err(|e| (stage, e))?;
        stage = FileState::Loaded;
        debug!(state = %stage, rows = selected);

        let merge = self.store.merge_staging().await.map_err(|e| (stage, e))?;
        stage = FileState::Merged;
        debug!(state = %stage);

        let candidate = file_max.map_or(current, |file_max| current.max(file_max));
        stage = FileState::CheckpointComputed;
        debug!(state = %stage, candidate = %candidate);

        self.store
            .advance_checkpoint(&self.settings.pipeline_name, candidate)
            .await
            .map_err(|e| (stage, e))?;
        self.store.commit().await.map_err(|e| (stage, e))?;
        debug!(state = %FileState::Committed);

        Ok(FileOutcome::Committed {
            selected,
            merge,
            checkpoint: candidate,
        })
    }
}

fn log_outcome(path: &Path, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Committed {
            selected,
            merge,
            checkpoint,
        } => info!(
            file = %path.display(),
            selected = *selected,
            inserted = merge.inserted,
            updated = merge.updated,
            unchanged = merge.unchanged,
            checkpoint = %checkpoint,
            "File committed"
        ),
        FileOutcome::Skipped { total_rows } => info!(
            file = %path.display(),
            total_rows = *total_rows,
            "No rows newer than checkpoint, file skipped"
        ),
        FileOutcome::Failed { stage, error } => error!(
            file = %path.display(),
            stage = %stage,
            error = %error,
            "File failed and was rolled back"
        ),
    }
}
