//! Checkpointed batch ingestion of item-price files
//!
//! Each run reads the pipeline's checkpoint, then for every input file keeps
//! the rows modified after it, stages them, merges them into
//! `public.item_prices` with last-writer-wins on `system_timestamp`, and
//! advances the checkpoint. All of that happens in one transaction per file.

pub mod checkpoint;
pub mod filter;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod source;
pub mod staging;
pub mod store;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod memory;

pub use filter::{filter_file, filter_records, FilteredFile};
pub use models::{Checkpoint, CheckpointInit, ItemPriceRecord, MergeStats, StagingBatch};
pub use orchestrator::{
    BatchOrchestrator, BatchSettings, BatchState, FileOutcome, FileReport, FileState, RunSummary,
};
pub use store::{IngestStore, PgIngestStore};
