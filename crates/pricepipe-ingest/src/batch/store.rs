//! Store seam for the batch orchestrator
//!
//! The orchestrator drives one transaction per file through [`IngestStore`].
//! [`PgIngestStore`] is the PostgreSQL implementation, composed from the
//! checkpoint, staging and merge modules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use super::models::{CheckpointInit, MergeStats, StagingBatch};
use super::{checkpoint, merge, staging};
use crate::error::{IngestError, IngestResult};

/// Everything the orchestrator needs from persistent storage
#[async_trait]
pub trait IngestStore: Send {
    /// Read the pipeline's watermark, provisioning it with `sentinel` on first use.
    /// Runs and commits on its own, outside any file transaction.
    async fn load_checkpoint(
        &mut self,
        pipeline_name: &str,
        sentinel: DateTime<Utc>,
    ) -> IngestResult<CheckpointInit>;

    /// Ensure the permanent item-price relation exists
    async fn ensure_item_prices(&mut self) -> IngestResult<()>;

    /// Open the transaction one file's work runs in
    async fn begin(&mut self) -> IngestResult<()>;

    async fn reset_staging(&mut self) -> IngestResult<()>;

    async fn load_staging(&mut self, batch: &StagingBatch) -> IngestResult<u64>;

    async fn merge_staging(&mut self) -> IngestResult<MergeStats>;

    async fn advance_checkpoint(
        &mut self,
        pipeline_name: &str,
        value: DateTime<Utc>,
    ) -> IngestResult<()>;

    async fn commit(&mut self) -> IngestResult<()>;

    /// Discard the open transaction, if any
    async fn rollback(&mut self) -> IngestResult<()>;

    /// Release the connection. Called once, at the end of every run.
    async fn close(&mut self);
}

/// PostgreSQL-backed store holding one connection for the whole run
pub struct PgIngestStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgIngestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    fn tx(&mut self) -> IngestResult<&mut PgConnection> {
        self.tx
            .as_mut()
            .map(|tx| &mut **tx)
            .ok_or(IngestError::NoTransaction)
    }
}

#[async_trait]
impl IngestStore for PgIngestStore {
    async fn load_checkpoint(
        &mut self,
        pipeline_name: &str,
        sentinel: DateTime<Utc>,
    ) -> IngestResult<CheckpointInit> {
        let mut tx = self.pool.begin().await?;
        let init = checkpoint::get_or_init(&mut tx, pipeline_name, sentinel).await?;
        tx.commit().await?;
        Ok(init)
    }

    async fn ensure_item_prices(&mut self) -> IngestResult<()> {
        let mut conn = self.pool.acquire().await?;
        merge::ensure_target(&mut conn).await
    }

    async fn begin(&mut self) -> IngestResult<()> {
        if let Some(stale) = self.tx.take() {
            warn!("Discarding a file transaction that was never finished");
            stale.rollback().await?;
        }

        self.tx = Some(self.pool.begin().await?);
        debug!("Began file transaction");
        Ok(())
    }

    async fn reset_staging(&mut self) -> IngestResult<()> {
        staging::reset(self.tx()?).await
    }

    async fn load_staging(&mut self, batch: &StagingBatch) -> IngestResult<u64> {
        staging::load(self.tx()?, batch).await
    }

    async fn merge_staging(&mut self) -> IngestResult<MergeStats> {
        merge::merge(self.tx()?).await
    }

    async fn advance_checkpoint(
        &mut self,
        pipeline_name: &str,
        value: DateTime<Utc>,
    ) -> IngestResult<()> {
        checkpoint::advance(self.tx()?, pipeline_name, value).await
    }

    async fn commit(&mut self) -> IngestResult<()> {
        let tx = self.tx.take().ok_or(IngestError::NoTransaction)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> IngestResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.rollback().await {
            warn!(error = %e, "Rollback on close failed");
        }
        self.pool.close().await;
        debug!("Database connection closed");
    }
}
