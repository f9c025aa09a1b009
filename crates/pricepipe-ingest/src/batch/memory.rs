//! In-memory [`IngestStore`] for orchestrator tests
//!
//! Mirrors the transactional behaviour of the PostgreSQL store: work happens on
//! a copy of the committed tables that is swapped in on commit and dropped on
//! rollback. Failures can be injected per item name.
//!
//! Clones share the tables but not the connection: closing one handle only
//! closes that handle, the way a later run opens a fresh pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::models::{CheckpointInit, ItemPriceRecord, MergeStats, StagingBatch};
use super::store::IngestStore;
use crate::error::{IngestError, IngestResult};

#[derive(Debug, Clone, Default)]
struct Tables {
    items: BTreeMap<Uuid, ItemPriceRecord>,
    checkpoints: HashMap<String, DateTime<Utc>>,
    staging: Vec<ItemPriceRecord>,
}

#[derive(Debug, Default)]
struct Inner {
    committed: Tables,
    working: Option<Tables>,
    staged_batches: Vec<Vec<ItemPriceRecord>>,
    fail_merge_on: Option<String>,
    lose_connection_on: Option<String>,
    closes: usize,
}

impl Inner {
    fn working(&mut self) -> IngestResult<&mut Tables> {
        self.working.as_mut().ok_or(IngestError::NoTransaction)
    }
}

/// Outcome of reconciling one staged row against the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeDecision {
    Insert,
    Overwrite,
    Keep,
}

/// Recency rule of the merge statement, for a single id
fn resolve(existing: Option<&ItemPriceRecord>, staged: &ItemPriceRecord) -> MergeDecision {
    match existing {
        None => MergeDecision::Insert,
        Some(current) if current.system_timestamp < staged.system_timestamp => {
            MergeDecision::Overwrite
        },
        Some(_) => MergeDecision::Keep,
    }
}

/// Cloneable handle over shared tables
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    closed: bool,
}

impl Clone for MemoryStore {
    /// A clone is a new, open connection to the same tables
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            closed: false,
        }
    }
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Committed item-price rows
    pub fn items(&self) -> BTreeMap<Uuid, ItemPriceRecord> {
        self.lock().committed.items.clone()
    }

    pub fn checkpoint(&self, pipeline_name: &str) -> Option<DateTime<Utc>> {
        self.lock().committed.checkpoints.get(pipeline_name).copied()
    }

    pub fn set_checkpoint(&self, pipeline_name: &str, value: DateTime<Utc>) {
        self.lock()
            .committed
            .checkpoints
            .insert(pipeline_name.to_string(), value);
    }

    /// Every batch handed to `load_staging`, committed or not
    pub fn staged_history(&self) -> Vec<Vec<ItemPriceRecord>> {
        self.lock().staged_batches.clone()
    }

    /// Make the merge fail whenever a row for `item` is staged
    pub fn fail_merge_for(&self, item: &str) {
        self.lock().fail_merge_on = Some(item.to_string());
    }

    /// Make the merge report a closed connection whenever `item` is staged
    pub fn lose_connection_at(&self, item: &str) {
        self.lock().lose_connection_on = Some(item.to_string());
    }

    /// Whether any handle on these tables has been closed
    pub fn was_closed(&self) -> bool {
        self.close_count() > 0
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    fn ensure_open(&self) -> IngestResult<()> {
        if self.closed {
            return Err(IngestError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn load_checkpoint(
        &mut self,
        pipeline_name: &str,
        sentinel: DateTime<Utc>,
    ) -> IngestResult<CheckpointInit> {
        self.ensure_open()?;
        let mut inner = self.lock();
        let checkpoints = &mut inner.committed.checkpoints;
        let init = match checkpoints.get(pipeline_name) {
            Some(value) => CheckpointInit {
                value: *value,
                seeded: false,
            },
            None => {
                checkpoints.insert(pipeline_name.to_string(), sentinel);
                CheckpointInit {
                    value: sentinel,
                    seeded: true,
                }
            },
        };

        Ok(init)
    }

    async fn ensure_item_prices(&mut self) -> IngestResult<()> {
        self.ensure_open()
    }

    async fn begin(&mut self) -> IngestResult<()> {
        self.ensure_open()?;
        let mut inner = self.lock();
        inner.working = Some(inner.committed.clone());
        Ok(())
    }

    async fn reset_staging(&mut self) -> IngestResult<()> {
        self.lock().working()?.staging.clear();
        Ok(())
    }

    async fn load_staging(&mut self, batch: &StagingBatch) -> IngestResult<u64> {
        let mut inner = self.lock();
        inner.staged_batches.push(batch.rows().to_vec());

        let working = inner.working()?;
        let mut seen: HashSet<Uuid> = working.staging.iter().map(|r| r.id).collect();
        for record in batch.rows() {
            if !seen.insert(record.id) {
                return Err(IngestError::Database(sqlx::Error::Protocol(format!(
                    "duplicate key value violates unique constraint: id {}",
                    record.id
                ))));
            }
            working.staging.push(record.clone());
        }

        Ok(batch.len() as u64)
    }

    async fn merge_staging(&mut self) -> IngestResult<MergeStats> {
        let mut inner = self.lock();
        let fail_on = inner.fail_merge_on.clone();
        let lose_on = inner.lose_connection_on.clone();
        let working = inner.working()?;

        let staged_items = || working.staging.iter().map(|r| r.item.as_str());
        if lose_on.is_some_and(|item| staged_items().any(|i| i == item)) {
            return Err(IngestError::Database(sqlx::Error::PoolClosed));
        }
        if fail_on.is_some_and(|item| staged_items().any(|i| i == item)) {
            return Err(IngestError::Database(sqlx::Error::Protocol(
                "injected merge failure".to_string(),
            )));
        }

        let mut flags = Vec::new();
        for staged in working.staging.clone() {
            match resolve(working.items.get(&staged.id), &staged) {
                MergeDecision::Insert => flags.push(true),
                MergeDecision::Overwrite => flags.push(false),
                MergeDecision::Keep => continue,
            }
            working.items.insert(staged.id, staged);
        }

        Ok(MergeStats::from_flags(working.staging.len() as u64, &flags))
    }

    async fn advance_checkpoint(
        &mut self,
        pipeline_name: &str,
        value: DateTime<Utc>,
    ) -> IngestResult<()> {
        let mut inner = self.lock();
        let checkpoint = inner
            .working()?
            .checkpoints
            .get_mut(pipeline_name)
            .ok_or_else(|| IngestError::CheckpointMissing(pipeline_name.to_string()))?;
        *checkpoint = value;
        Ok(())
    }

    async fn commit(&mut self) -> IngestResult<()> {
        let mut inner = self.lock();
        let working = inner.working.take().ok_or(IngestError::NoTransaction)?;
        inner.committed = working;
        Ok(())
    }

    async fn rollback(&mut self) -> IngestResult<()> {
        self.lock().working = None;
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        let mut inner = self.lock();
        inner.working = None;
        inner.closes += 1;
        drop(inner);
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::types::BigDecimal;

    fn record(day: u32, price: i64) -> ItemPriceRecord {
        let at = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        ItemPriceRecord {
            id: Uuid::from_u128(1),
            item: "apple".to_string(),
            price: BigDecimal::from(price),
            currency: "EUR".to_string(),
            created_at: at,
            updated_at: at,
            system_timestamp: at,
        }
    }

    #[test]
    fn test_absent_id_is_inserted() {
        assert_eq!(resolve(None, &record(1, 1)), MergeDecision::Insert);
    }

    #[test]
    fn test_newer_version_overwrites() {
        assert_eq!(resolve(Some(&record(1, 1)), &record(2, 2)), MergeDecision::Overwrite);
    }

    #[test]
    fn test_older_or_equal_version_is_kept_out() {
        assert_eq!(resolve(Some(&record(2, 2)), &record(1, 1)), MergeDecision::Keep);
        // Equal timestamps never overwrite, even with different content
        assert_eq!(resolve(Some(&record(2, 2)), &record(2, 9)), MergeDecision::Keep);
    }

    #[tokio::test]
    async fn test_closing_a_clone_leaves_other_handles_open() {
        let store = MemoryStore::default();
        let sentinel = Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap();

        let mut first = store.clone();
        first.load_checkpoint("p", sentinel).await.unwrap();
        first.close().await;
        first.close().await;

        let err = first.load_checkpoint("p", sentinel).await.unwrap_err();
        assert!(matches!(err, IngestError::Database(sqlx::Error::PoolClosed)));
        assert!(first.begin().await.is_err());

        let mut second = store.clone();
        let init = second.load_checkpoint("p", sentinel).await.unwrap();
        assert!(!init.seeded);
        assert_eq!(store.close_count(), 1);
    }
}
