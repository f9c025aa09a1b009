//! Batch ingestion data model

use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use uuid::Uuid;

/// One version of an item-price fact, as delivered in a batch file
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ItemPriceRecord {
    pub id: Uuid,
    pub item: String,
    pub price: BigDecimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Version marker assigned upstream; the greatest one wins on merge
    pub system_timestamp: DateTime<Utc>,
}

/// Persisted watermark for one pipeline
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Checkpoint {
    pub pipeline_name: String,
    pub last_system_timestamp: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of looking up (and possibly provisioning) a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointInit {
    pub value: DateTime<Utc>,
    /// True when this call created the record with the sentinel value
    pub seeded: bool,
}

/// The filtered rows of exactly one file
#[derive(Debug, Clone, Default)]
pub struct StagingBatch {
    rows: Vec<ItemPriceRecord>,
}

impl StagingBatch {
    pub fn new(rows: Vec<ItemPriceRecord>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ItemPriceRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What a merge did to the permanent store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Rows present in staging
    pub staged: u64,
    /// Ids that did not exist before
    pub inserted: u64,
    /// Existing rows overwritten by a newer version
    pub updated: u64,
    /// Existing rows kept because they were as new or newer
    pub unchanged: u64,
}

impl MergeStats {
    pub fn from_flags(staged: u64, inserted_flags: &[bool]) -> Self {
        let inserted = inserted_flags.iter().filter(|inserted| **inserted).count() as u64;
        let updated = inserted_flags.len() as u64 - inserted;

        Self {
            staged,
            inserted,
            updated,
            unchanged: staged.saturating_sub(inserted + updated),
        }
    }
}
