//! Incremental filter
//!
//! Parses one batch file and keeps only the rows modified after the current
//! checkpoint. The file's high-water mark is taken over every row, selected or
//! not, but it is only committed when at least one row is selected; a file of
//! already-seen rows is skipped and leaves the checkpoint where it was.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::types::BigDecimal;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use pricepipe_common::timestamp::parse_timestamp;

use super::models::{ItemPriceRecord, StagingBatch};
use crate::error::{IngestError, IngestResult};

/// Raw CSV row; every field is validated separately so errors can name it.
#[derive(Debug, Deserialize)]
struct CsvRow {
    id: String,
    item: String,
    price: String,
    currency: String,
    created_at: String,
    updated_at: String,
    system_timestamp: String,
}

impl CsvRow {
    fn into_record(self, row: usize) -> IngestResult<ItemPriceRecord> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| IngestError::invalid_row(row, "id", e.to_string()))?;

        let price = BigDecimal::from_str(&self.price)
            .map_err(|e| IngestError::invalid_row(row, "price", e.to_string()))?;
        if price < BigDecimal::from(0) {
            return Err(IngestError::invalid_row(row, "price", "price cannot be negative"));
        }

        Ok(ItemPriceRecord {
            id,
            item: self.item,
            price,
            currency: self.currency,
            created_at: timestamp(&self.created_at, row, "created_at")?,
            updated_at: timestamp(&self.updated_at, row, "updated_at")?,
            system_timestamp: timestamp(&self.system_timestamp, row, "system_timestamp")?,
        })
    }
}

fn timestamp(raw: &str, row: usize, column: &'static str) -> IngestResult<DateTime<Utc>> {
    parse_timestamp(raw).map_err(|e| IngestError::invalid_row(row, column, e.to_string()))
}

/// Rows of one file that passed the filter
#[derive(Debug, Clone)]
pub struct FilteredFile {
    pub selected: Vec<ItemPriceRecord>,
    /// Number of data rows in the file, header excluded
    pub total_rows: usize,
    /// Greatest `system_timestamp` of any row; `None` for a file without rows
    pub max_system_timestamp: Option<DateTime<Utc>>,
}

impl FilteredFile {
    /// True when nothing in the file is newer than the checkpoint
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn into_batch(self) -> StagingBatch {
        StagingBatch::new(self.selected)
    }
}

/// Select the rows of a CSV stream whose `updated_at` is after `checkpoint`
pub fn filter_records<R: Read>(reader: R, checkpoint: DateTime<Utc>) -> IngestResult<FilteredFile> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut selected = Vec::new();
    let mut total_rows = 0;
    let mut max_system_timestamp: Option<DateTime<Utc>> = None;

    for (index, result) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = index + 1;
        let record = result?.into_record(row)?;
        total_rows += 1;

        max_system_timestamp = Some(match max_system_timestamp {
            Some(current) => current.max(record.system_timestamp),
            None => record.system_timestamp,
        });

        if record.updated_at > checkpoint {
            selected.push(record);
        }
    }

    Ok(FilteredFile {
        selected,
        total_rows,
        max_system_timestamp,
    })
}

/// Read `path` and filter it against `checkpoint`
pub async fn filter_file(path: &Path, checkpoint: DateTime<Utc>) -> IngestResult<FilteredFile> {
    let contents = tokio::fs::read(path).await.map_err(|source| IngestError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let filtered = filter_records(contents.as_slice(), checkpoint)?;

    tracing::debug!(
        file = %path.display(),
        total_rows = filtered.total_rows,
        selected = filtered.selected.len(),
        "Filtered batch file"
    );

    Ok(filtered)
}
