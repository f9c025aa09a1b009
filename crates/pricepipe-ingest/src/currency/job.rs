//! Currency refresh job
//!
//! Fetches currencies and per-base exchange rates, drops entries that fail
//! validation, optionally snapshots both sets as CSV, and upserts each
//! relation in its own transaction.

use serde_json::Value;
use sqlx::PgPool;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::client::CurrencyApiClient;
use super::models::{Currency, ExchangeRate};
use super::storage;
use crate::config::PipelineConfig;
use crate::db;
use crate::error::{IngestError, IngestResult};

pub const CURRENCIES_SNAPSHOT: &str = "currencies.csv";
pub const RATES_SNAPSHOT: &str = "currency_conversion_rates.csv";

/// Validated result of talking to the rate service
#[derive(Debug, Clone, Default)]
pub struct CurrencyData {
    pub currencies: Vec<Currency>,
    pub rates: Vec<ExchangeRate>,
    pub invalid_currencies: usize,
    pub invalid_rates: usize,
    /// Base currencies whose rates could not be fetched
    pub failed_bases: Vec<String>,
}

#[derive(Debug, Default)]
pub struct CurrencySummary {
    pub data_currencies: usize,
    pub data_rates: usize,
    /// Rows written, or `None` when that table's load was rolled back
    pub currencies_upserted: Option<u64>,
    pub rates_upserted: Option<u64>,
    pub failed_bases: Vec<String>,
}

/// Keep the currencies that validate, sorted by code
pub fn validate_currencies(raw: HashMap<String, Value>) -> (Vec<Currency>, usize) {
    let mut valid = Vec::with_capacity(raw.len());
    let mut invalid = 0;

    for (code, data) in &raw {
        match Currency::from_api(code, data) {
            Ok(currency) => valid.push(currency),
            Err(e) => {
                error!(code = %code, error = %e, "Invalid currency, it will not be updated");
                invalid += 1;
            },
        }
    }

    valid.sort_by(|a, b| a.code.cmp(&b.code));
    (valid, invalid)
}

/// Keep the rates from `base` that validate and point at a known currency
pub fn validate_rates(
    base: &str,
    raw: HashMap<String, Value>,
    known: &BTreeSet<String>,
) -> (Vec<ExchangeRate>, usize) {
    let mut valid = Vec::with_capacity(raw.len());
    let mut invalid = 0;

    for (target, value) in &raw {
        if !known.contains(target) {
            warn!(base = %base, target = %target, "Exchange rate targets an unknown currency");
            invalid += 1;
            continue;
        }

        match ExchangeRate::from_api(base, target, value) {
            Ok(rate) => valid.push(rate),
            Err(e) => {
                warn!(base = %base, target = %target, error = %e, "Exchange rate is invalid");
                invalid += 1;
            },
        }
    }

    valid.sort_by(|a, b| a.target_currency.cmp(&b.target_currency));
    (valid, invalid)
}

/// Fetch and validate everything the job loads. A failed base is logged and skipped.
pub async fn fetch_currency_data(client: &CurrencyApiClient) -> IngestResult<CurrencyData> {
    let (currencies, invalid_currencies) = validate_currencies(client.fetch_currencies().await?);
    let known: BTreeSet<String> = currencies.iter().map(|c| c.code.clone()).collect();

    let mut data = CurrencyData {
        invalid_currencies,
        ..Default::default()
    };

    for base in &known {
        match client.fetch_base_rates(base).await {
            Ok(raw) => {
                let (rates, invalid) = validate_rates(base, raw, &known);
                data.rates.extend(rates);
                data.invalid_rates += invalid;
            },
            Err(e) => {
                error!(base = %base, error = %e, "Failed to retrieve rates for base currency");
                data.failed_bases.push(base.clone());
            },
        }
    }

    data.currencies = currencies;
    Ok(data)
}

/// Write both CSV snapshots into `dir`, creating it if needed
pub async fn write_snapshots(dir: &Path, data: &CurrencyData) -> IngestResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(CURRENCIES_SNAPSHOT), storage::currencies_csv(&data.currencies)?).await?;
    tokio::fs::write(dir.join(RATES_SNAPSHOT), storage::rates_csv(&data.rates)?).await?;
    Ok(())
}

pub struct CurrencyJob {
    client: CurrencyApiClient,
    pool: PgPool,
    snapshot_dir: Option<PathBuf>,
}

impl CurrencyJob {
    pub fn new(client: CurrencyApiClient, pool: PgPool, snapshot_dir: Option<PathBuf>) -> Self {
        Self {
            client,
            pool,
            snapshot_dir,
        }
    }

    /// Build the client and open the job's connection from `config`
    pub async fn connect(config: &PipelineConfig) -> IngestResult<Self> {
        let client = CurrencyApiClient::new(&config.currency.api_url, config.currency.request_timeout())?;
        let pool = db::connect(&config.connection, config.connect_timeout()).await?;
        Ok(Self::new(client, pool, config.currency.snapshot_dir.clone()))
    }

    /// Run the job and close its connection, whatever the outcome
    pub async fn run(self) -> IngestResult<CurrencySummary> {
        let result = self.refresh().await;
        self.pool.close().await;
        info!("Currency job connection closed");
        result
    }

    async fn refresh(&self) -> IngestResult<CurrencySummary> {
        info!(api = %self.client.base_url(), "Starting currency task");
        let data = fetch_currency_data(&self.client).await?;

        info!(
            currencies = data.currencies.len(),
            rates = data.rates.len(),
            invalid_currencies = data.invalid_currencies,
            invalid_rates = data.invalid_rates,
            failed_bases = data.failed_bases.len(),
            "Fetched currency data"
        );

        if let Some(dir) = &self.snapshot_dir {
            if let Err(e) = write_snapshots(dir, &data).await {
                warn!(dir = %dir.display(), error = %e, "Could not write currency snapshots");
            }
        }

        let currencies_upserted = self
            .load_table(Table::Currencies, storage::currencies_csv(&data.currencies)?)
            .await?;
        let rates_upserted = self
            .load_table(Table::Rates, storage::rates_csv(&data.rates)?)
            .await?;

        Ok(CurrencySummary {
            data_currencies: data.currencies.len(),
            data_rates: data.rates.len(),
            currencies_upserted,
            rates_upserted,
            failed_bases: data.failed_bases,
        })
    }

    /// Load one relation in its own transaction. Recoverable failures are
    /// logged and reported as `None`.
    async fn load_table(&self, table: Table, csv: Vec<u8>) -> IngestResult<Option<u64>> {
        let result = async {
            let mut tx = self.pool.begin().await?;
            let rows = match table {
                Table::Currencies => storage::upsert_currencies(&mut tx, &csv).await?,
                Table::Rates => storage::upsert_rates(&mut tx, &csv).await?,
            };
            tx.commit().await?;
            Ok::<_, IngestError>(rows)
        }
        .await;

        match result {
            Ok(rows) => {
                info!(table = table.name(), rows, "Table upserted successfully");
                Ok(Some(rows))
            },
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(table = table.name(), error = %e, "Error while upserting table, rolled back");
                Ok(None)
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Table {
    Currencies,
    Rates,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Table::Currencies => "currencies",
            Table::Rates => "currency_conversion_rates",
        }
    }
}
