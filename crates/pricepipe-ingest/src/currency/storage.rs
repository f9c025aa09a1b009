//! Currency relations
//!
//! Both tables are refreshed the same way: validated rows are rendered as CSV,
//! streamed with `COPY` into a temporary table that lives until commit, then
//! upserted. Unlike item prices there is no recency rule; the latest fetch
//! always overwrites.

use sqlx::PgConnection;

use super::models::{Currency, ExchangeRate};
use crate::error::{IngestError, IngestResult};

const CREATE_CURRENCIES: &str = r#"
    CREATE TABLE IF NOT EXISTS public.currencies (
        code TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        symbol TEXT
    )
"#;

const CREATE_RATES: &str = r#"
    CREATE TABLE IF NOT EXISTS public.currency_conversion_rates (
        base_currency TEXT REFERENCES public.currencies(code),
        target_currency TEXT REFERENCES public.currencies(code),
        exchange_rate NUMERIC NOT NULL,
        PRIMARY KEY (base_currency, target_currency)
    )
"#;

const CREATE_STAGING_CURRENCIES: &str = r#"
    CREATE TEMPORARY TABLE staging_currencies (
        code TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        symbol TEXT
    ) ON COMMIT DROP
"#;

const CREATE_STAGING_RATES: &str = r#"
    CREATE TEMPORARY TABLE staging_currency_conversion_rates (
        base_currency TEXT,
        target_currency TEXT,
        exchange_rate NUMERIC NOT NULL,
        PRIMARY KEY (base_currency, target_currency)
    ) ON COMMIT DROP
"#;

const UPSERT_CURRENCIES: &str = r#"
    INSERT INTO public.currencies (code, name, symbol)
    SELECT code, name, symbol FROM staging_currencies
    ON CONFLICT (code)
    DO UPDATE SET name = EXCLUDED.name, symbol = EXCLUDED.symbol
"#;

const UPSERT_RATES: &str = r#"
    INSERT INTO public.currency_conversion_rates (base_currency, target_currency, exchange_rate)
    SELECT base_currency, target_currency, exchange_rate FROM staging_currency_conversion_rates
    ON CONFLICT (base_currency, target_currency)
    DO UPDATE SET exchange_rate = EXCLUDED.exchange_rate
"#;

pub const CURRENCY_COLUMNS: [&str; 3] = ["code", "name", "symbol"];
pub const RATE_COLUMNS: [&str; 3] = ["base_currency", "target_currency", "exchange_rate"];

/// Create both currency relations if missing
pub async fn ensure_tables(conn: &mut PgConnection) -> IngestResult<()> {
    sqlx::query(CREATE_CURRENCIES).execute(&mut *conn).await?;
    sqlx::query(CREATE_RATES).execute(&mut *conn).await?;
    Ok(())
}

/// Currencies as CSV with a header row. A missing symbol is an unquoted empty
/// field, which `COPY ... CSV` reads as NULL.
pub fn currencies_csv(currencies: &[Currency]) -> IngestResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CURRENCY_COLUMNS)?;
    for currency in currencies {
        writer.write_record([
            currency.code.as_str(),
            currency.name.as_str(),
            currency.symbol.as_deref().unwrap_or(""),
        ])?;
    }
    writer.into_inner().map_err(|e| IngestError::Io(e.into_error()))
}

pub fn rates_csv(rates: &[ExchangeRate]) -> IngestResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(RATE_COLUMNS)?;
    for rate in rates {
        writer.write_record([
            rate.base_currency.as_str(),
            rate.target_currency.as_str(),
            rate.exchange_rate.to_string().as_str(),
        ])?;
    }
    writer.into_inner().map_err(|e| IngestError::Io(e.into_error()))
}

async fn copy_csv(conn: &mut PgConnection, table: &str, csv: &[u8]) -> IngestResult<u64> {
    let statement = format!("COPY {} FROM STDIN WITH CSV HEADER", table);
    let mut copy = conn.copy_in_raw(&statement).await?;
    copy.send(csv).await?;
    Ok(copy.finish().await?)
}

/// Stage and upsert currencies; run inside the caller's transaction
pub async fn upsert_currencies(conn: &mut PgConnection, csv: &[u8]) -> IngestResult<u64> {
    ensure_tables(conn).await?;
    sqlx::query(CREATE_STAGING_CURRENCIES).execute(&mut *conn).await?;

    let copied = copy_csv(conn, "staging_currencies", csv).await?;
    let upserted = sqlx::query(UPSERT_CURRENCIES).execute(&mut *conn).await?;

    tracing::debug!(copied, upserted = upserted.rows_affected(), "Upserted currencies");
    Ok(upserted.rows_affected())
}

/// Stage and upsert exchange rates; run inside the caller's transaction
pub async fn upsert_rates(conn: &mut PgConnection, csv: &[u8]) -> IngestResult<u64> {
    ensure_tables(conn).await?;
    sqlx::query(CREATE_STAGING_RATES).execute(&mut *conn).await?;

    let copied = copy_csv(conn, "staging_currency_conversion_rates", csv).await?;
    let upserted = sqlx::query(UPSERT_RATES).execute(&mut *conn).await?;

    tracing::debug!(copied, upserted = upserted.rows_affected(), "Upserted exchange rates");
    Ok(upserted.rows_affected())
}
