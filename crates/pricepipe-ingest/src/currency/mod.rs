//! Currency and exchange-rate refresh
//!
//! Feeds `public.currencies` and `public.currency_conversion_rates`, which the
//! NOK price view joins against.

pub mod client;
pub mod job;
pub mod models;
pub mod storage;

pub use client::CurrencyApiClient;
pub use job::{CurrencyData, CurrencyJob, CurrencySummary};
pub use models::{Currency, ExchangeRate};
