//! HTTP client for the rate-quote service
//!
//! Responses are returned as raw JSON values; validation happens in
//! [`super::models`] so a single malformed entry only drops that entry.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{IngestError, IngestResult};

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, Value>,
}

/// Client for the `/currencies` and `/rates` endpoints
pub struct CurrencyApiClient {
    client: Client,
    base_url: String,
}

impl CurrencyApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> IngestResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// All known currencies, keyed by code
    pub async fn fetch_currencies(&self) -> IngestResult<HashMap<String, Value>> {
        let url = format!("{}/currencies", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = check_status(&url, response)?;

        Ok(response.json().await?)
    }

    /// Rates from `base` to every other currency
    pub async fn fetch_base_rates(&self, base: &str) -> IngestResult<HashMap<String, Value>> {
        let url = format!("{}/rates", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("base", base)])
            .send()
            .await?;
        let response = check_status(&url, response)?;

        let body: RatesResponse = response.json().await?;
        Ok(body.rates)
    }
}

fn check_status(url: &str, response: reqwest::Response) -> IngestResult<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(IngestError::Upstream {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}
