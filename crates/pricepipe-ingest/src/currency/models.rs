//! Currency and exchange-rate rows, validated from raw API values

use serde_json::Value;
use sqlx::types::BigDecimal;
use std::str::FromStr;

use crate::error::{IngestError, IngestResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Currency {
    pub code: String,
    pub name: String,
    pub symbol: Option<String>,
}

impl Currency {
    /// Validate one `/currencies` entry: `{ "name": string, "symbol": string | null }`
    pub fn from_api(code: &str, data: &Value) -> IngestResult<Self> {
        let invalid = |message: &str| IngestError::validation("currency", code, message);

        if code.trim().is_empty() {
            return Err(invalid("code is empty"));
        }

        let name = match data.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(_) => return Err(invalid("name is not a string")),
            None => return Err(invalid("name is missing")),
        };

        let symbol = match data.get("symbol") {
            None | Some(Value::Null) => None,
            Some(Value::String(symbol)) => Some(symbol.clone()),
            Some(_) => return Err(invalid("symbol is not a string")),
        };

        Ok(Self {
            code: code.to_string(),
            name,
            symbol,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRate {
    pub base_currency: String,
    pub target_currency: String,
    pub exchange_rate: BigDecimal,
}

impl ExchangeRate {
    /// Validate one `/rates` entry; the rate must be a number greater than zero
    pub fn from_api(base: &str, target: &str, rate: &Value) -> IngestResult<Self> {
        let key = format!("{}->{}", base, target);

        let number = match rate {
            Value::Number(number) => number,
            _ => return Err(IngestError::validation("exchange rate", key, "rate is not a number")),
        };

        let exchange_rate = BigDecimal::from_str(&number.to_string())
            .map_err(|e| IngestError::validation("exchange rate", key.clone(), e.to_string()))?;

        if exchange_rate <= BigDecimal::from(0) {
            return Err(IngestError::validation(
                "exchange rate",
                key,
                "rate must be greater than zero",
            ));
        }

        Ok(Self {
            base_currency: base.to_string(),
            target_currency: target.to_string(),
            exchange_rate,
        })
    }
}
