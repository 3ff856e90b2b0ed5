//! TD Ameritrade API data structures

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

use crate::error::{ScreenError, ScreenResult};
use crate::{Money, OptionContract, OptionType};

/// The API sends `"NaN"` strings where a greek or IV is undefined
fn number_or_nan<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s.parse().unwrap_or(f64::NAN),
    })
}

/// OAuth token response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Seconds
    pub expires_in: u64,
}

/// Entry of the quotes endpoint, keyed by symbol
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteEntry {
    #[serde(deserialize_with = "number_or_nan")]
    pub bid_price: f64,
    #[serde(deserialize_with = "number_or_nan")]
    pub ask_price: f64,
}

/// expiration key ("YYYY-MM-DD:dte") -> strike key -> contracts
pub type ExpDateMap = HashMap<String, HashMap<String, Vec<ContractEntry>>>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainResponse {
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub call_exp_date_map: ExpDateMap,
    #[serde(default)]
    pub put_exp_date_map: ExpDateMap,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEntry {
    pub put_call: String,
    pub symbol: String,
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "number_or_nan")]
    pub bid: f64,
    #[serde(deserialize_with = "number_or_nan")]
    pub ask: f64,
    #[serde(default)]
    pub total_volume: u64,
    #[serde(deserialize_with = "number_or_nan")]
    pub volatility: f64,
    #[serde(deserialize_with = "number_or_nan")]
    pub delta: f64,
    #[serde(default)]
    pub open_interest: u64,
    pub days_to_expiration: i64,
    pub in_the_money: bool,
    pub strike_price: f64,
}

impl ContractEntry {
    fn into_contract(self, expiration: NaiveDate) -> ScreenResult<OptionContract> {
        let option_type = match self.put_call.as_str() {
            "CALL" => OptionType::Call,
            "PUT" => OptionType::Put,
            other => {
                return Err(ScreenError::parse(format!(
                    "unknown putCall '{}' on {}",
                    other, self.symbol
                )))
            }
        };

        Ok(OptionContract {
            option_type,
            symbol: self.symbol,
            description: self.description,
            strike: Money::from_f64(self.strike_price),
            expiration,
            days_to_expiration: self.days_to_expiration,
            in_the_money: self.in_the_money,
            bid: Money::from_f64(self.bid),
            ask: Money::from_f64(self.ask),
            volatility: self.volatility,
            delta: self.delta,
            volume: self.total_volume,
            open_interest: self.open_interest,
        })
    }
}

fn parse_expiration_key(key: &str) -> ScreenResult<NaiveDate> {
    let date = key.split(':').next().unwrap_or(key);
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| ScreenError::parse(format!("bad expiration key '{}': {}", key, e)))
}

impl ChainResponse {
    /// Flatten both maps into contracts ordered by expiration, strike, calls first
    pub fn into_contracts(self) -> ScreenResult<Vec<OptionContract>> {
        let mut contracts = Vec::new();

        for map in [self.call_exp_date_map, self.put_exp_date_map] {
            for (exp_key, strikes) in map {
                let expiration = parse_expiration_key(&exp_key)?;
                for entry in strikes.into_values().flatten() {
                    contracts.push(entry.into_contract(expiration)?);
                }
            }
        }

        contracts.sort_by(|a, b| {
            a.expiration
                .cmp(&b.expiration)
                .then(a.strike.cmp(&b.strike))
                .then((a.option_type == OptionType::Put).cmp(&(b.option_type == OptionType::Put)))
        });

        Ok(contracts)
    }
}
