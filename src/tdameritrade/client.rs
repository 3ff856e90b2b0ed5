//! TD Ameritrade market data client
//!
//! Blocking HTTP client implementing [`QuoteSource`] with:
//! - OAuth access token refreshed from a long-lived refresh token
//! - Client-side token bucket so a scan stays under the remote quota
//! - Status mapping into the screening error taxonomy

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::auth::{Credentials, TokenManager};
use super::types::{ChainResponse, QuoteEntry};
use crate::common::{RateLimiter, RateLimiterConfig};
use crate::config::ApiConfig;
use crate::error::{ScreenError, ScreenResult};
use crate::source::{ChainRequest, QuoteSource};
use crate::{Money, OptionContract, QuoteSnapshot, Symbol};

/// Map a non-success HTTP status onto the error taxonomy
pub fn classify_status(status: StatusCode, body: String) -> ScreenError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ScreenError::RateLimited,
        StatusCode::NOT_FOUND => ScreenError::NotFound(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ScreenError::Auth(body),
        other => ScreenError::Api {
            status: other.as_u16(),
            message: body,
        },
    }
}

pub struct TdAmeritradeClient {
    http: Client,
    base_url: String,
    auth: TokenManager,
    rate_limiter: RateLimiter,
}

impl TdAmeritradeClient {
    /// Build a client from config; credentials must already be resolved
    pub fn new(config: &ApiConfig) -> ScreenResult<Self> {
        let client_id = config.client_id.clone().ok_or_else(|| {
            ScreenError::Config(format!("{} is not set", crate::config::ENV_CLIENT_ID))
        })?;
        let refresh_token = config.refresh_token.clone().ok_or_else(|| {
            ScreenError::Config(format!("{} is not set", crate::config::ENV_REFRESH_TOKEN))
        })?;

        if config.requests_per_minute == 0 {
            return Err(ScreenError::Config(
                "requests_per_minute must be at least 1".to_string(),
            ));
        }

        let http = Client::builder().timeout(config.timeout()).build()?;
        let rate_limiter = RateLimiter::new(
            RateLimiterConfig::default()
                .with_rate(config.requests_per_minute as usize)
                .with_refill_interval(Duration::from_secs(60)),
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: TokenManager::new(Credentials::new(client_id, refresh_token), &config.token_url),
            rate_limiter,
        })
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ScreenResult<T> {
        let token = self.auth.access_token(&self.http)?;
        self.rate_limiter.acquire();

        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self.http.get(&url).bearer_auth(token).query(query).send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json()?);
        }

        let body = response
            .text()
            .unwrap_or_else(|_| "Unknown error".to_string());
        if status == StatusCode::UNAUTHORIZED {
            self.auth.invalidate();
        }
        warn!("GET {} failed with {}", path, status);
        Err(classify_status(status, body))
    }
}

impl QuoteSource for TdAmeritradeClient {
    fn get_quote(&self, symbol: &Symbol) -> ScreenResult<QuoteSnapshot> {
        let path = format!("/marketdata/{}/quotes", symbol);
        let mut quotes: HashMap<String, QuoteEntry> = self.get(&path, &[])?;

        let entry = quotes
            .remove(symbol.as_str())
            .ok_or_else(|| ScreenError::NotFound(format!("no quote for {}", symbol)))?;

        Ok(QuoteSnapshot {
            bid: Money::from_f64(entry.bid_price),
            ask: Money::from_f64(entry.ask_price),
        })
    }

    fn get_options_chain(
        &self,
        symbol: &Symbol,
        request: &ChainRequest,
    ) -> ScreenResult<Vec<OptionContract>> {
        let query = [
            ("symbol", symbol.to_string()),
            ("fromDate", request.from.format("%Y-%m-%d").to_string()),
            ("toDate", request.to.format("%Y-%m-%d").to_string()),
            ("strikeCount", request.strike_count.to_string()),
            (
                "includeQuotes",
                if request.include_quotes { "TRUE" } else { "FALSE" }.to_string(),
            ),
        ];
        let response: ChainResponse = self.get("/marketdata/chains", &query)?;

        if response.status != "SUCCESS" {
            return Err(ScreenError::NotFound(format!(
                "chain status {} for {} between {} and {}",
                response.status, symbol, request.from, request.to
            )));
        }

        let contracts = response.into_contracts()?;
        if contracts.is_empty() {
            return Err(ScreenError::NotFound(format!(
                "no contracts for {} between {} and {}",
                symbol, request.from, request.to
            )));
        }

        Ok(contracts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ScreenError::RateLimited
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "gone".into()),
            ScreenError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            ScreenError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new()),
            ScreenError::Api { status: 502, .. }
        ));
    }

    #[test]
    fn test_new_requires_credentials() {
        let config = ApiConfig::default();
        assert!(matches!(
            TdAmeritradeClient::new(&config),
            Err(ScreenError::Config(_))
        ));
    }

    #[test]
    fn test_new_rejects_zero_request_budget() {
        let config = ApiConfig {
            client_id: Some("ABC123".to_string()),
            refresh_token: Some("refresh".to_string()),
            requests_per_minute: 0,
            ..ApiConfig::default()
        };
        assert!(matches!(
            TdAmeritradeClient::new(&config),
            Err(ScreenError::Config(_))
        ));
    }
}
