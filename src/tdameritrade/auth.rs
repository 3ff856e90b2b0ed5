//! OAuth refresh-token flow for the TD Ameritrade API

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::types::TokenResponse;
use crate::error::{ScreenError, ScreenResult};

const CLIENT_ID_SUFFIX: &str = "@AMER.OAUTHAP";

/// Tokens are refreshed this long before the server says they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Consumer key in the form the token endpoint expects
    pub fn oauth_client_id(&self) -> String {
        if self.client_id.ends_with(CLIENT_ID_SUFFIX) {
            self.client_id.clone()
        } else {
            format!("{}{}", self.client_id, CLIENT_ID_SUFFIX)
        }
    }
}

#[derive(Debug)]
struct AccessToken {
    token: String,
    expires_at: Instant,
}

/// Caches the access token and refreshes it on demand
#[derive(Debug)]
pub struct TokenManager {
    credentials: Credentials,
    token_url: String,
    current: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(credentials: Credentials, token_url: impl Into<String>) -> Self {
        Self {
            credentials,
            token_url: token_url.into(),
            current: Mutex::new(None),
        }
    }

    /// Current access token, refreshing through `http` when missing or stale
    pub fn access_token(&self, http: &reqwest::blocking::Client) -> ScreenResult<String> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(token) = current.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.token.clone());
            }
            debug!("Access token expired, refreshing");
        }

        let fresh = self.refresh(http)?;
        let token = fresh.token.clone();
        *current = Some(fresh);
        Ok(token)
    }

    /// Drop the cached token so the next request re-authenticates
    pub fn invalidate(&self) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn refresh(&self, http: &reqwest::blocking::Client) -> ScreenResult<AccessToken> {
        let client_id = self.credentials.oauth_client_id();
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("client_id", client_id.as_str()),
        ];

        let response = http.post(&self.token_url).form(&params).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ScreenError::Auth(format!(
                "token refresh failed ({}): {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response.json()?;
        info!("Obtained access token (expires in {}s)", token.expires_in);

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        Ok(AccessToken {
            token: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}
