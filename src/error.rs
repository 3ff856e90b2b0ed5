//! Screening error taxonomy
//!
//! The universe driver decides what to do with a failed ticker purely from
//! the error variant:
//! - `NotFound`: permanent, the ticker is never retried
//! - `RateLimited`: wait and re-attempt the same ticker
//! - everything else: transient, the ticker goes to the retry queue

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScreenError {
    /// No qualifying contract window (or no matching strike pairs) for the ticker
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote quota exhausted (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl ScreenError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Failures that will not clear by retrying
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

impl From<reqwest::Error> for ScreenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ScreenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub type ScreenResult<T> = Result<T, ScreenError>;
