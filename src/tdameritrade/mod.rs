//! TD Ameritrade API integration
//!
//! Market data only: underlying quotes and option chains.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::{Credentials, TokenManager};
pub use client::{classify_status, TdAmeritradeClient};
