//! Options Strangle Screener
//!
//! Screens a universe of listed equities for short strangles: estimates each
//! ticker's near-term implied volatility from its options chain, prices a
//! two standard deviation risk band, and searches the chain for
//! delta-balanced call/put pairs whose premium-to-risk ratio beats their
//! average delta.

pub mod common;
pub mod config;
pub mod driver;
pub mod error;
pub mod report;
pub mod risk;
pub mod screener;
pub mod source;
pub mod tdameritrade;
pub mod types;
pub mod universe;
pub mod volatility;

pub use config::Config;
pub use error::{ScreenError, ScreenResult};
pub use types::*;
