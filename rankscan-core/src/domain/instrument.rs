//! Instrument identity — code, name, market segment.

use serde::{Deserialize, Serialize};

/// Market segment an instrument is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Market {
    Kospi,
    Kosdaq,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Kospi => "KOSPI",
            Market::Kosdaq => "KOSDAQ",
        }
    }
}

/// Market filter used by ranking and alert queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketFilter {
    #[default]
    All,
    Kospi,
    Kosdaq,
}

impl MarketFilter {
    /// Whether an instrument in `market` passes this filter.
    pub fn matches(&self, market: Market) -> bool {
        match self {
            MarketFilter::All => true,
            MarketFilter::Kospi => market == Market::Kospi,
            MarketFilter::Kosdaq => market == Market::Kosdaq,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketFilter::All => "ALL",
            MarketFilter::Kospi => "KOSPI",
            MarketFilter::Kosdaq => "KOSDAQ",
        }
    }
}

/// Immutable instrument identity. Looked up by `code`; never mutated
/// after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub code: String,
    pub name: String,
    pub market: Market,
}

impl Instrument {
    pub fn new(code: impl Into<String>, name: impl Into<String>, market: Market) -> Self {
        Self { code: code.into(), name: name.into(), market }
    }
}
