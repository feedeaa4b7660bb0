/// Price provider module
///
/// - `QuoteSource` capability trait consumed by the fetch pipeline
/// - `DeribitClient` adapter for the Deribit public REST API

pub mod deribit;
pub mod errors;

pub use deribit::{parse_index_price, DeribitClient};
pub use errors::{ProviderError, ProviderErrorKind};

use serde::{Deserialize, Serialize};

/// A single index price reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub index_price: f64,
}

/// Source of current index prices
///
/// Implementations issue exactly one upstream request per call and never retry.
#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch the current USD index price for an instrument (case-insensitive)
    async fn fetch_index_price(&self, instrument: &str) -> Result<PriceQuote, ProviderError>;
}
