use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Price observation entity - one index price reading for a ticker
///
/// Rows are insert-only: created once per successful fetch, never updated.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::price_ticks)]
#[diesel(primary_key(id))]
pub struct PriceObservation {
    /// Auto-incrementing ID assigned on insert
    pub id: i64,

    /// Instrument and quote currency (e.g., "BTC_usd")
    pub ticker: String,

    /// Index price reported by the provider
    pub price: f64,

    /// Unix timestamp (seconds) when the price was accepted
    pub observed_at: i64,
}

/// New observation for insertion
#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::database::schema::price_ticks)]
pub struct NewPriceObservation {
    pub ticker: String,
    pub price: f64,
    pub observed_at: i64,
}

impl NewPriceObservation {
    pub fn new(ticker: impl Into<String>, price: f64, observed_at: i64) -> Self {
        Self {
            ticker: ticker.into(),
            price,
            observed_at,
        }
    }

    /// Ticker for an instrument quoted in USD, e.g. "BTC" -> "BTC_usd"
    pub fn usd_ticker(instrument: &str) -> String {
        format!("{}_usd", instrument)
    }

    /// Price must be finite and non-negative
    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price >= 0.0
    }

    /// Attach the store-assigned ID
    pub fn into_observation(self, id: i64) -> PriceObservation {
        PriceObservation {
            id,
            ticker: self.ticker,
            price: self.price,
            observed_at: self.observed_at,
        }
    }
}
