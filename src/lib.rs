// Library Crate Root
// lib.rs

// main.rs imports through lib.rs like an external crate
pub mod api;
pub mod config;
pub mod database;
pub mod jobs;
pub mod provider;

#[cfg(test)]
pub(crate) mod test_support;

// pub use = re-export at crate root
pub use api::{create_router, AppState};
pub use config::{ConfigError, Settings};
pub use database::{ObservationSink, PriceObservationRepository, StoreError};
pub use jobs::{FetchAndPersistPipeline, FetchOutcome, InvocationError, RecurringTaskTrigger};
pub use provider::{DeribitClient, PriceQuote, ProviderError, QuoteSource};
