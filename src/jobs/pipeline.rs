use crate::database::models::{NewPriceObservation, PriceObservation};
use crate::database::{CommitHook, ObservationSink, StoreError};
use crate::jobs::errors::InvocationError;
use crate::provider::{ProviderError, QuoteSource};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use utoipa::ToSchema;

/// Result of one invocation across a batch of instruments
///
/// Every requested instrument lands in exactly one list, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FetchOutcome {
    /// Instruments fetched and stored
    pub succeeded: Vec<String>,

    /// Instruments whose fetch or store step failed
    pub failed: Vec<String>,
}

impl FetchOutcome {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Instruments committed so far within one tick
///
/// Shared across retry attempts so a retry never persists the same instrument
/// twice. Instruments are recorded from inside the committed write, and writes
/// still in flight are counted so a retry can wait for them to settle.
#[derive(Debug)]
pub struct CommitLedger {
    inner: Arc<LedgerState>,
}

#[derive(Debug)]
struct LedgerState {
    committed: Mutex<HashSet<String>>,
    in_flight: watch::Sender<usize>,
}

impl LedgerState {
    fn record(&self, instrument: &str) {
        self.committed.lock().insert(instrument.to_string());
    }
}

/// One write started under a ledger; released on drop
struct PendingWrite {
    ledger: Arc<LedgerState>,
}

impl PendingWrite {
    fn begin(ledger: Arc<LedgerState>) -> Self {
        ledger.in_flight.send_modify(|count| *count += 1);
        Self { ledger }
    }

    fn committed(&self, instrument: &str) {
        self.ledger.record(instrument);
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        self.ledger.in_flight.send_modify(|count| *count -= 1);
    }
}

impl Default for CommitLedger {
    fn default() -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(LedgerState {
                committed: Mutex::new(HashSet::new()),
                in_flight,
            }),
        }
    }
}

impl CommitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn record(&self, instrument: &str) {
        self.inner.record(instrument);
    }

    pub fn contains(&self, instrument: &str) -> bool {
        self.inner.committed.lock().contains(instrument)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.committed.lock().len()
    }

    /// Writes started under this ledger that have neither committed nor rolled back
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Hook that records `instrument` as soon as its write commits
    ///
    /// The write counts as in flight until the hook is called or dropped.
    pub fn commit_hook(&self, instrument: &str) -> CommitHook {
        let pending = PendingWrite::begin(Arc::clone(&self.inner));
        let instrument = instrument.to_string();
        Box::new(move |_: &PriceObservation| pending.committed(&instrument))
    }

    /// Wait until no write started under this ledger is still in flight
    pub async fn settled(&self) {
        let mut in_flight = self.inner.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = in_flight.wait_for(|count| *count == 0).await;
    }
}

#[derive(Debug, Error)]
enum InstrumentError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] ProviderError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

/// Fetches index prices and persists each one, isolating failures per instrument
pub struct FetchAndPersistPipeline {
    source: Arc<dyn QuoteSource>,
    sink: Arc<dyn ObservationSink>,
    max_concurrency: usize,
}

impl FetchAndPersistPipeline {
    /// Create a sequential pipeline
    pub fn new(source: Arc<dyn QuoteSource>, sink: Arc<dyn ObservationSink>) -> Self {
        Self {
            source,
            sink,
            max_concurrency: 1,
        }
    }

    /// Process up to `max_concurrency` instruments at once
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Run one invocation over `instruments`
    pub async fn run(&self, instruments: &[String]) -> Result<FetchOutcome, InvocationError> {
        self.run_with_ledger(instruments, &CommitLedger::new()).await
    }

    /// Run one invocation, skipping instruments already in `ledger`
    ///
    /// Skipped instruments count as succeeded. Only a store that cannot hand out
    /// a connection at all fails the whole invocation.
    pub async fn run_with_ledger(
        &self,
        instruments: &[String],
        ledger: &CommitLedger,
    ) -> Result<FetchOutcome, InvocationError> {
        self.sink
            .check_ready()
            .await
            .map_err(InvocationError::StoreUnavailable)?;

        let units: Vec<BoxFuture<'_, bool>> = instruments
            .iter()
            .map(|instrument| self.handle(instrument, ledger).boxed())
            .collect();

        // `buffered` yields in input order regardless of completion order
        let results: Vec<bool> = stream::iter(units)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut outcome = FetchOutcome::default();
        for (instrument, ok) in instruments.iter().zip(results) {
            if ok {
                outcome.succeeded.push(instrument.clone());
            } else {
                outcome.failed.push(instrument.clone());
            }
        }

        Ok(outcome)
    }

    async fn handle(&self, instrument: &str, ledger: &CommitLedger) -> bool {
        if ledger.contains(instrument) {
            tracing::debug!("{} already committed this tick, skipping", instrument);
            return true;
        }

        match self.process_instrument(instrument, ledger).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error processing {}: {}", instrument, e);
                false
            }
        }
    }

    async fn process_instrument(
        &self,
        instrument: &str,
        ledger: &CommitLedger,
    ) -> Result<(), InstrumentError> {
        tracing::info!("Fetching price for {}", instrument);

        let quote = self.source.fetch_index_price(instrument).await?;

        let observation = NewPriceObservation::new(
            NewPriceObservation::usd_ticker(instrument),
            quote.index_price,
            Utc::now().timestamp(),
        );
        if !observation.has_valid_price() {
            return Err(ProviderError::MissingField(format!(
                "index_price has no usable value: {}",
                observation.price
            ))
            .into());
        }

        let saved = self
            .sink
            .save_with_hook(
                &observation.ticker,
                observation.price,
                observation.observed_at,
                ledger.commit_hook(instrument),
            )
            .await?;

        tracing::info!(
            "Successfully saved {} price {} (id {})",
            instrument,
            saved.price,
            saved.id
        );

        Ok(())
    }
}
