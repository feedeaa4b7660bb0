//! In-memory quote source and observation sink for unit tests

use crate::database::models::{NewPriceObservation, PriceObservation};
use crate::database::{CommitHook, DatabaseError, ObservationSink, StoreError};
use crate::provider::{PriceQuote, ProviderError, ProviderErrorKind, QuoteSource};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

pub(crate) fn instruments(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Scripted provider answer for one instrument
#[derive(Clone)]
pub(crate) enum Reply {
    Price(f64),
    Fail(ProviderErrorKind),
    /// Answer after a delay
    Delayed(Duration, f64),
    /// Never answer on the first call, answer normally afterwards
    HangFirst(f64),
    /// Answer after a delay on the first call, immediately afterwards
    SlowFirst(Duration, f64),
    /// Answer once the gate is notified
    Gated(Arc<Notify>, f64),
}

#[derive(Default)]
pub(crate) struct MockSource {
    replies: HashMap<String, Reply>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(mut self, instrument: &str, reply: Reply) -> Self {
        self.replies.insert(instrument.to_string(), reply);
        self
    }

    pub(crate) fn calls(&self, instrument: &str) -> usize {
        self.calls.lock().get(instrument).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl QuoteSource for MockSource {
    async fn fetch_index_price(&self, instrument: &str) -> Result<PriceQuote, ProviderError> {
        let call = {
            let mut calls = self.calls.lock();
            let count = calls.entry(instrument.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let reply = self.replies.get(instrument).cloned().unwrap_or(Reply::Fail(
            ProviderErrorKind::Unreachable,
        ));

        let index_price = match reply {
            Reply::Price(price) => price,
            Reply::Fail(kind) => return Err(ProviderError::new(kind, instrument)),
            Reply::Delayed(delay, price) => {
                tokio::time::sleep(delay).await;
                price
            }
            Reply::HangFirst(price) => {
                if call == 1 {
                    std::future::pending::<()>().await;
                }
                price
            }
            Reply::SlowFirst(delay, price) => {
                if call == 1 {
                    tokio::time::sleep(delay).await;
                }
                price
            }
            Reply::Gated(gate, price) => {
                gate.notified().await;
                price
            }
        };

        Ok(PriceQuote { index_price })
    }
}

#[derive(Default)]
pub(crate) struct MockSink {
    rows: Arc<Mutex<Vec<PriceObservation>>>,
    failing_tickers: HashSet<String>,
    unavailable: bool,
    commit_delay: Option<Duration>,
    ready_checks: Mutex<Vec<Instant>>,
}

impl MockSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fail every write for `ticker`
    pub(crate) fn failing_ticker(mut self, ticker: &str) -> Self {
        self.failing_tickers.insert(ticker.to_string());
        self
    }

    /// Fail every readiness check
    pub(crate) fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Commit each write on a detached task after `delay`
    ///
    /// Like a blocking database write, the commit completes even if the caller
    /// stops waiting for it.
    pub(crate) fn commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    pub(crate) fn rows(&self) -> Vec<PriceObservation> {
        self.rows.lock().clone()
    }

    /// Times at which `check_ready` was called
    pub(crate) fn ready_checks(&self) -> Vec<Instant> {
        self.ready_checks.lock().clone()
    }
}

#[async_trait::async_trait]
impl ObservationSink for MockSink {
    async fn save_with_hook(
        &self,
        ticker: &str,
        price: f64,
        observed_at: i64,
        on_commit: CommitHook,
    ) -> Result<PriceObservation, StoreError> {
        if self.failing_tickers.contains(ticker) {
            return Err(StoreError::WriteFailed(DatabaseError::ConnectionFailed(
                "connection reset".to_string(),
            )));
        }

        let new_observation = NewPriceObservation::new(ticker, price, observed_at);
        let rows = Arc::clone(&self.rows);
        let commit = move || {
            let observation = {
                let mut rows = rows.lock();
                let observation = new_observation.into_observation(rows.len() as i64 + 1);
                rows.push(observation.clone());
                observation
            };
            on_commit(&observation);
            observation
        };

        match self.commit_delay {
            Some(delay) => tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                commit()
            })
            .await
            .map_err(|e| StoreError::WriteFailed(DatabaseError::TaskFailed(e.to_string()))),
            None => Ok(commit()),
        }
    }

    async fn check_ready(&self) -> Result<(), StoreError> {
        self.ready_checks.lock().push(Instant::now());

        if self.unavailable {
            return Err(StoreError::Unavailable(DatabaseError::ConnectionPoolError(
                "pool exhausted".to_string(),
            )));
        }

        Ok(())
    }
}
