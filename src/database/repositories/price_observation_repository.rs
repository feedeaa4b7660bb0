use crate::database::connection::{DatabaseError, PgPooledConnection};
use crate::database::models::{NewPriceObservation, PriceObservation};
use crate::database::schema::price_ticks;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors surfaced by an [`ObservationSink`]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The insert transaction failed and was rolled back
    #[error("Write failed: {0}")]
    WriteFailed(#[source] DatabaseError),

    /// No connection could be acquired at all
    #[error("Store unavailable: {0}")]
    Unavailable(#[source] DatabaseError),
}

/// Callback run once a write has committed
///
/// Runs even if the caller stopped waiting for the write. Dropped uncalled when
/// the write rolls back.
pub type CommitHook = Box<dyn FnOnce(&PriceObservation) + Send>;

/// Destination for accepted price observations
///
/// Each `save` is its own unit of work: one transaction, one row.
#[async_trait::async_trait]
pub trait ObservationSink: Send + Sync {
    /// Insert one observation, returning it with its assigned ID
    async fn save(
        &self,
        ticker: &str,
        price: f64,
        observed_at: i64,
    ) -> Result<PriceObservation, StoreError> {
        self.save_with_hook(ticker, price, observed_at, Box::new(|_: &PriceObservation| {}))
            .await
    }

    /// Like `save`, calling `on_commit` right after the transaction commits
    async fn save_with_hook(
        &self,
        ticker: &str,
        price: f64,
        observed_at: i64,
        on_commit: CommitHook,
    ) -> Result<PriceObservation, StoreError>;

    /// Verify that the store can hand out a connection
    async fn check_ready(&self) -> Result<(), StoreError>;
}

type ConnectionProvider = dyn Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync;

/// PostgreSQL implementation of ObservationSink
pub struct PriceObservationRepository {
    get_conn: Arc<ConnectionProvider>,
}

impl PriceObservationRepository {
    /// Create new repository with connection provider
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
        }
    }
}

/// Insert inside a transaction that rolls back if `cancel` fired before commit
fn insert_observation(
    conn: &mut PgConnection,
    new_observation: &NewPriceObservation,
    cancel: &CancellationToken,
) -> Result<PriceObservation, DatabaseError> {
    conn.transaction::<_, DatabaseError, _>(|conn| {
        let inserted = diesel::insert_into(price_ticks::table)
            .values(new_observation)
            .get_result::<PriceObservation>(conn)?;

        if cancel.is_cancelled() {
            return Err(DatabaseError::TransactionAborted);
        }

        Ok(inserted)
    })
}

#[async_trait::async_trait]
impl ObservationSink for PriceObservationRepository {
    async fn save_with_hook(
        &self,
        ticker: &str,
        price: f64,
        observed_at: i64,
        on_commit: CommitHook,
    ) -> Result<PriceObservation, StoreError> {
        let new_observation = NewPriceObservation::new(ticker, price, observed_at);
        let get_conn = Arc::clone(&self.get_conn);

        // Dropping this future (time limit hit) cancels the token via the guard
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();

        let result = tokio::task::spawn_blocking(move || {
            let mut conn = get_conn()?;
            if cancel.is_cancelled() {
                return Err(DatabaseError::TransactionAborted);
            }
            let inserted = insert_observation(&mut conn, &new_observation, &cancel)?;
            on_commit(&inserted);
            Ok(inserted)
        })
        .await;

        guard.disarm();

        match result {
            Ok(Ok(inserted)) => {
                tracing::debug!(
                    "Inserted observation {} ({} = {})",
                    inserted.id,
                    inserted.ticker,
                    inserted.price
                );
                Ok(inserted)
            }
            Ok(Err(e)) => Err(StoreError::WriteFailed(e)),
            Err(e) => Err(StoreError::WriteFailed(DatabaseError::TaskFailed(e.to_string()))),
        }
    }

    async fn check_ready(&self) -> Result<(), StoreError> {
        let get_conn = Arc::clone(&self.get_conn);

        match tokio::task::spawn_blocking(move || get_conn().map(|_| ())).await {
            Ok(result) => result.map_err(StoreError::Unavailable),
            Err(e) => Err(StoreError::Unavailable(DatabaseError::TaskFailed(
                e.to_string(),
            ))),
        }
    }
}
