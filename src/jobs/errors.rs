//! Whole-invocation errors for the fetch cycle
//!
//! Per-instrument failures never show up here; they are absorbed into
//! `FetchOutcome::failed`.

use crate::database::StoreError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvocationError {
    /// The store could not hand out a connection before any instrument ran
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The invocation ran past its time limit and was cancelled
    #[error("Invocation exceeded time limit of {0:?}")]
    TimedOut(Duration),

    /// A previous cycle is still in progress
    #[error("A fetch cycle is already running")]
    AlreadyRunning,

    /// Every attempt for this tick failed
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<InvocationError>,
    },
}

impl InvocationError {
    /// Returns true if another attempt in the same tick may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InvocationError::StoreUnavailable(_) | InvocationError::TimedOut(_)
        )
    }
}
