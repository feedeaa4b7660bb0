use crate::config::ScheduleConfig;
use crate::jobs::errors::InvocationError;
use crate::jobs::pipeline::{CommitLedger, FetchAndPersistPipeline, FetchOutcome};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Trigger lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerState {
    /// Waiting for the next tick
    Idle,
    /// Pipeline invocation in progress
    Running,
    /// Waiting out the delay before another attempt
    Retrying,
}

/// What happened on one tick
#[derive(Debug)]
pub enum TickReport {
    /// Pipeline returned an outcome (possibly with per-instrument failures)
    Completed { outcome: FetchOutcome, attempts: u32 },
    /// A previous run was still in progress
    Skipped,
    /// Every attempt failed as a whole
    Abandoned { error: InvocationError },
}

/// Resets the trigger to Idle however the run ends, including cancellation
struct RunGuard<'a> {
    state: &'a Mutex<TriggerState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = TriggerState::Idle;
    }
}

/// Recurring fetch job
///
/// Fires the pipeline on a fixed period with a time limit per attempt and a
/// fixed-delay retry policy for whole-invocation failures. Ticks that arrive
/// while a run is in progress are skipped, not queued.
pub struct RecurringTaskTrigger {
    pipeline: Arc<FetchAndPersistPipeline>,
    instruments: Vec<String>,
    schedule: ScheduleConfig,
    state: Mutex<TriggerState>,
}

impl RecurringTaskTrigger {
    pub fn new(
        pipeline: Arc<FetchAndPersistPipeline>,
        instruments: Vec<String>,
        schedule: ScheduleConfig,
    ) -> Self {
        Self {
            pipeline,
            instruments,
            schedule,
            state: Mutex::new(TriggerState::Idle),
        }
    }

    pub fn state(&self) -> TriggerState {
        *self.state.lock()
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        let mut state = self.state.lock();
        if *state != TriggerState::Idle {
            return None;
        }
        *state = TriggerState::Running;
        Some(RunGuard { state: &self.state })
    }

    fn set_state(&self, state: TriggerState) {
        *self.state.lock() = state;
    }

    /// Handle one tick
    pub async fn fire(&self) -> TickReport {
        let invocation_id = Uuid::new_v4();
        let span = tracing::info_span!("fetch_cycle", %invocation_id);

        async {
            let Some(_guard) = self.try_begin() else {
                tracing::warn!("Previous fetch cycle still running, skipping tick");
                return TickReport::Skipped;
            };

            self.run_attempts().await
        }
        .instrument(span)
        .await
    }

    async fn run_attempts(&self) -> TickReport {
        let max_attempts = self.schedule.max_attempts.max(1);
        let time_limit = self.schedule.time_limit();
        let retry_delay = self.schedule.retry_delay();
        let ledger = CommitLedger::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.set_state(TriggerState::Running);

            tracing::info!(
                "Start fetch price task (attempt {}/{}) for {:?}",
                attempt,
                max_attempts,
                self.instruments
            );

            let result = match tokio::time::timeout(
                time_limit,
                self.pipeline.run_with_ledger(&self.instruments, &ledger),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(InvocationError::TimedOut(time_limit)),
            };

            match result {
                Ok(outcome) => {
                    if outcome.all_succeeded() {
                        tracing::info!(
                            "Fetch price task completed: {} instruments stored",
                            outcome.total()
                        );
                    } else {
                        tracing::warn!(
                            "Fetch price task completed with failures ({}/{}). Success: {:?} Failed: {:?}",
                            outcome.failed.len(),
                            outcome.total(),
                            outcome.succeeded,
                            outcome.failed
                        );
                    }
                    return TickReport::Completed {
                        outcome,
                        attempts: attempt,
                    };
                }
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        "Fetch price task failed (attempt {}/{}): {}; retrying in {:?}",
                        attempt,
                        max_attempts,
                        error,
                        retry_delay
                    );
                    self.set_state(TriggerState::Retrying);

                    // A write the time limit cut loose may still commit; let it
                    // land in the ledger before the next attempt reads it
                    if ledger.in_flight() > 0 {
                        tracing::debug!(
                            "Waiting for {} in-flight writes before retrying",
                            ledger.in_flight()
                        );
                        ledger.settled().await;
                    }
                    tracing::debug!("{} instruments committed so far", ledger.len());

                    tokio::time::sleep(retry_delay).await;
                }
                Err(error) => {
                    tracing::error!(
                        "Fetch price task abandoned after {} attempts: {}",
                        attempt,
                        error
                    );
                    return TickReport::Abandoned {
                        error: InvocationError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(error),
                        },
                    };
                }
            }
        }
    }

    /// Run one fetch cycle now (manual or scheduled)
    ///
    /// Honors the same overlap guard, time limit, and retry policy as scheduled ticks.
    pub async fn run_fetch_cycle(&self) -> Result<FetchOutcome, InvocationError> {
        match self.fire().await {
            TickReport::Completed { outcome, .. } => Ok(outcome),
            TickReport::Skipped => Err(InvocationError::AlreadyRunning),
            TickReport::Abandoned { error } => Err(error),
        }
    }

    /// Register this trigger with the scheduler
    ///
    /// Schedule: every `period_secs` seconds
    pub async fn register(
        self: Arc<Self>,
        scheduler: &JobScheduler,
    ) -> Result<Uuid, JobSchedulerError> {
        let period = self.schedule.period();
        let trigger = self;

        let job = Job::new_repeated_async(period, move |_uuid, _lock| {
            let trigger = Arc::clone(&trigger);

            Box::pin(async move {
                trigger.fire().await;
            })
        })?;

        let job_id = scheduler.add(job).await?;

        tracing::info!("Fetch price job registered (runs every {:?})", period);

        Ok(job_id)
    }
}
