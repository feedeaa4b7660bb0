/// Scheduled jobs
///
/// - `pipeline`: fetch-and-persist over a batch of instruments
/// - `trigger`: recurring fetch job with time limit and retry policy

pub mod errors;
pub mod pipeline;
pub mod trigger;

pub use errors::InvocationError;
pub use pipeline::{CommitLedger, FetchAndPersistPipeline, FetchOutcome};
pub use trigger::{RecurringTaskTrigger, TickReport, TriggerState};
