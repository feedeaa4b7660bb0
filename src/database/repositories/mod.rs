/// Repository implementations behind capability traits
///
/// The pipeline depends on `ObservationSink`, not on diesel.

pub mod price_observation_repository;

pub use price_observation_repository::{
    CommitHook, ObservationSink, PriceObservationRepository, StoreError,
};
