/// Database module for PostgreSQL integration
///
/// This module provides:
/// - Connection pooling and embedded migrations
/// - The `ObservationSink` repository for price observations
/// - Database models and schema
/// - Diesel ORM integration

pub mod connection;
pub mod models;
pub mod repositories;
pub mod schema;

pub use connection::{establish_connection_pool, get_conn, run_migrations, DatabaseError, PgPool};
pub use repositories::{CommitHook, ObservationSink, PriceObservationRepository, StoreError};
