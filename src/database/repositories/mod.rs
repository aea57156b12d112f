/// Repository pattern implementations
///
/// Each trait covers one relation group and has a Diesel-backed
/// implementation over the r2d2 pool. Tests run against a shared
/// in-memory implementation instead of PostgreSQL.

pub mod average_repository;
#[cfg(test)]
pub mod in_memory;
pub mod job_repository;
pub mod price_repository;

pub use average_repository::{AverageRepository, AverageRepositoryImpl};
#[cfg(test)]
pub use in_memory::InMemoryStore;
pub use job_repository::{JobRepository, JobRepositoryImpl};
pub use price_repository::{IngestionBatch, PriceRepository, PriceRepositoryImpl};

use crate::database::connection::{DatabaseError, PgPooledConnection};
use std::sync::Arc;

/// Connection provider shared by the Diesel-backed repositories
pub type ConnectionProvider =
    Arc<dyn Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync>;
