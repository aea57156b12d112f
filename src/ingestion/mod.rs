/// Ingestion of price observations
///
/// The executor turns one polling job into one committed batch of raw
/// responses and price points, then announces the committed points on the
/// event sink.

pub mod executor;

pub use executor::{IngestionExecutor, JobRunReport};

use thiserror::Error;

use crate::database::DatabaseError;
use crate::provider::{ProviderError, ProviderKind};

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("No provider registered for {0}")]
    UnknownProvider(ProviderKind),

    /// Batch rolled back; the job stays due
    #[error("Persistence failure: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("No data found for symbol: {0}")]
    NoData(String),

    #[error(transparent)]
    Provider(ProviderError),

    #[error("Blocking task failed: {0}")]
    TaskJoin(String),
}

impl From<ProviderError> for IngestionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UnknownProvider(kind) => IngestionError::UnknownProvider(kind),
            ProviderError::NoData(symbol) => IngestionError::NoData(symbol),
            other => IngestionError::Provider(other),
        }
    }
}

/// A symbol skipped during a job run
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: ProviderError,
}
