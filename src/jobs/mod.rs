/// Scheduled background work
///
/// Contains the polling scheduler that runs due polling jobs through the
/// ingestion executor on a fixed tick.

pub mod scheduler;

pub use scheduler::{PollingScheduler, TickReport};
