// Library Crate Root
// lib.rs

// The binaries in src/bin and main.rs import everything through this crate root
pub mod aggregation;
pub mod api;
pub mod app;
pub mod config;
pub mod database;
pub mod ingestion;
pub mod jobs;
pub mod provider;
pub mod rabbitmq;

// pub use = re-export at crate root
pub use aggregation::{MovingAverageConsumer, MovingAverageService};
pub use api::{create_router, ApiState};
pub use config::AppConfig;
pub use ingestion::IngestionExecutor;
pub use jobs::PollingScheduler;
