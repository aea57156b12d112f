/// Database module for the PostgreSQL price store
///
/// This module provides:
/// - Connection pooling and embedded migrations
/// - Schema and models for jobs, raw responses, price points and averages
/// - Repository traits with Diesel and in-memory implementations

pub mod connection;
pub mod enums;
pub mod models;
pub mod repositories;
pub mod schema;

pub use connection::{
    establish_connection_pool, get_conn, run_migrations, DatabaseError, PgPool, PgPooledConnection,
};
pub use enums::ProviderKind;
