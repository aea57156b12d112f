use crate::database::connection::DatabaseError;
use crate::database::models::SymbolAverage;
use crate::database::repositories::ConnectionProvider;
use crate::database::schema::symbol_averages;
use crate::database::PgPooledConnection;
use diesel::prelude::*;
use diesel::upsert::excluded;
use std::sync::Arc;

/// Moving average repository
pub trait AverageRepository: Send + Sync {
    /// Insert or replace the average for `average.symbol`
    fn upsert(&self, average: SymbolAverage) -> Result<SymbolAverage, DatabaseError>;

    fn find(&self, symbol: &str) -> Result<Option<SymbolAverage>, DatabaseError>;
}

/// Concrete implementation of AverageRepository
pub struct AverageRepositoryImpl {
    get_conn: ConnectionProvider,
}

impl AverageRepositoryImpl {
    /// Create new average repository with connection provider
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
        }
    }
}

impl AverageRepository for AverageRepositoryImpl {
    fn upsert(&self, average: SymbolAverage) -> Result<SymbolAverage, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        // Single INSERT .. ON CONFLICT (symbol) DO UPDATE
        diesel::insert_into(symbol_averages::table)
            .values(&average)
            .on_conflict(symbol_averages::symbol)
            .do_update()
            .set((
                symbol_averages::moving_average.eq(excluded(symbol_averages::moving_average)),
                symbol_averages::last_updated_at.eq(excluded(symbol_averages::last_updated_at)),
            ))
            .returning(SymbolAverage::as_returning())
            .get_result(&mut conn)
            .map_err(DatabaseError::from)
    }

    fn find(&self, symbol: &str) -> Result<Option<SymbolAverage>, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        symbol_averages::table
            .filter(symbol_averages::symbol.eq(symbol))
            .select(SymbolAverage::as_select())
            .first(&mut conn)
            .optional()
            .map_err(DatabaseError::from)
    }
}
