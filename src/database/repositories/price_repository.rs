use crate::database::connection::DatabaseError;
use crate::database::models::{store_now, PricePoint, RawResponse};
use crate::database::repositories::ConnectionProvider;
use crate::database::schema::{polling_jobs, price_points, raw_responses};
use crate::database::PgPooledConnection;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

/// Everything one executor run persists, committed as a single unit
#[derive(Debug, Clone)]
pub struct IngestionBatch {
    /// Owning job; `None` for ad-hoc fetches that must not touch any job
    pub job_id: Option<Uuid>,
    pub raw_responses: Vec<RawResponse>,
    pub price_points: Vec<PricePoint>,
    /// Becomes the job's `last_run_at`
    pub committed_at: DateTime<Utc>,
}

impl IngestionBatch {
    pub fn new(job_id: Option<Uuid>) -> Self {
        Self {
            job_id,
            raw_responses: Vec::new(),
            price_points: Vec::new(),
            committed_at: store_now(),
        }
    }

    /// Stage a raw response together with the price point derived from it
    pub fn stage(&mut self, raw: RawResponse, point: PricePoint) {
        self.raw_responses.push(raw);
        self.price_points.push(point);
    }

    pub fn is_empty(&self) -> bool {
        self.price_points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.price_points.len()
    }
}

/// Price repository - raw responses and price points
pub trait PriceRepository: Send + Sync {
    /// Commit a batch atomically
    ///
    /// Raw responses are inserted before the price points that reference
    /// them. When the batch belongs to a job, the job's `last_run_at` is
    /// advanced to `committed_at` in the same transaction (never moved
    /// backwards). Any error rolls the whole batch back.
    fn commit_batch(&self, batch: &IngestionBatch) -> Result<usize, DatabaseError>;

    /// Most recent `limit` price points by event timestamp, newest first
    fn recent_for_symbol(&self, symbol: &str, limit: i64) -> Result<Vec<PricePoint>, DatabaseError>;

    /// Newest price point by event timestamp
    fn latest_for_symbol(&self, symbol: &str) -> Result<Option<PricePoint>, DatabaseError> {
        Ok(self.recent_for_symbol(symbol, 1)?.into_iter().next())
    }

    fn find_raw_response(&self, id: Uuid) -> Result<Option<RawResponse>, DatabaseError>;
}

/// Concrete implementation of PriceRepository
pub struct PriceRepositoryImpl {
    get_conn: ConnectionProvider,
}

impl PriceRepositoryImpl {
    /// Create new price repository with connection provider
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
        }
    }
}

impl PriceRepository for PriceRepositoryImpl {
    fn commit_batch(&self, batch: &IngestionBatch) -> Result<usize, DatabaseError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut conn = (self.get_conn)()?;

        conn.transaction::<usize, DatabaseError, _>(|conn| {
            diesel::insert_into(raw_responses::table)
                .values(&batch.raw_responses)
                .execute(conn)?;

            let inserted = diesel::insert_into(price_points::table)
                .values(&batch.price_points)
                .execute(conn)?;

            if let Some(job_id) = batch.job_id {
                let updated = diesel::update(
                    polling_jobs::table
                        .filter(polling_jobs::job_id.eq(job_id))
                        .filter(
                            polling_jobs::last_run_at
                                .is_null()
                                .or(polling_jobs::last_run_at.le(batch.committed_at)),
                        ),
                )
                .set(polling_jobs::last_run_at.eq(Some(batch.committed_at)))
                .execute(conn)?;

                if updated == 0 {
                    tracing::warn!(%job_id, "last_run_at not advanced (job missing or already newer)");
                }
            }

            tracing::debug!(
                "Committed {} price points ({} raw responses)",
                inserted,
                batch.raw_responses.len()
            );

            Ok(inserted)
        })
    }

    fn recent_for_symbol(&self, symbol: &str, limit: i64) -> Result<Vec<PricePoint>, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        price_points::table
            .filter(price_points::symbol.eq(symbol))
            .order((price_points::timestamp.desc(), price_points::created_at.desc()))
            .limit(limit)
            .select(PricePoint::as_select())
            .load(&mut conn)
            .map_err(DatabaseError::from)
    }

    fn find_raw_response(&self, id: Uuid) -> Result<Option<RawResponse>, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        raw_responses::table
            .filter(raw_responses::id.eq(id))
            .select(RawResponse::as_select())
            .first(&mut conn)
            .optional()
            .map_err(DatabaseError::from)
    }
}
