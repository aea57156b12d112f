use crate::database::connection::DatabaseError;
use crate::database::models::{NewPollingJob, PollingJob};
use crate::database::repositories::ConnectionProvider;
use crate::database::schema::polling_jobs;
use crate::database::PgPooledConnection;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

/// Polling job repository
///
/// `last_run_at` is not written here; it advances inside the price batch
/// transaction (see `PriceRepository::commit_batch`).
pub trait JobRepository: Send + Sync {
    /// Insert a validated job
    fn create(&self, new_job: NewPollingJob) -> Result<PollingJob, DatabaseError>;

    fn find_by_id(&self, job_id: Uuid) -> Result<Option<PollingJob>, DatabaseError>;

    /// All active jobs, oldest first
    fn list_active(&self) -> Result<Vec<PollingJob>, DatabaseError>;

    /// Active jobs that are due at `now`
    fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<PollingJob>, DatabaseError> {
        Ok(self
            .list_active()?
            .into_iter()
            .filter(|job| job.is_due(now))
            .collect())
    }
}

/// Concrete implementation of JobRepository
pub struct JobRepositoryImpl {
    get_conn: ConnectionProvider,
}

impl JobRepositoryImpl {
    /// Create new job repository with connection provider
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
        }
    }
}

impl JobRepository for JobRepositoryImpl {
    fn create(&self, new_job: NewPollingJob) -> Result<PollingJob, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        diesel::insert_into(polling_jobs::table)
            .values(&new_job)
            .returning(PollingJob::as_returning())
            .get_result(&mut conn)
            .map_err(DatabaseError::from)
    }

    fn find_by_id(&self, job_id: Uuid) -> Result<Option<PollingJob>, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        polling_jobs::table
            .filter(polling_jobs::job_id.eq(job_id))
            .select(PollingJob::as_select())
            .first(&mut conn)
            .optional()
            .map_err(DatabaseError::from)
    }

    fn list_active(&self) -> Result<Vec<PollingJob>, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        polling_jobs::table
            .filter(polling_jobs::is_active.eq(true))
            .order(polling_jobs::created_at.asc())
            .select(PollingJob::as_select())
            .load(&mut conn)
            .map_err(DatabaseError::from)
    }
}
