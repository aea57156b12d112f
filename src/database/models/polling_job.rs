use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::database::enums::ProviderKind;

/// Polling job - a set of symbols fetched from one provider on a fixed interval
///
/// Symbols, provider and interval are fixed at creation. Only the scheduler
/// moves `last_run_at`, and only forward.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::polling_jobs)]
#[diesel(primary_key(job_id))]
pub struct PollingJob {
    pub job_id: Uuid,

    /// Symbols in the order they were submitted, duplicates removed
    pub symbols: Vec<String>,

    pub provider: ProviderKind,

    /// Seconds between runs, always > 0
    pub interval_secs: i32,

    pub is_active: bool,

    /// Commit time of the last run that persisted at least one price point
    pub last_run_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl PollingJob {
    pub fn interval(&self) -> Duration {
        Duration::seconds(i64::from(self.interval_secs))
    }

    /// Earliest instant the job becomes due, `None` if it has never run
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.last_run_at.map(|last| last + self.interval())
    }

    /// `is_active && (last_run_at is null || now >= last_run_at + interval)`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }

        match self.next_due_at() {
            None => true,
            Some(due_at) => now >= due_at,
        }
    }
}

/// Reasons a job cannot be created
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobValidationError {
    #[error("A polling job needs at least one symbol")]
    EmptySymbols,

    #[error("Interval must be greater than zero seconds, got {0}")]
    NonPositiveInterval(i32),
}

/// New polling job for insertion
#[derive(Debug, Clone, Insertable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::polling_jobs)]
pub struct NewPollingJob {
    pub job_id: Uuid,
    pub symbols: Vec<String>,
    pub provider: ProviderKind,
    pub interval_secs: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl NewPollingJob {
    /// Validate and build an active job
    ///
    /// Symbols are trimmed, blanks dropped and duplicates removed while
    /// keeping first-seen order.
    pub fn new(
        symbols: Vec<String>,
        interval_secs: i32,
        provider: ProviderKind,
    ) -> Result<Self, JobValidationError> {
        if interval_secs <= 0 {
            return Err(JobValidationError::NonPositiveInterval(interval_secs));
        }

        let mut ordered: Vec<String> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let symbol = symbol.trim().to_string();
            if !symbol.is_empty() && !ordered.contains(&symbol) {
                ordered.push(symbol);
            }
        }

        if ordered.is_empty() {
            return Err(JobValidationError::EmptySymbols);
        }

        Ok(Self {
            job_id: Uuid::new_v4(),
            symbols: ordered,
            provider,
            interval_secs,
            is_active: true,
            created_at: super::store_now(),
        })
    }

    /// Materialise the row as the store will hold it right after insertion
    pub fn into_job(self) -> PollingJob {
        PollingJob {
            job_id: self.job_id,
            symbols: self.symbols,
            provider: self.provider,
            interval_secs: self.interval_secs,
            is_active: self.is_active,
            last_run_at: None,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(interval_secs: i32, last_run_at: Option<DateTime<Utc>>) -> PollingJob {
        let mut job = NewPollingJob::new(vec!["AAPL".to_string()], interval_secs, ProviderKind::YFinance)
            .unwrap()
            .into_job();
        job.last_run_at = last_run_at;
        job
    }

    #[test]
    fn test_never_run_job_is_due_at_any_time() {
        let job = job(10, None);

        assert!(job.is_due(Utc.timestamp_opt(0, 0).unwrap()));
        assert!(job.is_due(Utc::now()));
        assert!(job.is_due(Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_due_exactly_when_interval_elapses() {
        let t = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let job = job(10, Some(t));

        assert!(!job.is_due(t));
        assert!(!job.is_due(t + Duration::seconds(9)));
        assert!(job.is_due(t + Duration::seconds(10)));
        assert!(job.is_due(t + Duration::seconds(11)));
    }

    #[test]
    fn test_inactive_job_is_never_due() {
        let mut job = job(10, None);
        job.is_active = false;

        assert!(!job.is_due(Utc::now()));
    }

    #[test]
    fn test_next_due_at() {
        let t = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();

        assert_eq!(job(60, None).next_due_at(), None);
        assert_eq!(job(60, Some(t)).next_due_at(), Some(t + Duration::seconds(60)));
    }

    #[test]
    fn test_new_job_rejects_non_positive_interval() {
        let result = NewPollingJob::new(vec!["AAPL".to_string()], 0, ProviderKind::YFinance);
        assert_eq!(result.unwrap_err(), JobValidationError::NonPositiveInterval(0));

        let result = NewPollingJob::new(vec!["AAPL".to_string()], -5, ProviderKind::YFinance);
        assert_eq!(result.unwrap_err(), JobValidationError::NonPositiveInterval(-5));
    }

    #[test]
    fn test_new_job_rejects_empty_symbols() {
        let result = NewPollingJob::new(vec![" ".to_string()], 10, ProviderKind::YFinance);
        assert_eq!(result.unwrap_err(), JobValidationError::EmptySymbols);
    }

    #[test]
    fn test_new_job_keeps_symbol_order_without_duplicates() {
        let job = NewPollingJob::new(
            vec!["MSFT".to_string(), "AAPL".to_string(), "MSFT".to_string(), " GOOGL ".to_string()],
            60,
            ProviderKind::YFinance,
        )
        .unwrap();

        assert_eq!(job.symbols, vec!["MSFT", "AAPL", "GOOGL"]);
        assert!(job.is_active);
        assert_eq!(job.interval_secs, 60);
    }
}
