//! In-memory repository implementations
//!
//! One `InMemoryStore` implements every repository trait over a single
//! mutex-guarded state, so a batch commit touches prices and the owning job
//! under the same lock, the way the PostgreSQL transaction does.
//!
//! Test-only; data lives as long as the store handle.

use crate::database::connection::DatabaseError;
use crate::database::models::{NewPollingJob, PollingJob, PricePoint, RawResponse, SymbolAverage};
use crate::database::repositories::{AverageRepository, IngestionBatch, JobRepository, PriceRepository};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct StoreState {
    jobs: Vec<PollingJob>,
    raw_responses: HashMap<Uuid, RawResponse>,
    price_points: Vec<PricePoint>,
    averages: HashMap<String, SymbolAverage>,
}

/// Thread-safe in-memory store; clones share the same state
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a job's run marker (fixtures and manual recovery)
    pub fn set_last_run_at(&self, job_id: Uuid, at: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        match state.jobs.iter_mut().find(|job| job.job_id == job_id) {
            Some(job) => {
                job.last_run_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Every stored price point for `symbol`, in insertion order
    pub fn price_points_for(&self, symbol: &str) -> Vec<PricePoint> {
        self.state
            .lock()
            .price_points
            .iter()
            .filter(|point| point.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn price_point_count(&self) -> usize {
        self.state.lock().price_points.len()
    }

    pub fn raw_response_count(&self) -> usize {
        self.state.lock().raw_responses.len()
    }

    pub fn average_count(&self) -> usize {
        self.state.lock().averages.len()
    }
}

impl JobRepository for InMemoryStore {
    fn create(&self, new_job: NewPollingJob) -> Result<PollingJob, DatabaseError> {
        let mut state = self.state.lock();

        if state.jobs.iter().any(|job| job.job_id == new_job.job_id) {
            return Err(DatabaseError::QueryError(format!(
                "duplicate key value violates unique constraint: job_id {}",
                new_job.job_id
            )));
        }

        let job = new_job.into_job();
        state.jobs.push(job.clone());
        Ok(job)
    }

    fn find_by_id(&self, job_id: Uuid) -> Result<Option<PollingJob>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .jobs
            .iter()
            .find(|job| job.job_id == job_id)
            .cloned())
    }

    fn list_active(&self) -> Result<Vec<PollingJob>, DatabaseError> {
        let mut jobs: Vec<PollingJob> = self
            .state
            .lock()
            .jobs
            .iter()
            .filter(|job| job.is_active)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }
}

impl PriceRepository for InMemoryStore {
    fn commit_batch(&self, batch: &IngestionBatch) -> Result<usize, DatabaseError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock();

        // Validate everything before the first write so a failure leaves no trace
        let staged_raw: HashSet<Uuid> = batch.raw_responses.iter().map(|raw| raw.id).collect();
        for point in &batch.price_points {
            if !staged_raw.contains(&point.raw_response_id)
                && !state.raw_responses.contains_key(&point.raw_response_id)
            {
                return Err(DatabaseError::QueryError(format!(
                    "price point {} references missing raw response {}",
                    point.id, point.raw_response_id
                )));
            }
        }
        for raw in &batch.raw_responses {
            if state.raw_responses.contains_key(&raw.id) {
                return Err(DatabaseError::QueryError(format!(
                    "duplicate key value violates unique constraint: raw response {}",
                    raw.id
                )));
            }
        }

        for raw in &batch.raw_responses {
            state.raw_responses.insert(raw.id, raw.clone());
        }
        state.price_points.extend(batch.price_points.iter().cloned());

        if let Some(job_id) = batch.job_id {
            if let Some(job) = state.jobs.iter_mut().find(|job| job.job_id == job_id) {
                let advances = job
                    .last_run_at
                    .map_or(true, |last| last <= batch.committed_at);
                if advances {
                    job.last_run_at = Some(batch.committed_at);
                }
            }
        }

        Ok(batch.price_points.len())
    }

    fn recent_for_symbol(&self, symbol: &str, limit: i64) -> Result<Vec<PricePoint>, DatabaseError> {
        let mut points = self.price_points_for(symbol);
        points.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        points.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(points)
    }

    fn find_raw_response(&self, id: Uuid) -> Result<Option<RawResponse>, DatabaseError> {
        Ok(self.state.lock().raw_responses.get(&id).cloned())
    }
}

impl AverageRepository for InMemoryStore {
    fn upsert(&self, average: SymbolAverage) -> Result<SymbolAverage, DatabaseError> {
        self.state
            .lock()
            .averages
            .insert(average.symbol.clone(), average.clone());
        Ok(average)
    }

    fn find(&self, symbol: &str) -> Result<Option<SymbolAverage>, DatabaseError> {
        Ok(self.state.lock().averages.get(symbol).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::enums::ProviderKind;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn staged(symbol: &str, at: DateTime<Utc>) -> (RawResponse, PricePoint) {
        let raw = RawResponse::new(ProviderKind::YFinance, symbol, serde_json::json!({}));
        let point = PricePoint::from_raw(&raw, dec!(10), at);
        (raw, point)
    }

    fn job(store: &InMemoryStore) -> PollingJob {
        store
            .create(NewPollingJob::new(vec!["AAPL".into()], 10, ProviderKind::YFinance).unwrap())
            .unwrap()
    }

    #[test]
    fn test_commit_writes_rows_and_advances_job() {
        let store = InMemoryStore::new();
        let job = job(&store);

        let mut batch = IngestionBatch::new(Some(job.job_id));
        let (raw, point) = staged("AAPL", Utc::now());
        batch.stage(raw, point);

        assert_eq!(store.commit_batch(&batch).unwrap(), 1);
        assert_eq!(store.price_point_count(), 1);
        assert_eq!(store.raw_response_count(), 1);

        let stored = store.find_by_id(job.job_id).unwrap().unwrap();
        assert_eq!(stored.last_run_at, Some(batch.committed_at));
    }

    #[test]
    fn test_commit_rejects_dangling_provenance_without_partial_writes() {
        let store = InMemoryStore::new();
        let job = job(&store);

        let mut batch = IngestionBatch::new(Some(job.job_id));
        let (raw, point) = staged("AAPL", Utc::now());
        batch.stage(raw, point);
        let (_, orphan) = staged("MSFT", Utc::now());
        batch.price_points.push(orphan);

        assert!(store.commit_batch(&batch).is_err());
        assert_eq!(store.price_point_count(), 0);
        assert_eq!(store.raw_response_count(), 0);
        assert_eq!(store.find_by_id(job.job_id).unwrap().unwrap().last_run_at, None);
    }

    #[test]
    fn test_last_run_at_never_moves_backwards() {
        let store = InMemoryStore::new();
        let job = job(&store);
        let later = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        store.set_last_run_at(job.job_id, later);

        let mut batch = IngestionBatch::new(Some(job.job_id));
        batch.committed_at = later - Duration::seconds(30);
        let (raw, point) = staged("AAPL", Utc::now());
        batch.stage(raw, point);
        store.commit_batch(&batch).unwrap();

        assert_eq!(store.find_by_id(job.job_id).unwrap().unwrap().last_run_at, Some(later));
    }

    #[test]
    fn test_recent_orders_by_event_time_not_insertion() {
        let store = InMemoryStore::new();
        let base = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();

        let mut batch = IngestionBatch::new(None);
        for offset in [3, 1, 4, 0, 2] {
            let (raw, point) = staged("AAPL", base + Duration::seconds(offset));
            batch.stage(raw, point);
        }
        store.commit_batch(&batch).unwrap();

        let recent = store.recent_for_symbol("AAPL", 3).unwrap();
        let times: Vec<_> = recent.iter().map(|p| p.timestamp).collect();
        assert_eq!(
            times,
            vec![
                base + Duration::seconds(4),
                base + Duration::seconds(3),
                base + Duration::seconds(2)
            ]
        );
        assert_eq!(store.latest_for_symbol("AAPL").unwrap().unwrap().timestamp, base + Duration::seconds(4));
        assert!(store.latest_for_symbol("MSFT").unwrap().is_none());
    }
}
