use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::{IngestionError, SymbolFailure};
use crate::database::models::{store_now, PollingJob, PricePoint, RawResponse};
use crate::database::repositories::{IngestionBatch, PriceRepository};
use crate::provider::{MarketDataProvider, ProviderError, ProviderKind, ProviderRegistry};
use crate::rabbitmq::{PriceEvent, PriceEventSink};

/// Outcome of one job run
#[derive(Debug, Clone)]
pub struct JobRunReport {
    pub job_id: Uuid,
    /// Price points committed (0 when nothing was staged)
    pub committed: usize,
    /// Set only when the batch was committed
    pub committed_at: Option<DateTime<Utc>>,
    pub failures: Vec<SymbolFailure>,
}

impl JobRunReport {
    pub fn is_committed(&self) -> bool {
        self.committed_at.is_some()
    }
}

/// Fetches, persists and announces price observations
///
/// Symbols of a job are fetched concurrently; the results converge into one
/// staged batch that is committed as a single transaction. Events are
/// published only once that commit has succeeded.
pub struct IngestionExecutor {
    providers: Arc<ProviderRegistry>,
    prices: Arc<dyn PriceRepository>,
    events: Arc<dyn PriceEventSink>,
}

impl IngestionExecutor {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        prices: Arc<dyn PriceRepository>,
        events: Arc<dyn PriceEventSink>,
    ) -> Self {
        Self {
            providers,
            prices,
            events,
        }
    }

    /// Run one polling job
    ///
    /// Per-symbol failures are collected in the report and never abort
    /// siblings. With nothing staged no commit happens and the job's
    /// `last_run_at` stays where it was.
    pub async fn execute(&self, job: &PollingJob) -> Result<JobRunReport, IngestionError> {
        let start = Instant::now();
        let provider = self.providers.get(job.provider)?;

        let outcomes = join_all(job.symbols.iter().map(|symbol| {
            let provider = Arc::clone(&provider);
            async move { (symbol, Self::stage_symbol(provider.as_ref(), symbol).await) }
        }))
        .await;

        let mut batch = IngestionBatch::new(Some(job.job_id));
        let mut failures = Vec::new();

        for (symbol, outcome) in outcomes {
            match outcome {
                Ok((raw, point)) => batch.stage(raw, point),
                Err(error) => {
                    tracing::warn!(job_id = %job.job_id, symbol = %symbol, "Skipping symbol: {}", error);
                    failures.push(SymbolFailure {
                        symbol: symbol.clone(),
                        error,
                    });
                }
            }
        }

        if batch.is_empty() {
            tracing::warn!(
                job_id = %job.job_id,
                "No price points fetched for {} symbols; job stays due",
                job.symbols.len()
            );
            return Ok(JobRunReport {
                job_id: job.job_id,
                committed: 0,
                committed_at: None,
                failures,
            });
        }

        batch.committed_at = store_now();
        let (batch, committed) = self.commit(batch).await.map_err(|e| {
            tracing::error!(job_id = %job.job_id, "Batch rolled back: {}", e);
            e
        })?;

        self.announce(&batch.price_points);

        tracing::info!(
            job_id = %job.job_id,
            provider = %job.provider,
            "Committed {} price points ({} symbols failed) in {:.2}ms",
            committed,
            failures.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(JobRunReport {
            job_id: job.job_id,
            committed,
            committed_at: Some(batch.committed_at),
            failures,
        })
    }

    /// Fetch, persist and announce a single symbol outside of any job
    pub async fn fetch_now(&self, symbol: &str, kind: ProviderKind) -> Result<PricePoint, IngestionError> {
        let provider = self.providers.get(kind)?;
        let (raw, point) = Self::stage_symbol(provider.as_ref(), symbol).await?;

        let mut batch = IngestionBatch::new(None);
        batch.stage(raw, point.clone());
        self.commit(batch).await?;

        self.announce(std::slice::from_ref(&point));
        tracing::info!(symbol, provider = %kind, price = %point.price, "Fetched price on demand");

        Ok(point)
    }

    async fn stage_symbol(
        provider: &dyn MarketDataProvider,
        symbol: &str,
    ) -> Result<(RawResponse, PricePoint), ProviderError> {
        let payload = provider.fetch(symbol).await?;
        let parsed = provider.parse(&payload)?;

        let mut raw = RawResponse::new(provider.kind(), symbol, payload.data);
        raw.received_at = payload.received_at;
        let point = PricePoint::from_raw(&raw, parsed.price, parsed.timestamp);

        Ok((raw, point))
    }

    /// Commit on the blocking pool; diesel calls are synchronous
    async fn commit(&self, batch: IngestionBatch) -> Result<(IngestionBatch, usize), IngestionError> {
        let prices = Arc::clone(&self.prices);

        let (batch, result) = tokio::task::spawn_blocking(move || {
            let result = prices.commit_batch(&batch);
            (batch, result)
        })
        .await
        .map_err(|e| IngestionError::TaskJoin(e.to_string()))?;

        Ok((batch, result?))
    }

    fn announce(&self, points: &[PricePoint]) {
        for point in points {
            self.events.publish(PriceEvent::from(point));
        }
    }
}
