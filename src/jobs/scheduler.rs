use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::database::repositories::JobRepository;
use crate::ingestion::{IngestionError, IngestionExecutor};
use crate::rabbitmq::{FlushOutcome, PriceEventSink};

/// What one tick did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    /// Jobs whose batch was committed
    pub committed: Vec<Uuid>,
    /// Jobs that ran but staged nothing
    pub empty: Vec<Uuid>,
    /// Jobs whose run failed (persistence, unknown provider)
    pub failed: Vec<Uuid>,
}

/// Fixed-period polling scheduler
///
/// Each tick loads the due jobs and runs them one after another, so ticks
/// never overlap and a job is never executed twice at once. Only a single
/// scheduler instance may run against one store.
pub struct PollingScheduler {
    jobs: Arc<dyn JobRepository>,
    executor: Arc<IngestionExecutor>,
    events: Arc<dyn PriceEventSink>,
    tick_period: Duration,
    flush_timeout: Duration,
}

impl PollingScheduler {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        executor: Arc<IngestionExecutor>,
        events: Arc<dyn PriceEventSink>,
        tick_period: Duration,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            jobs,
            executor,
            events,
            tick_period,
            flush_timeout,
        }
    }

    /// Run every job due at `now`
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let jobs = Arc::clone(&self.jobs);
        let due = match tokio::task::spawn_blocking(move || jobs.find_due(now)).await {
            Ok(Ok(due)) => due,
            Ok(Err(e)) => {
                tracing::error!("Failed to load due jobs: {}", e);
                return TickReport::default();
            }
            Err(e) => {
                tracing::error!("Failed to spawn blocking task: {}", e);
                return TickReport::default();
            }
        };

        let mut report = TickReport {
            due: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            tracing::debug!("No due jobs");
            return report;
        }

        tracing::info!("Running {} due jobs", due.len());

        for job in &due {
            match self.executor.execute(job).await {
                Ok(run) if run.is_committed() => report.committed.push(job.job_id),
                Ok(_) => report.empty.push(job.job_id),
                Err(IngestionError::Persistence(e)) => {
                    tracing::error!(job_id = %job.job_id, "Job batch not persisted, retrying next cycle: {}", e);
                    report.failed.push(job.job_id);
                }
                Err(e) => {
                    tracing::error!(job_id = %job.job_id, "Job run failed: {}", e);
                    report.failed.push(job.job_id);
                }
            }
        }

        report
    }

    /// Tick until `shutdown` is cancelled, then flush the event sink
    ///
    /// Ticks start every `tick_period`; a tick that overruns delays the next
    /// one instead of overlapping it. Cancellation is observed between
    /// ticks, so an in-flight tick always completes.
    pub async fn run(&self, shutdown: CancellationToken) -> FlushOutcome {
        tracing::info!("Scheduler started (tick every {:?})", self.tick_period);

        let mut ticker = tokio::time::interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let report = self.run_tick(Utc::now()).await;
            if report.due > 0 {
                tracing::info!(
                    "Tick done: {} committed, {} empty, {} failed",
                    report.committed.len(),
                    report.empty.len(),
                    report.failed.len()
                );
            }
        }

        tracing::info!("Scheduler stopping; flushing price events");
        let outcome = self.events.flush(self.flush_timeout).await;
        tracing::info!("Scheduler stopped ({:?})", outcome);
        outcome
    }
}
