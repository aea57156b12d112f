use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::messages::PriceEvent;
use super::publisher::EventTransport;

/// Destination for price events of committed price points
#[async_trait]
pub trait PriceEventSink: Send + Sync {
    /// Hand an event over for delivery; never blocks on the broker
    fn publish(&self, event: PriceEvent);

    /// Stop accepting events and wait up to `timeout` for outstanding sends
    async fn flush(&self, timeout: Duration) -> FlushOutcome;
}

/// Completion of one send
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryReport {
    Delivered { event_id: Uuid, symbol: String },
    Failed { event_id: Uuid, symbol: String, reason: String },
}

/// Result of a bounded flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Every accepted event reached a delivery report
    Drained { delivered: u64, failed: u64 },
    /// The deadline passed with sends still outstanding
    TimedOut { pending: u64 },
}

/// Producer counters
#[derive(Debug, Default)]
pub struct ProducerStats {
    pub enqueued: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub dropped: AtomicU64,
}

impl ProducerStats {
    pub fn pending(&self) -> u64 {
        let done = self.delivered.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed);
        self.enqueued.load(Ordering::Relaxed).saturating_sub(done)
    }
}

/// Asynchronous price event producer
///
/// `publish` enqueues onto an unbounded channel drained by one background
/// sender task, so the executor never waits on the broker. Sends happen in
/// enqueue order; each yields a `DeliveryReport` that is logged, counted and
/// optionally forwarded. Failed sends are not retried: the price point is
/// already durable.
pub struct PriceEventProducer {
    sender: Mutex<Option<mpsc::UnboundedSender<PriceEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<ProducerStats>,
}

impl PriceEventProducer {
    /// Start the background sender over `transport`
    pub fn start(transport: Arc<dyn EventTransport>) -> Self {
        Self::start_with_reports(transport, None)
    }

    /// Start the background sender, forwarding every delivery report to `reports`
    pub fn start_with_reports(
        transport: Arc<dyn EventTransport>,
        reports: Option<mpsc::UnboundedSender<DeliveryReport>>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PriceEvent>();
        let stats = Arc::new(ProducerStats::default());
        let worker_stats = Arc::clone(&stats);

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let report = Self::deliver(transport.as_ref(), &event).await;

                match &report {
                    DeliveryReport::Delivered { event_id, symbol } => {
                        worker_stats.delivered.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(%event_id, symbol = %symbol, "Price event delivered");
                    }
                    DeliveryReport::Failed { event_id, symbol, reason } => {
                        worker_stats.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(%event_id, symbol = %symbol, "Price event delivery failed: {}", reason);
                    }
                }

                if let Some(reports) = &reports {
                    let _ = reports.send(report);
                }
            }

            tracing::debug!("Price event sender drained");
        });

        Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
            stats,
        }
    }

    async fn deliver(transport: &dyn EventTransport, event: &PriceEvent) -> DeliveryReport {
        let failed = |reason: String| DeliveryReport::Failed {
            event_id: event.id,
            symbol: event.symbol.clone(),
            reason,
        };

        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => return failed(e.to_string()),
        };

        match transport.send(&event.symbol, payload).await {
            Ok(()) => DeliveryReport::Delivered {
                event_id: event.id,
                symbol: event.symbol.clone(),
            },
            Err(e) => failed(e.to_string()),
        }
    }

    pub fn stats(&self) -> &ProducerStats {
        &self.stats
    }
}

#[async_trait]
impl PriceEventSink for PriceEventProducer {
    fn publish(&self, event: PriceEvent) {
        let sender = self.sender.lock();

        let Some(sender) = sender.as_ref() else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(symbol = %event.symbol, "Producer already flushed; dropping price event");
            return;
        };

        let symbol = event.symbol.clone();
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        if sender.send(event).is_err() {
            self.stats.enqueued.fetch_sub(1, Ordering::Relaxed);
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::error!(symbol = %symbol, "Price event sender has stopped; dropping event");
        }
    }

    async fn flush(&self, timeout: Duration) -> FlushOutcome {
        // Dropping the sender lets the worker exit once the queue is empty
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();

        let Some(worker) = worker else {
            return FlushOutcome::Drained {
                delivered: self.stats.delivered.load(Ordering::Relaxed),
                failed: self.stats.failed.load(Ordering::Relaxed),
            };
        };

        tracing::info!("Flushing {} outstanding price events", self.stats.pending());

        match tokio::time::timeout(timeout, worker).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    tracing::error!("Price event sender task failed: {}", e);
                }
                FlushOutcome::Drained {
                    delivered: self.stats.delivered.load(Ordering::Relaxed),
                    failed: self.stats.failed.load(Ordering::Relaxed),
                }
            }
            Err(_) => {
                let pending = self.stats.pending();
                tracing::warn!("Flush timed out after {:?} with {} events pending", timeout, pending);
                FlushOutcome::TimedOut { pending }
            }
        }
    }
}

/// Sink that keeps events in memory instead of sending them
#[cfg(test)]
#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<PriceEvent>>>,
}

#[cfg(test)]
impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PriceEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[cfg(test)]
#[async_trait]
impl PriceEventSink for InMemoryEventSink {
    fn publish(&self, event: PriceEvent) {
        self.events.lock().push(event);
    }

    async fn flush(&self, _timeout: Duration) -> FlushOutcome {
        FlushOutcome::Drained {
            delivered: self.events.lock().len() as u64,
            failed: 0,
        }
    }
}
