use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::moving_average::{AverageError, AverageOutcome, MovingAverageService};
use crate::rabbitmq::{EventSource, InboundMessage, PriceEvent};

/// Consumer loop state
#[derive(Debug)]
pub enum ConsumerState {
    /// Waiting for the next delivery, bounded by the poll timeout
    Polling,
    /// Handling one delivery; never interrupted by shutdown
    Processing(InboundMessage),
    ShuttingDown,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub updated: u64,
    pub insufficient_history: u64,
    pub decode_failures: u64,
    pub store_failures: u64,
    pub overflows: u64,
}

/// Moving-average consumer over any event source
pub struct MovingAverageConsumer<S: EventSource> {
    source: S,
    service: Arc<MovingAverageService>,
    poll_timeout: Duration,
}

impl<S: EventSource> MovingAverageConsumer<S> {
    pub fn new(source: S, service: Arc<MovingAverageService>, poll_timeout: Duration) -> Self {
        Self {
            source,
            service,
            poll_timeout,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Consume until cancelled or until the source closes
    ///
    /// Shutdown is checked whenever a poll returns; a message already taken
    /// off the source is processed and acked first. A closed source cancels
    /// `shutdown` for everything else sharing the token.
    pub async fn run(&mut self, shutdown: CancellationToken) -> ConsumerStats {
        let mut stats = ConsumerStats::default();
        let mut state = ConsumerState::Polling;

        tracing::info!(
            "Moving average consumer started (window: {}, poll timeout: {:?})",
            self.service.window(),
            self.poll_timeout
        );

        loop {
            state = match state {
                ConsumerState::Polling => self.poll(&shutdown).await,
                ConsumerState::Processing(message) => {
                    stats.received += 1;
                    Self::process(Arc::clone(&self.service), &message, &mut stats).await;

                    // Acked even when the store failed; the next event for
                    // the symbol recomputes from scratch
                    if let Err(e) = self.source.ack(message.delivery_tag).await {
                        tracing::error!(delivery_tag = message.delivery_tag, "Failed to ack message: {}", e);
                    }
                    ConsumerState::Polling
                }
                ConsumerState::ShuttingDown => break,
            };
        }

        tracing::info!("Moving average consumer stopped: {:?}", stats);
        stats
    }

    async fn poll(&mut self, shutdown: &CancellationToken) -> ConsumerState {
        if shutdown.is_cancelled() {
            return ConsumerState::ShuttingDown;
        }

        match tokio::time::timeout(self.poll_timeout, self.source.next_message()).await {
            Err(_) => ConsumerState::Polling,
            Ok(None) => {
                // Nothing else will arrive; take the rest of the process down too
                tracing::error!("Event source closed; shutting down");
                shutdown.cancel();
                ConsumerState::ShuttingDown
            }
            Ok(Some(Err(e))) => {
                tracing::error!("Failed to receive price event: {}", e);
                ConsumerState::Polling
            }
            Ok(Some(Ok(message))) => ConsumerState::Processing(message),
        }
    }

    async fn process(service: Arc<MovingAverageService>, message: &InboundMessage, stats: &mut ConsumerStats) {
        let event = match PriceEvent::from_json(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                stats.decode_failures += 1;
                tracing::warn!(routing_key = %message.routing_key, "Skipping undecodable price event: {}", e);
                return;
            }
        };

        let symbol = event.symbol.clone();

        match tokio::task::spawn_blocking(move || service.recompute(&symbol)).await {
            Ok(Ok(AverageOutcome::Updated(average))) => {
                stats.updated += 1;
                tracing::info!(
                    symbol = %average.symbol,
                    "Moving average updated to {} (as of {})",
                    average.moving_average,
                    average.last_updated_at
                );
            }
            Ok(Ok(AverageOutcome::InsufficientHistory { found, required })) => {
                stats.insufficient_history += 1;
                tracing::info!(
                    symbol = %event.symbol,
                    "Not enough history for a moving average ({}/{})",
                    found,
                    required
                );
            }
            Ok(Err(AverageError::Overflow { window })) => {
                stats.overflows += 1;
                tracing::error!(
                    symbol = %event.symbol,
                    "Moving average over {} prices overflowed; average left unchanged",
                    window
                );
            }
            Ok(Err(AverageError::Store(e))) => {
                stats.store_failures += 1;
                tracing::error!(symbol = %event.symbol, "Failed to update moving average: {}", e);
            }
            Err(e) if e.is_panic() => {
                stats.store_failures += 1;
                tracing::error!(symbol = %event.symbol, "Moving average task panicked: {}", e);
            }
            Err(e) => {
                stats.store_failures += 1;
                tracing::error!(symbol = %event.symbol, "Moving average task was cancelled: {}", e);
            }
        }
    }
}
