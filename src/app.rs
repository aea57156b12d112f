//! Startup wiring shared by the binaries

use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::aggregation::{MovingAverageConsumer, MovingAverageService};
use crate::config::{AppConfig, ConfigError};
use crate::database::repositories::*;
use crate::database::{establish_connection_pool, get_conn, run_migrations, DatabaseError, PgPool};
use crate::ingestion::IngestionExecutor;
use crate::jobs::PollingScheduler;
use crate::provider::{ProviderRegistry, YFinanceProvider};
use crate::rabbitmq::{PriceEventProducer, PriceEventSink, RabbitMQError, RabbitMQPublisher, RabbitMQSubscriber};

/// Failures that stop the process at startup
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("RabbitMQ error: {0}")]
    RabbitMQ(#[from] RabbitMQError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

const DEFAULT_LOG_FILTER: &str = "price_pipeline=info";

/// Load `.env` into the environment, then install tracing
///
/// `.env` goes first so a `RUST_LOG` set there picks the filter.
pub fn init() {
    dotenvy::dotenv().ok();
    init_tracing();
}

/// Install the tracing subscriber; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(log_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into())
}

pub fn load_config() -> Result<AppConfig, StartupError> {
    Ok(AppConfig::from_env()?)
}

/// Repository handles over one backing store
#[derive(Clone)]
pub struct Repositories {
    pub jobs: Arc<dyn JobRepository>,
    pub prices: Arc<dyn PriceRepository>,
    pub averages: Arc<dyn AverageRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        let jobs_pool = pool.clone();
        let prices_pool = pool.clone();

        Self {
            jobs: Arc::new(JobRepositoryImpl::new(move || get_conn(&jobs_pool))),
            prices: Arc::new(PriceRepositoryImpl::new(move || get_conn(&prices_pool))),
            averages: Arc::new(AverageRepositoryImpl::new(move || get_conn(&pool))),
        }
    }

    #[cfg(test)]
    pub fn in_memory(store: InMemoryStore) -> Self {
        Self {
            jobs: Arc::new(store.clone()),
            prices: Arc::new(store.clone()),
            averages: Arc::new(store),
        }
    }
}

/// Connect the store, migrating first when configured
pub async fn connect_store(config: &AppConfig) -> Result<Repositories, StartupError> {
    let database = config.database.clone();

    let pool = tokio::task::spawn_blocking(move || {
        let pool = establish_connection_pool(&database.url, database.pool_size)?;
        if database.run_migrations {
            let applied = run_migrations(&pool)?;
            tracing::info!("Database migrations up to date ({} applied)", applied);
        }
        Ok::<_, DatabaseError>(pool)
    })
    .await
    .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))??;

    Ok(Repositories::postgres(pool))
}

pub fn provider_registry(config: &AppConfig) -> Arc<ProviderRegistry> {
    let yfinance = YFinanceProvider::new(&config.provider.yfinance_base_url);
    Arc::new(ProviderRegistry::new().with(Arc::new(yfinance)))
}

/// RabbitMQ publisher and the background producer sending through it
pub struct EventBus {
    pub publisher: Arc<RabbitMQPublisher>,
    pub producer: Arc<PriceEventProducer>,
}

impl EventBus {
    pub fn new(publisher: Arc<RabbitMQPublisher>) -> Self {
        let producer = Arc::new(PriceEventProducer::start(publisher.clone()));
        Self { publisher, producer }
    }

    /// Close the AMQP connection; the producer must be flushed first
    pub async fn close(&self) {
        let stats = self.publisher.stats();
        tracing::info!(
            published = stats.messages_published,
            confirmed = stats.messages_confirmed,
            failed = stats.messages_failed,
            dropped = self.producer.stats().dropped.load(Ordering::Relaxed),
            "Closing event bus"
        );

        if let Err(e) = self.publisher.disconnect().await {
            tracing::warn!("Publisher did not disconnect cleanly: {}", e);
        }
    }
}

/// Connect the publisher and start the background event producer
pub async fn start_event_bus(config: &AppConfig) -> Result<EventBus, StartupError> {
    let publisher = RabbitMQPublisher::new(config.rabbitmq.clone());
    publisher.connect().await?;
    Ok(EventBus::new(Arc::new(publisher)))
}

pub fn build_scheduler(
    config: &AppConfig,
    repositories: &Repositories,
    events: Arc<dyn PriceEventSink>,
) -> (Arc<IngestionExecutor>, PollingScheduler) {
    let executor = Arc::new(IngestionExecutor::new(
        provider_registry(config),
        Arc::clone(&repositories.prices),
        Arc::clone(&events),
    ));

    let scheduler = PollingScheduler::new(
        Arc::clone(&repositories.jobs),
        Arc::clone(&executor),
        events,
        config.scheduler.tick_period,
        config.scheduler.flush_timeout,
    );

    (executor, scheduler)
}

/// Subscribe to the price queue and build the consumer
pub async fn build_consumer(
    config: &AppConfig,
    repositories: &Repositories,
) -> Result<MovingAverageConsumer<RabbitMQSubscriber>, StartupError> {
    let subscriber = RabbitMQSubscriber::connect(&config.rabbitmq).await?;
    let service = MovingAverageService::new(
        Arc::clone(&repositories.prices),
        Arc::clone(&repositories.averages),
        config.consumer.window,
    );

    Ok(MovingAverageConsumer::new(
        subscriber,
        Arc::new(service),
        config.consumer.poll_timeout,
    ))
}

/// Cancel `shutdown` on SIGINT or SIGTERM
pub fn cancel_on_signal(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received SIGINT"),
            _ = terminate => tracing::info!("Received SIGTERM"),
        }

        shutdown.cancel();
    });
}
