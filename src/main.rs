use price_pipeline::app::{self, StartupError};
use price_pipeline::{create_router, ApiState};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Scheduler, moving-average consumer and HTTP API in one process
#[tokio::main]
async fn main() -> ExitCode {
    app::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = app::load_config()?;

    let repositories = app::connect_store(&config).await?;
    let bus = app::start_event_bus(&config).await?;
    let (executor, scheduler) = app::build_scheduler(&config, &repositories, bus.producer.clone());
    let mut consumer = app::build_consumer(&config, &repositories).await?;

    let listener = tokio::net::TcpListener::bind(config.api.bind_addr).await?;

    let shutdown = CancellationToken::new();
    app::cancel_on_signal(shutdown.clone());

    let scheduler_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });

    let consumer_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let stats = consumer.run(shutdown).await;
            if let Err(e) = consumer.into_source().close().await {
                tracing::warn!("Subscriber did not close cleanly: {}", e);
            }
            stats
        }
    });

    let state = ApiState {
        jobs: repositories.jobs.clone(),
        averages: repositories.averages.clone(),
        executor,
    };

    tracing::info!("Price pipeline API running on http://{}", config.api.bind_addr);
    tracing::info!("Health check: http://{}/health", config.api.bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui", config.api.bind_addr);

    let serve_shutdown = shutdown.clone();
    let served = axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await;

    // The API may also stop on its own error; take the loops down with it
    shutdown.cancel();

    match scheduler_task.await {
        Ok(outcome) => tracing::info!("Scheduler finished: {:?}", outcome),
        Err(e) => tracing::error!("Scheduler task failed: {}", e),
    }
    bus.close().await;
    match consumer_task.await {
        Ok(stats) => tracing::info!("Consumer finished: {:?}", stats),
        Err(e) => tracing::error!("Consumer task failed: {}", e),
    }

    served?;
    Ok(())
}
