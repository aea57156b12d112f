use price_pipeline::app::{self, StartupError};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Polling scheduler only
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
    let (_executor, scheduler) = app::build_scheduler(&config, &repositories, bus.producer.clone());

    let shutdown = CancellationToken::new();
    app::cancel_on_signal(shutdown.clone());

    let outcome = scheduler.run(shutdown).await;
    bus.close().await;
    tracing::info!("Poller stopped ({:?})", outcome);

    Ok(())
}
