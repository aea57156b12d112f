use price_pipeline::app::{self, StartupError};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Moving-average consumer only
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
    let mut consumer = app::build_consumer(&config, &repositories).await?;

    let shutdown = CancellationToken::new();
    app::cancel_on_signal(shutdown.clone());

    let stats = consumer.run(shutdown).await;
    tracing::info!("Consumer stopped: {:?}", stats);

    consumer.into_source().close().await?;
    Ok(())
}
