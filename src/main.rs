use kraken_tape::TapeError;
use kraken_tape::config::fetch_config;
use kraken_tape::manager::{FeedManager, RestartPolicy, Supervisor};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), TapeError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app_config = fetch_config()?;
    info!(
        symbols = ?app_config.recorder.symbols,
        feeds = ?app_config.recorder.feeds,
        output_dir = %app_config.recorder.writer.output_dir.display(),
        mode = app_config.recorder.writer.output_mode.as_str(),
        "Starting recorder"
    );

    let manager = FeedManager::new(&app_config);
    let supervisor = Supervisor::new(manager, RestartPolicy::default());
    let manager = supervisor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!(feeds = ?manager.liveness(), "Recorder stopped");
    Ok(())
}
