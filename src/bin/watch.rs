//! Watch the source tree and compress photos as soon as they arrive.

use anyhow::{Context, Result};
use clap::Parser;
use photo_ingest::sinks::ProductPhotoApi;
use photo_ingest::watch::run_watcher;
use photo_ingest::{shutdown_signal, Config, IngestionPipeline, SingleInstanceGuard};
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "watch")]
#[command(about = "Watch the source directory and process new photos as they arrive")]
struct Args {
    /// Quiet period in milliseconds before a new file is processed
    #[arg(long, default_value = "500")]
    debounce_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info"),
    )
    .init();

    let args = Args::parse();

    log::info!("Starting photo watcher");
    let config = Config::load()?;
    log::info!("Source: {}", config.source_dir().display());
    log::info!("Destination: {}", config.dest_dir().display());
    log::info!("Debounce: {} ms", args.debounce_ms);

    let mut guard = SingleInstanceGuard::acquire(config.lock_path(), &config.lock)
        .context("Could not acquire the instance lock; another instance may be running")?;
    log::info!("Lock held at {}", guard.path().display());

    std::fs::create_dir_all(config.dest_dir())
        .with_context(|| format!("Cannot create {}", config.dest_dir().display()))?;

    let pipeline = IngestionPipeline::new(config.clone(), ProductPhotoApi::from_config(&config.api));

    log::info!("Watching for new photos (Ctrl+C to stop)");
    let result = {
        let (stop_tx, stop_rx) = watch::channel(None);
        let watcher = run_watcher(&pipeline, args.debounce_ms, stop_rx);
        tokio::pin!(watcher);
        tokio::select! {
            res = &mut watcher => res,
            signal = shutdown_signal() => {
                log::info!("Received {}, stopping watcher", signal);
                let _ = stop_tx.send(Some(signal));
                watcher.await
            }
        }
    };

    guard.release();
    result.context("Watch mode stopped")?;
    Ok(())
}
