use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use photo_ingest::sinks::{delete_logged, messages, send_logged, ProductPhotoApi, TelegramNotifier};
use photo_ingest::{shutdown_signal, Config, IngestionPipeline, SingleInstanceGuard};
use std::process::ExitCode;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "photo-ingest")]
#[command(about = "Compress product photos that arrived since the last run and publish them")]
struct Args {
    /// List the files the run would process, without processing them or saving state
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => {
            log::info!("=== Photo ingest finished ===");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Photo ingest finished with error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    log::info!("Starting photo ingest v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    log::info!("Source: {}", config.source_dir().display());
    log::info!("Destination: {}", config.dest_dir().display());

    let started_at = Local::now().naive_local();
    let pipeline = IngestionPipeline::new(config.clone(), ProductPhotoApi::from_config(&config.api));

    // Preview only reads; it must not take (or take over) the instance lock.
    if args.dry_run {
        let files = pipeline.preview(started_at).await?;
        let window = pipeline.window_at(started_at);
        println!("Window: {} .. {}", window.start, window.end);
        for file in &files {
            println!("  {}", file.display());
        }
        println!("{} file(s) would be processed", files.len());
        return Ok(());
    }

    let guard = SingleInstanceGuard::acquire(config.lock_path(), &config.lock)
        .context("Could not acquire the instance lock; another instance may be running")?;
    log::info!("Lock held at {}", guard.path().display());

    let notifier = TelegramNotifier::from_config(&config.telegram);
    let started_message = match &notifier {
        Some(n) => send_logged(n, &messages::started(started_at)).await,
        None => None,
    };

    // On a signal the run finishes the file in flight and stops; the guard
    // is only dropped after that.
    let result = {
        let (stop_tx, stop_rx) = watch::channel(None);
        let run = pipeline.run_until(&guard, started_at, stop_rx);
        tokio::pin!(run);
        tokio::select! {
            summary = &mut run => summary,
            signal = shutdown_signal() => {
                log::error!("Processing interrupted by {}, finishing the current file", signal);
                let _ = stop_tx.send(Some(signal));
                run.await
            }
        }
    };

    let finished_at = Local::now().naive_local();
    if let Some(n) = &notifier {
        if let Some(id) = started_message {
            delete_logged(n, id).await;
        }
        let text = match &result {
            Ok(summary) => messages::finished(summary),
            Err(e) => messages::failed(started_at, finished_at, &e.to_string()),
        };
        send_logged(n, &text).await;
    }

    // Free the lock before the summary is logged and the process exits.
    drop(guard);

    let summary = result?;
    log::info!("=== Ingestion Complete ===");
    log::info!("Window: {} .. {}", summary.window.start, summary.window.end);
    log::info!("Files selected: {}", summary.selected);
    log::info!("Processed: {} (skipped: {}, errors: {})", summary.processed, summary.skipped, summary.failed);
    log::info!("Time: {}s", (summary.finished_at - summary.started_at).num_seconds());

    if summary.failed > 0 {
        log::warn!("Some files failed to process. Check logs above for details.");
    }

    Ok(())
}
