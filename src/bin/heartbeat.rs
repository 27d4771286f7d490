//! Send the hourly "service is alive" message until interrupted.

use anyhow::{bail, Result};
use photo_ingest::scheduler::Heartbeat;
use photo_ingest::sinks::TelegramNotifier;
use photo_ingest::{shutdown_signal, Config};
use std::sync::Arc;
use std::time::Duration;

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info"),
    )
    .init();

    let config = Config::load()?;
    let Some(notifier) = TelegramNotifier::from_config(&config.telegram) else {
        bail!("Telegram notifications are disabled; set TELEGRAM_ENABLED, TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID");
    };

    let heartbeat = Heartbeat::start(Arc::new(notifier));

    let signal = shutdown_signal().await;
    log::info!("Received {}, stopping heartbeat", signal);
    heartbeat.stop(STOP_TIMEOUT).await;
    Ok(())
}
