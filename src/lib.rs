pub mod config;
pub mod error;
pub mod ingest;
pub mod lock;
pub mod pipeline;
pub mod scheduler;
pub mod sinks;
pub mod state;
pub mod watch;

pub use config::Config;
pub use error::{IngestError, Result};
pub use lock::SingleInstanceGuard;
pub use pipeline::{IngestionPipeline, RunOutcome, RunSummary};
pub use state::RunStateStore;

/// Resolves when the process is asked to stop (Ctrl+C, or SIGTERM on Unix).
///
/// Returns a label for the signal, used in logs and the final notification.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Cannot listen for Ctrl+C: {}", e);
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
                log::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    }
}
