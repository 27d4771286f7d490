//! Hourly "service is alive" notification.
//!
//! Runs as a Tokio task that sleeps until the next fire time. Stopping flips
//! a watch flag the task selects on, so cancellation does not wait for the
//! sleep to run out.

use chrono::{Local, NaiveDateTime, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::sinks::{messages, send_logged, NotificationSink};

/// Next full hour strictly after `now`
pub fn next_top_of_hour(now: NaiveDateTime) -> NaiveDateTime {
    let hour_start = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    hour_start + chrono::Duration::hours(1)
}

/// Handle to the running heartbeat task
pub struct Heartbeat {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Notify at every top of the hour
    pub fn start<N>(notifier: Arc<N>) -> Self
    where
        N: NotificationSink + 'static,
    {
        Self::start_with(notifier, next_top_of_hour)
    }

    /// Notify at the times produced by `next_fire`, which maps "now" to the
    /// next firing moment.
    pub fn start_with<N, F>(notifier: Arc<N>, next_fire: F) -> Self
    where
        N: NotificationSink + 'static,
        F: Fn(NaiveDateTime) -> NaiveDateTime + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            log::info!("[HEARTBEAT] Started");
            loop {
                let now = Local::now().naive_local();
                let target = next_fire(now);
                let delay = (target - now).to_std().unwrap_or(Duration::ZERO);
                log::debug!("[HEARTBEAT] Next notification at {}", target);

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop_rx.changed() => break,
                }
                if *stop_rx.borrow() {
                    break;
                }

                let text = messages::heartbeat(Local::now().naive_local());
                if send_logged(notifier.as_ref(), &text).await.is_some() {
                    log::info!("[HEARTBEAT] Notification sent");
                }
            }
            log::info!("[HEARTBEAT] Stopped");
        });

        Self { stop_tx, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Ask the task to stop and wait up to `timeout` for it.
    ///
    /// Returns false if it did not finish in time; the task is then left to
    /// die with the runtime.
    pub async fn stop(self, timeout: Duration) -> bool {
        let _ = self.stop_tx.send(true);
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(_) => true,
            Err(_) => {
                log::warn!("[HEARTBEAT] Task did not stop within {:?}; abandoning it", timeout);
                false
            }
        }
    }
}
