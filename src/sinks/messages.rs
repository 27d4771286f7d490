//! Chat message texts (Telegram HTML).

use chrono::NaiveDateTime;

use crate::pipeline::{RunOutcome, RunSummary};

const TITLE: &str = "🤖 <b>Photo Ingest - Image Monitor</b>";
const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

fn display(t: NaiveDateTime) -> String {
    t.format(DISPLAY_FORMAT).to_string()
}

/// Minimal escaping for text interpolated into HTML messages
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Sent when a run begins; deleted once the run finishes
pub fn started(started_at: NaiveDateTime) -> String {
    format!("{}\n\n🕐 Started: {}", TITLE, display(started_at))
}

/// Final message for a run that reached the end
pub fn finished(summary: &RunSummary) -> String {
    let mut text = match summary.outcome() {
        RunOutcome::Success => format!("{}\n\n✅ <b>DONE</b>\n", TITLE),
        RunOutcome::PartialFailure => format!("{}\n\n⚠️ <b>DONE WITH ERRORS</b>\n", TITLE),
    };
    text.push_str(&format!(
        "🕐 Started: {}\n🕐 Finished: {}\n🖼️ Images processed: {}",
        display(summary.started_at),
        display(summary.finished_at),
        summary.processed
    ));
    if summary.failed > 0 {
        text.push_str(&format!("\n❌ Failed: {}", summary.failed));
    }
    text
}

/// Final message for a run that could not complete
pub fn failed(started_at: NaiveDateTime, finished_at: NaiveDateTime, error: &str) -> String {
    format!(
        "{}\n\n❌ <b>ERROR</b>\n🕐 Started: {}\n🕐 Finished: {}\n⚠️ {}",
        TITLE,
        display(started_at),
        display(finished_at),
        escape_html(error)
    )
}

/// Hourly "still alive" message
pub fn heartbeat(now: NaiveDateTime) -> String {
    format!(
        "🤖 <b>Image Monitor Service</b>\n\n✅ Service is running\n🕐 {}",
        display(now)
    )
}
