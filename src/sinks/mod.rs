//! Best-effort collaborators: the chat notifier and the product photo API.
//!
//! Failures surface as `IngestError::Notification` / `IngestError::RemoteUpdate`,
//! which are never fatal. Callers log them and move on.

pub mod messages;
pub mod product_api;
pub mod telegram;

pub use product_api::ProductPhotoApi;
pub use telegram::TelegramNotifier;

use std::future::Future;
use std::path::Path;

use crate::error::Result;

/// Identifier of a sent chat message
pub type MessageId = i64;

/// Where run notifications go
pub trait NotificationSink: Send + Sync {
    /// Send `text` (HTML), returning the id of the new message
    fn send(&self, text: &str) -> impl Future<Output = Result<MessageId>> + Send;

    /// Delete a previously sent message
    fn delete(&self, id: MessageId) -> impl Future<Output = Result<()>> + Send;
}

/// Told about every output file the pipeline writes
pub trait UpdateSink: Send + Sync {
    fn photo_updated(&self, output: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// Send and log instead of failing
pub async fn send_logged<N: NotificationSink>(sink: &N, text: &str) -> Option<MessageId> {
    match sink.send(text).await {
        Ok(id) => Some(id),
        Err(e) => {
            log::error!("{}", e);
            None
        }
    }
}

/// Delete and log instead of failing
pub async fn delete_logged<N: NotificationSink>(sink: &N, id: MessageId) {
    if let Err(e) = sink.delete(id).await {
        log::error!("{}", e);
    }
}
