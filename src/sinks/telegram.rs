use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::TelegramConfig;
use crate::error::{IngestError, Result};
use crate::sinks::{MessageId, NotificationSink};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Request body for sendMessage
#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Request body for deleteMessage
#[derive(Serialize)]
struct DeleteMessageRequest<'a> {
    chat_id: &'a str,
    message_id: MessageId,
}

/// Envelope of every Bot API response
#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: MessageId,
}

/// Telegram Bot API client posting to one chat
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IngestError::Notification(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Build from config when notifications are switched on
    pub fn from_config(config: &TelegramConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        match Self::new(config) {
            Ok(notifier) => Some(notifier),
            Err(e) => {
                log::warn!("Telegram notifications disabled: {}", e);
                None
            }
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", TELEGRAM_API, self.bot_token, method)
    }

    async fn call<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<Option<T>> {
        let response = self
            .client
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await
            .map_err(|e| IngestError::Notification(format!("[TELEGRAM] {} failed: {}", method, e)))?;

        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            IngestError::Notification(format!(
                "[TELEGRAM] {} returned {} with unreadable body: {}",
                method, status, e
            ))
        })?;

        if !envelope.ok {
            return Err(IngestError::Notification(format!(
                "[TELEGRAM] {} rejected ({}): {}",
                method,
                status,
                envelope.description.unwrap_or_default()
            )));
        }
        Ok(envelope.result)
    }
}

impl NotificationSink for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<MessageId> {
        let body = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
        };
        self.call::<_, SentMessage>("sendMessage", &body)
            .await?
            .map(|m| m.message_id)
            .ok_or_else(|| {
                IngestError::Notification("[TELEGRAM] sendMessage returned no message".to_string())
            })
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        let body = DeleteMessageRequest {
            chat_id: &self.chat_id,
            message_id: id,
        };
        self.call::<_, bool>("deleteMessage", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(enabled: bool) -> TelegramConfig {
        TelegramConfig {
            enabled,
            bot_token: "123:abc".to_string(),
            chat_id: "-100200".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_endpoint() {
        let notifier = TelegramNotifier::new(&config(true)).unwrap();
        assert_eq!(
            notifier.endpoint("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_disabled_config_builds_nothing() {
        assert!(TelegramNotifier::from_config(&config(false)).is_none());
        assert!(TelegramNotifier::from_config(&config(true)).is_some());
    }

    #[test]
    fn test_request_and_response_shapes() {
        let body = serde_json::to_value(SendMessageRequest {
            chat_id: "-100200",
            text: "<b>hi</b>",
            parse_mode: "HTML",
        })
        .unwrap();
        assert_eq!(body["chat_id"], "-100200");
        assert_eq!(body["parse_mode"], "HTML");

        let sent: ApiResponse<SentMessage> =
            serde_json::from_str(r#"{"ok":true,"result":{"message_id":42,"chat":{"id":1}}}"#)
                .unwrap();
        assert!(sent.ok);
        assert_eq!(sent.result.unwrap().message_id, 42);

        let rejected: ApiResponse<SentMessage> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap();
        assert!(!rejected.ok);
        assert!(rejected.result.is_none());
        assert_eq!(rejected.description.unwrap(), "Bad Request: chat not found");
    }
}
