use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Result of handing a message to the operator channel.
/// Callers log it, they never act on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The channel answered with a non-success status.
    Rejected { status: u16, body: String },
    /// The request never completed.
    Failed { reason: String },
    /// No channel is configured, the message only went to the log.
    LogOnly,
}

#[async_trait]
pub trait Notifier {
    async fn notify(&self, message: &str, severity: Severity) -> Delivery;
}

#[async_trait]
impl<T> Notifier for Box<T>
where
    T: Notifier + Send + Sync + ?Sized,
{
    async fn notify(&self, message: &str, severity: Severity) -> Delivery {
        (**self).notify(message, severity).await
    }
}

/// Used when no Telegram credentials are configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str, severity: Severity) -> Delivery {
        match severity {
            Severity::Info => log::info!("Notification: {message}"),
            Severity::Error => log::error!("Notification: {message}"),
        }
        Delivery::LogOnly
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
    /// Base URL of the Bot API, without trailing slash.
    pub api_base: String,
    pub timeout: Duration,
}

#[derive(serde::Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.token
        )
    }

    async fn send(&self, text: &str) -> Delivery {
        let payload = SendMessage {
            chat_id: &self.config.chat_id,
            text,
        };

        let response = match self
            .client
            .post(self.send_message_url())
            .timeout(self.config.timeout)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            // Strip the URL, it carries the bot token.
            Err(e) => {
                return Delivery::Failed {
                    reason: e.without_url().to_string(),
                };
            }
        };

        let status = response.status();
        if status.is_success() {
            return Delivery::Delivered;
        }

        let body = response.text().await.unwrap_or_default();
        Delivery::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str, severity: Severity) -> Delivery {
        let delivery = self.send(message).await;
        match &delivery {
            Delivery::Delivered => log::info!("Message sent successfully ({severity:?})"),
            Delivery::Rejected { status, body } => {
                log::warn!("Failed to send message: HTTP {status} {body}")
            }
            Delivery::Failed { reason } => log::warn!("Failed to send message: {reason}"),
            Delivery::LogOnly => {}
        }
        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_base: String) -> TelegramConfig {
        TelegramConfig {
            token: "123:abc".to_string(),
            chat_id: "@monitor".to_string(),
            api_base,
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_json(json!({"chat_id": "@monitor", "text": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(config(server.uri()), reqwest::Client::new());
        assert_eq!(
            notifier.notify("hello", Severity::Info).await,
            Delivery::Delivered
        );
    }

    #[tokio::test]
    async fn test_trailing_slash_in_api_base() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::new(config(format!("{}/", server.uri())), reqwest::Client::new());
        assert_eq!(
            notifier.notify("hello", Severity::Error).await,
            Delivery::Delivered
        );
    }

    #[tokio::test]
    async fn test_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("chat not found"))
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(config(server.uri()), reqwest::Client::new());
        assert_eq!(
            notifier.notify("hello", Severity::Error).await,
            Delivery::Rejected {
                status: 400,
                body: "chat not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_does_not_leak_token() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let notifier = TelegramNotifier::new(
            config(format!("http://127.0.0.1:{port}")),
            reqwest::Client::new(),
        );
        match notifier.notify("hello", Severity::Error).await {
            Delivery::Failed { reason } => assert!(!reason.contains("123:abc"), "{reason}"),
            other => panic!("unexpected delivery {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_log_notifier() {
        assert_eq!(
            LogNotifier.notify("hello", Severity::Info).await,
            Delivery::LogOnly
        );
    }
}
