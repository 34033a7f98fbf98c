use anyhow::Context;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, trace};
use url::Url;

use crate::{
    bot::{DeliveryResult, Notifier},
    config::TelegramConfig,
};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request to the Bot API failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Bot API answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<DeliveryError> for DeliveryResult {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Transport(_) => DeliveryResult::failed(None, err.to_string()),
            DeliveryError::Rejected { status, body } => DeliveryResult::failed(Some(status), body),
        }
    }
}

/// Body of the Bot API's `sendMessage` method.
#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

impl<'a> SendMessage<'a> {
    fn markdown(chat_id: &'a str, text: &'a str) -> Self {
        Self {
            chat_id,
            text,
            parse_mode: "markdown",
            disable_web_page_preview: true,
        }
    }
}

/// Posts messages to a single Telegram chat through the Bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    // contains the bot token, never log it
    endpoint: Url,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("couldn't build HTTP client")?;

        Ok(Self {
            client,
            endpoint: send_message_url(&config.api_url, &config.bot_token)?,
            chat_id: config.chat_id.clone(),
        })
    }

    async fn deliver(&self, text: &str) -> Result<u16, DeliveryError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&SendMessage::markdown(&self.chat_id, text))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(status.as_u16())
    }
}

#[rocket::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> DeliveryResult {
        trace!("sending message to chat {}", self.chat_id);

        match self.deliver(text).await {
            Ok(status) => {
                info!("telegram message sent: {}", text);
                DeliveryResult::delivered(status)
            }
            Err(e) => {
                error!("couldn't send telegram message: {}", e);
                e.into()
            }
        }
    }
}

fn send_message_url(api_url: &Url, bot_token: &str) -> anyhow::Result<Url> {
    let base = api_url.as_str().trim_end_matches('/');
    // don't put the token in the error, it would end up in the logs
    Url::parse(&format!("{}/bot{}/sendMessage", base, bot_token))
        .context("couldn't build Bot API URL from the configured API URL and token")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        task::JoinHandle,
    };

    use super::*;

    /// Serves a single request with `status` and `body`, and returns what it received.
    async fn answer_once(status: &'static str, body: &'static str) -> (Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();

            request
        });

        (url, server)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut request = Vec::new();
        let mut buf = [0; 4096];

        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);

            if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = std::str::from_utf8(&request[..end]).unwrap();
                let length = headers
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
        }

        String::from_utf8(request).unwrap()
    }

    fn config(api_url: &str) -> TelegramConfig {
        TelegramConfig {
            api_url: Url::parse(api_url).unwrap(),
            bot_token: "123456:ABC-DEF".to_owned(),
            chat_id: "-1001234567890".to_owned(),
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn send_message_body() {
        let body = serde_json::to_value(SendMessage::markdown("-42", "*hi*")).unwrap();

        assert_eq!(
            body,
            json!({
                "chat_id": "-42",
                "text": "*hi*",
                "parse_mode": "markdown",
                "disable_web_page_preview": true,
            })
        );
    }

    #[test]
    fn endpoint_url() {
        let notifier = TelegramNotifier::new(&config("https://api.telegram.org")).unwrap();
        assert_eq!(
            notifier.endpoint.as_str(),
            "https://api.telegram.org/bot123456:ABC-DEF/sendMessage"
        );

        let notifier = TelegramNotifier::new(&config("http://localhost:8081/proxy/")).unwrap();
        assert_eq!(
            notifier.endpoint.as_str(),
            "http://localhost:8081/proxy/bot123456:ABC-DEF/sendMessage"
        );
    }

    #[test]
    fn rejected_delivery_result() {
        let result: DeliveryResult = DeliveryError::Rejected {
            status: 400,
            body: r#"{"ok":false,"description":"Bad Request: chat not found"}"#.to_owned(),
        }
        .into();

        assert!(!result.success);
        assert_eq!(result.status_code, Some(400));
        assert!(result.detail.unwrap().contains("chat not found"));
    }

    #[rocket::async_test]
    async fn delivered_message() {
        let (url, server) = answer_once("200 OK", r#"{"ok":true,"result":{"message_id":7}}"#).await;
        let notifier = TelegramNotifier::new(&TelegramConfig {
            api_url: url,
            ..config("http://unused")
        })
        .unwrap();

        let result = notifier.send("⭐ *New star*").await;
        assert_eq!(result, DeliveryResult::delivered(200));

        let request = server.await.unwrap();
        assert!(
            request.starts_with("POST /bot123456:ABC-DEF/sendMessage HTTP/1.1\r\n"),
            "{}",
            request
        );

        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            body,
            json!({
                "chat_id": "-1001234567890",
                "text": "⭐ *New star*",
                "parse_mode": "markdown",
                "disable_web_page_preview": true,
            })
        );
    }

    #[rocket::async_test]
    async fn api_error_is_a_failed_delivery() {
        const ANSWER: &str = r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#;

        let (url, server) = answer_once("400 Bad Request", ANSWER).await;
        let notifier = TelegramNotifier::new(&TelegramConfig {
            api_url: url,
            ..config("http://unused")
        })
        .unwrap();

        let result = notifier.send("hello").await;
        server.await.unwrap();

        assert!(!result.success);
        assert_eq!(result.status_code, Some(400));
        assert_eq!(result.detail.as_deref(), Some(ANSWER));
    }

    #[rocket::async_test]
    async fn unreachable_api_is_a_failed_delivery() {
        // nothing listens on the discard port
        let notifier = TelegramNotifier::new(&config("http://127.0.0.1:9")).unwrap();

        let result = notifier.send("hello").await;

        assert!(!result.success);
        assert_eq!(result.status_code, None);
        assert!(!result.detail.unwrap().contains("ABC-DEF"));
    }
}
