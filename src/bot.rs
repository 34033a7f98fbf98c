mod github;
pub use github::render_star_event;

mod telegram;
pub use telegram::TelegramNotifier;

/// Outcome of a single delivery attempt, only used for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub success: bool,
    /// HTTP status returned by the chat API, if we got that far
    pub status_code: Option<u16>,
    pub detail: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(status_code: u16) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            detail: None,
        }
    }

    pub fn failed(status_code: Option<u16>, detail: String) -> Self {
        Self {
            success: false,
            status_code,
            detail: Some(detail),
        }
    }
}

/// Something that can post a rendered message to the chat.
///
/// Implementations make exactly one attempt and never fail: errors are reported through the
/// returned [`DeliveryResult`].
#[rocket::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> DeliveryResult;
}
