use std::{net::IpAddr, path::PathBuf, time::Duration};

use rocket::figment::Figment;
use url::Url;

/// Everything starbot needs to run, built once at startup from the command line / environment.
pub struct StarbotConfig {
    pub webhook: WebhookSecret,
    pub telegram: TelegramConfig,
    pub locale: LocaleConfig,
    /// Address the webhook server listens on
    pub address: IpAddr,
    /// Port the webhook server listens on
    pub port: u16,
}

impl StarbotConfig {
    /// Rocket's own configuration, with our listen address and port on top.
    pub fn figment(&self) -> Figment {
        rocket::Config::figment()
            .merge(("address", self.address))
            .merge(("port", self.port))
    }
}

/// Shared secret GitHub signs its payloads with.
pub struct WebhookSecret {
    pub secret: String,
    /// Accept every payload without checking its signature. Never enable this in production.
    pub skip_verification: bool,
}

pub struct TelegramConfig {
    /// Base URL of the Bot API, `https://api.telegram.org` unless proxied
    pub api_url: Url,
    pub bot_token: String,
    /// Chat the notifications are posted to
    pub chat_id: String,
    pub timeout: Duration,
}

pub struct LocaleConfig {
    pub language: String,
    pub fallback_language: String,
    /// Directory containing `<language>.json` tables overriding the bundled ones
    pub locales_dir: Option<PathBuf>,
}

/// Environment-style boolean: anything but an empty string, `0`, `false`, `no` or `off` is true.
pub fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}
