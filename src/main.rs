use std::{net::IpAddr, path::PathBuf, time::Duration};

use anyhow::{ensure, Context};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

mod bot;
use bot::TelegramNotifier;

mod config;
use config::{is_truthy, LocaleConfig, StarbotConfig, TelegramConfig, WebhookSecret};

mod locale;
use locale::Locales;

mod webhooks;

/// Announces GitHub stars in a Telegram chat.
///
/// Every option can also be set through the environment variable named after it.
#[derive(Parser)]
#[command(version)]
struct Opts {
    /// Secret GitHub signs webhook payloads with
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: String,

    /// Token of the Telegram bot posting the messages
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_bot_token: String,

    /// Chat the messages are posted to, negative for groups and channels
    #[arg(long, env = "TELEGRAM_CHAT_ID", allow_hyphen_values = true)]
    telegram_chat_id: String,

    /// Base URL of the Telegram Bot API
    #[arg(long, env = "TELEGRAM_API_URL", default_value = "https://api.telegram.org")]
    telegram_api_url: Url,

    /// How long to wait for the Bot API, in seconds
    #[arg(long, env = "TELEGRAM_TIMEOUT", default_value_t = 5)]
    telegram_timeout: u64,

    /// Language of the messages [default: pt]
    #[arg(long, env = "LANGUAGE")]
    language: Option<String>,

    /// Language used for messages missing from the main one [default: en]
    #[arg(long, env = "FALLBACK_LANGUAGE")]
    fallback_language: Option<String>,

    /// Directory with `<language>.json` tables overriding the bundled ones
    #[arg(long, env = "LOCALES_DIR")]
    locales_dir: Option<PathBuf>,

    /// Don't verify webhook signatures. Only for local testing!
    #[arg(long, env = "DEBUG")]
    debug: Option<String>,

    #[arg(long, env = "ADDRESS", default_value = "0.0.0.0")]
    address: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

const DEFAULT_LANGUAGE: &str = "pt";
const DEFAULT_FALLBACK_LANGUAGE: &str = "en";

/// An empty language, e.g. `LANGUAGE=`, means the default one.
fn language_or(language: Option<String>, default: &str) -> String {
    language
        .filter(|language| !language.trim().is_empty())
        .unwrap_or_else(|| default.to_owned())
}

impl Opts {
    fn into_config(self) -> anyhow::Result<StarbotConfig> {
        ensure!(!self.webhook_secret.is_empty(), "WEBHOOK_SECRET is empty");
        ensure!(
            !self.telegram_bot_token.is_empty(),
            "TELEGRAM_BOT_TOKEN is empty"
        );
        ensure!(!self.telegram_chat_id.is_empty(), "TELEGRAM_CHAT_ID is empty");

        Ok(StarbotConfig {
            webhook: WebhookSecret {
                secret: self.webhook_secret,
                skip_verification: self.debug.as_deref().map_or(false, is_truthy),
            },
            telegram: TelegramConfig {
                api_url: self.telegram_api_url,
                bot_token: self.telegram_bot_token,
                chat_id: self.telegram_chat_id,
                timeout: Duration::from_secs(self.telegram_timeout),
            },
            locale: LocaleConfig {
                language: language_or(self.language, DEFAULT_LANGUAGE),
                fallback_language: language_or(self.fallback_language, DEFAULT_FALLBACK_LANGUAGE),
                locales_dir: self.locales_dir,
            },
            address: self.address,
            port: self.port,
        })
    }
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Opts::parse()
        .into_config()
        .context("invalid configuration")?;

    if config.webhook.skip_verification {
        warn!("DEBUG is set, webhook signatures will NOT be verified");
    }

    let locales = Locales::load(&config.locale).context("couldn't load locale tables")?;
    let notifier =
        TelegramNotifier::new(&config.telegram).context("failed to create telegram notifier")?;

    info!(
        "listening for webhooks on http://{}:{}/webhook",
        config.address, config.port
    );

    let figment = config.figment();
    let rocket = webhooks::build(figment, config.webhook, locales, Box::new(notifier));
    rocket
        .launch()
        .await
        .map_err(|err| anyhow::anyhow!("rocket failed: {}", err))?;

    Ok(())
}
