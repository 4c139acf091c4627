use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use pi_sweeper_domain::{config::TelegramConfig, AccountAddress, Amount, Notifier};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

const TELEGRAM_API: &str = "https://api.telegram.org";
const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/// Posts messages to a single Telegram chat through the Bot API.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(TELEGRAM_TIMEOUT).build()?;
        Ok(Self::with_client(client, TELEGRAM_API, config))
    }

    pub fn with_client(client: Client, api_base: &str, config: &TelegramConfig) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                config.token()
            ),
            chat_id: config.chat_id().to_string(),
        }
    }

    async fn send(&self, text: &str) -> Result<(), reqwest::Error> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
        };
        self.client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) {
        match self.send(text).await {
            Ok(()) => {
                counter!("sweeper_notifications_total", "result" => "sent").increment(1);
            }
            Err(err) => {
                // The endpoint embeds the bot token, so strip it before logging.
                let err = err.without_url();
                counter!("sweeper_notifications_total", "result" => "failed").increment(1);
                warn!(error = %err, "telegram delivery failed");
            }
        }
    }
}

/// Fallback used when no chat is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        info!(message = text, "notification");
    }
}

/// Text sent once a sweep lands on the ledger.
pub fn sweep_message(
    amount: Amount,
    asset_label: &str,
    source: &AccountAddress,
    destination: &AccountAddress,
    transaction_link: &str,
) -> String {
    let asset_label = escape_markdown(asset_label);
    let transaction_link = escape_markdown(transaction_link);
    format!(
        "✅ Sweep confirmed\n\
         📤 Amount: {amount} {asset_label}\n\
         📮 From: {source}\n\
         📥 To: {destination}\n\
         🔗 Tx: {transaction_link}"
    )
}

pub fn rate_limited_message() -> String {
    "⚠️ Ledger API is rate limiting requests (HTTP 429). Sweeper stopped.".to_string()
}

pub fn invalid_phrase_message() -> String {
    "❌ Invalid recovery phrase. Sweeper stopped.".to_string()
}

pub fn startup_failure_message(err: &dyn std::fmt::Display) -> String {
    format!(
        "❌ Sweeper failed to start: {}",
        escape_markdown(&err.to_string())
    )
}

/// Backslash-escapes the characters Telegram's legacy Markdown treats as
/// entity markers, so arbitrary text cannot make a message unparseable.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
