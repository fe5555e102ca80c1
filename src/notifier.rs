use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Telegram Bot API session: outbound alerts and inbound long-polling.
#[derive(Clone)]
pub struct Notifier {
    api_base: String,
    bot_token: String,
    chat_id: Option<i64>,
    http: Client,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// Raw inbound text. Interpreting it is the command layer's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub update_id: i64,
    pub chat_id: i64,
    pub text: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: Option<i64>) -> Self {
        Self::with_api_base(TELEGRAM_API.to_string(), bot_token, chat_id)
    }

    pub fn with_api_base(api_base: String, bot_token: String, chat_id: Option<i64>) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
            http: Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    pub async fn alert(&self, text: &str) -> Result<()> {
        let Some(chat_id) = self.chat_id else {
            // Without a chat id there is nobody to alert.
            return Ok(());
        };

        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&SendMessage { chat_id, text })
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !resp.status().is_success() {
            return Err(anyhow!("telegram sendMessage failed: {}", resp.status()));
        }

        Ok(())
    }

    /// Long-polls `getUpdates`. Updates without text are skipped but still
    /// advance the offset through their `update_id`.
    pub async fn poll_updates(&self, offset: i64, timeout_secs: u64) -> Result<(Vec<InboundMessage>, i64)> {
        let resp = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[("offset", offset.to_string()), ("timeout", timeout_secs.to_string())])
            .timeout(poll_request_timeout(timeout_secs))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            // the URL carries the bot token
            .map_err(reqwest::Error::without_url)?;
        let body: TelegramResponse<Vec<Update>> = resp.json().await.map_err(reqwest::Error::without_url)?;
        parse_updates(body, offset)
    }
}

// Telegram holds the request for up to `timeout_secs`; leave headroom on top.
fn poll_request_timeout(timeout_secs: u64) -> Duration {
    Duration::from_secs(timeout_secs.saturating_add(10))
}

fn parse_updates(body: TelegramResponse<Vec<Update>>, offset: i64) -> Result<(Vec<InboundMessage>, i64)> {
    if !body.ok {
        return Err(anyhow!(
            "telegram getUpdates failed: {}",
            body.description.unwrap_or_else(|| "unknown error".into())
        ));
    }
    let mut next = offset;
    let mut out = Vec::new();
    for u in body.result.unwrap_or_default() {
        next = next.max(u.update_id + 1);
        if let Some(Message { chat, text: Some(text) }) = u.message {
            out.push(InboundMessage { update_id: u.update_id, chat_id: chat.id, text });
        }
    }
    Ok((out, next))
}

/// Inbound loop: receives raw messages and logs them until shutdown.
pub async fn run_inbound(notifier: Notifier, timeout_secs: u64, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    info!("telegram.inbound_start");
    let mut offset = 0;
    loop {
        let polled = tokio::select! {
            r = notifier.poll_updates(offset, timeout_secs) => r,
            _ = shutdown.changed() => {
                info!("telegram.inbound_stop");
                return Ok(());
            }
        };
        match polled {
            Ok((messages, next)) => {
                offset = next;
                for m in messages {
                    info!(chat_id = m.chat_id, update_id = m.update_id, text = %m.text, "telegram.inbound");
                }
            }
            Err(e) => {
                warn!(error = %e, "telegram.poll_failed");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
