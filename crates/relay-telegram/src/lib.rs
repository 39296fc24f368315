//! Telegram adapter (teloxide).
//!
//! Implements the `relay-core` [`MessagingPort`] and [`FileSource`] ports over
//! the Telegram Bot API, plus the update dispatcher in [`router`].

use async_trait::async_trait;

use teloxide::{net::Download, prelude::*};

use tokio::time::sleep;
use tracing::warn;

pub mod handlers;
pub mod router;

use relay_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{fit_message, MessagingCapabilities},
    },
    ports::FileSource,
    Result,
};

/// Telegram's hard limit for one text message, in UTF-16 code units.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat_id.0)
}

async fn with_retry<T, Fut>(mut op: impl FnMut() -> Fut) -> std::result::Result<T, teloxide::RequestError>
where
    Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
    Fut::IntoFuture: Send,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                warn!(retry_after_ms = d.as_millis() as u64, "telegram flood control, retrying");
                sleep(d).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: TELEGRAM_MAX_MESSAGE_LEN,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let text = fit_message(text, self.capabilities().max_message_len);
        let msg = with_retry(|| self.bot.send_message(tg_chat(chat_id), text.clone()))
            .await
            .map_err(|e| Error::External(format!("telegram send failed: {e}")))?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}

/// Voice note downloads through the Bot API file endpoint.
#[derive(Clone)]
pub struct TelegramFiles {
    bot: Bot,
}

impl TelegramFiles {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl FileSource for TelegramFiles {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = with_retry(|| self.bot.get_file(file_id.to_string()))
            .await
            .map_err(|e| Error::FileRetrieval(format!("get_file failed: {e}")))?;

        let mut dst: Vec<u8> = Vec::with_capacity(file.size as usize);
        self.bot
            .download_file(&file.path, &mut dst)
            .await
            .map_err(|e| Error::FileRetrieval(format!("download failed: {e}")))?;
        Ok(dst)
    }
}
