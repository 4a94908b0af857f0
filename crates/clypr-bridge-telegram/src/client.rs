//! Outbound Bot API calls.

use teloxide::prelude::*;
use teloxide::types::Recipient;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Public Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Errors from Bot API calls.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// The configured API base URL does not parse
    #[error("invalid telegram api url {url:?}: {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Bot API request failed or answered with `ok: false`
    #[error("telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),
}

/// Bot API client for chat replies.
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
    api_url: Url,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_url", &self.api_url.as_str())
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Build a client talking to `api_url` (normally [`DEFAULT_API_URL`]).
    pub fn new(api_url: &str, bot_token: impl Into<String>) -> Result<Self, TelegramError> {
        let api_url = Url::parse(api_url).map_err(|source| TelegramError::InvalidApiUrl {
            url: api_url.to_string(),
            source,
        })?;
        let bot = Bot::new(bot_token).set_api_url(api_url.clone());
        Ok(Self { bot, api_url })
    }

    /// Send a plain-text message to `chat_id`.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TelegramError> {
        self.bot.send_message(recipient(chat_id), text).await?;
        debug!("telegram message sent");
        Ok(())
    }
}

/// Numeric ids address a chat directly; anything else is a `@channel` name.
fn recipient(chat_id: &str) -> Recipient {
    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.to_string()),
    }
}
