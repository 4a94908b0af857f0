//! Telegram Bot API surface for the Clypr bridge, built on teloxide.
//!
//! Only the two pieces the confirmation path needs are exposed:
//!
//! - [`incoming_text`]: pulls the chat id and text out of an inbound
//!   [`Update`], covering `message`, `edited_message`, `channel_post` and
//!   `callback_query`. Every other update kind yields `None`.
//! - [`TelegramClient::send_message`]: plain-text replies to a chat.

mod client;
mod update;

pub use client::{DEFAULT_API_URL, TelegramClient, TelegramError};
pub use teloxide::types::Update;
pub use update::{IncomingText, incoming_text, start_token};
