//! Inbound Telegram updates.

use teloxide::types::{Message, Update, UpdateKind};

/// Text and originating chat extracted from an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingText {
    pub chat_id: String,
    pub text: String,
}

/// The text and chat id of `update`, if it carries any text.
///
/// Callback queries use their data before the text of the message.
pub fn incoming_text(update: &Update) -> Option<IncomingText> {
    let (chat_id, text) = match &update.kind {
        UpdateKind::Message(m) | UpdateKind::EditedMessage(m) | UpdateKind::ChannelPost(m) => {
            (m.chat.id, message_text(m))
        }
        UpdateKind::CallbackQuery(q) => {
            let message = q.message.as_ref()?;
            let text = q
                .data
                .as_deref()
                .or_else(|| message.regular_message().and_then(message_text));
            (message.chat().id, text)
        }
        _ => return None,
    };

    let text = text.filter(|t| !t.trim().is_empty())?;
    Some(IncomingText {
        chat_id: chat_id.0.to_string(),
        text: text.to_string(),
    })
}

fn message_text(message: &Message) -> Option<&str> {
    message.text().or_else(|| message.caption())
}

/// Extract the payload of a `/start <token>` command.
///
/// Accepts the `/start@BotName <token>` form Telegram uses in groups.
pub fn start_token(text: &str) -> Option<&str> {
    let mut words = text.split_whitespace();
    let command = words.next()?;
    let command = command.split('@').next().unwrap_or(command);
    if command != "/start" {
        return None;
    }
    words.next()
}
