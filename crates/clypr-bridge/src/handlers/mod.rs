//! HTTP request handlers.

mod health;
mod telegram;

pub use health::{livez, root};
pub use telegram::telegram_webhook;
