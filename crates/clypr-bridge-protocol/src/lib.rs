//! Clypr Bridge Protocol - the dispatch job model served by the backend queue.
//!
//! The backend exposes candid-style results over JSON. Variants arrive either
//! as a bare tag (`"email"`) or as a single-key object (`{"email": null}`,
//! `{"webhook": {...}}`); both shapes are accepted here and anything else
//! falls through to an explicit `Unknown` arm instead of failing silently.
//!
//! # Types
//!
//! - [`DispatchJob`]: one unit of outbound work, immutable once fetched
//! - [`ChannelType`] / [`ChannelConfig`]: routing tag and connection parameters
//! - [`DeliveryStatus`]: the terminal status reported back via acknowledgment

mod job;
mod pairs;
mod status;

pub use job::{
    ChannelConfig, ChannelType, DispatchJob, EmailChannelConfig, JobId, MessageContent,
    RetryConfig, TelegramChannelConfig, WebhookAuth, WebhookConfig, intents,
};
pub use status::DeliveryStatus;
