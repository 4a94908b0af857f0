//! Clypr dispatch bridge.
//!
//! Polls the backend for outbound notification jobs, delivers each through a
//! channel adapter (email, webhook, Telegram verification) and reports the
//! outcome. Telegram verifications complete asynchronously through an
//! inbound webhook.

pub mod adapters;
pub mod bootstrap;
pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod handlers;
pub mod redact;
pub mod registry;
pub mod sanitize;
pub mod server;
pub mod source;
