//! Telegram verification adapter.
//!
//! Registers the job's token and defers the outcome. The confirmation webhook
//! later resolves the token and acknowledges the job.

use async_trait::async_trait;
use tracing::{info, warn};

use clypr_bridge_protocol::{DispatchJob, intents};

use super::{ChannelAdapter, DeliveryOutcome};
use crate::redact::Redactor;
use crate::registry::{TokenRegistry, now_ms};

/// Lifetime of a token whose job carries no usable expiry.
pub const DEFAULT_VERIFICATION_TTL_MS: u64 = 15 * 60 * 1000;

const NANOS_PER_MILLI: u64 = 1_000_000;

pub struct TelegramVerificationAdapter {
    registry: TokenRegistry,
    redactor: Redactor,
}

impl TelegramVerificationAdapter {
    #[must_use]
    pub fn new(registry: TokenRegistry, redactor: Redactor) -> Self {
        Self { registry, redactor }
    }

    /// Expiry in epoch milliseconds for a job processed at `now_ms`.
    pub fn expiry_ms(job: &DispatchJob, now_ms: u64) -> u64 {
        job.intent(intents::EXPIRES_AT)
            .and_then(|raw| raw.trim().replace('_', "").parse::<u64>().ok())
            .filter(|ns| *ns > 0)
            .or(Some(job.expires_at).filter(|ns| *ns > 0))
            .map_or(now_ms + DEFAULT_VERIFICATION_TTL_MS, |ns| ns / NANOS_PER_MILLI)
    }
}

/// The job's token: the `token` intent, else a single-word content body.
fn verification_token(job: &DispatchJob) -> Option<&str> {
    if let Some(token) = job.intent(intents::TOKEN).map(str::trim)
        && !token.is_empty()
    {
        return Some(token);
    }
    let body = job.content.body.trim();
    if body.is_empty() || body.contains(char::is_whitespace) {
        None
    } else {
        Some(body)
    }
}

#[async_trait]
impl ChannelAdapter for TelegramVerificationAdapter {
    fn name(&self) -> &'static str {
        "telegram_verification"
    }

    async fn attempt(&self, job: &DispatchJob) -> DeliveryOutcome {
        let Some(token) = verification_token(job) else {
            warn!(job_id = job.id, "Telegram verification job has no token");
            return DeliveryOutcome::Failed;
        };

        let now = now_ms();
        let expires_at_ms = Self::expiry_ms(job, now);
        if expires_at_ms <= now {
            warn!(job_id = job.id, token = %self.redactor.mask(token), "Verification token already expired at registration");
        }

        self.registry.register(token, job.id, expires_at_ms);
        info!(
            job_id = job.id,
            token = %self.redactor.mask(token),
            expires_at_ms,
            "Awaiting Telegram confirmation"
        );
        DeliveryOutcome::Deferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn job(value: Value) -> DispatchJob {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn registers_token_and_defers() {
        let registry = TokenRegistry::new();
        let adapter = TelegramVerificationAdapter::new(registry.clone(), Redactor::new(true));
        let expires_ns = (now_ms() + 600_000) * NANOS_PER_MILLI;

        let outcome = adapter
            .attempt(&job(json!({
                "id": 31,
                "channelType": "telegramContact",
                "intents": [
                    ["intentType", "telegram_verification"],
                    ["token", "abc123"],
                    ["expiresAt", expires_ns.to_string()]
                ]
            })))
            .await;

        assert_eq!(outcome, DeliveryOutcome::Deferred);
        let entry = registry.peek("abc123").unwrap();
        assert_eq!(entry.job_id, 31);
        assert_eq!(entry.expires_at_ms, expires_ns / NANOS_PER_MILLI);
    }

    #[tokio::test]
    async fn missing_token_fails() {
        let registry = TokenRegistry::new();
        let adapter = TelegramVerificationAdapter::new(registry.clone(), Redactor::default());

        let outcome = adapter
            .attempt(&job(json!({
                "id": 32,
                "channelType": "telegramContact",
                "intents": [["intentType", "telegram_verification"]],
                "content": {"body": "two words"}
            })))
            .await;

        assert_eq!(outcome, DeliveryOutcome::Failed);
        assert!(registry.is_empty());
    }

    #[test]
    fn token_from_body_when_intent_missing() {
        let j = job(json!({
            "id": 33,
            "channelType": "telegramContact",
            "content": {"body": "  xyz789\n"}
        }));
        assert_eq!(verification_token(&j), Some("xyz789"));
    }

    #[test]
    fn expiry_fallbacks() {
        let now = 1_700_000_000_000;

        let unparsable = job(json!({
            "id": 1,
            "channelType": "telegramContact",
            "intents": [["expiresAt", "soon"]]
        }));
        assert_eq!(
            TelegramVerificationAdapter::expiry_ms(&unparsable, now),
            now + DEFAULT_VERIFICATION_TTL_MS
        );

        let job_level = job(json!({
            "id": 2,
            "channelType": "telegramContact",
            "expiresAt": 1_800_000_000_000_000_000u64
        }));
        assert_eq!(
            TelegramVerificationAdapter::expiry_ms(&job_level, now),
            1_800_000_000_000
        );
    }
}
