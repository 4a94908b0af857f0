//! Channel adapters: one delivery strategy per channel type.
//!
//! Every adapter turns a job into exactly one [`DeliveryOutcome`] and never
//! returns an error; transport failures are logged and reported as
//! [`DeliveryOutcome::Failed`]. Only the Telegram verification adapter
//! returns [`DeliveryOutcome::Deferred`].

mod email;
mod telegram;
mod webhook;

use async_trait::async_trait;

use clypr_bridge_protocol::{DeliveryStatus, DispatchJob};

pub use email::{ComposedEmail, EmailAdapter, EmailError, EmailPurpose, EmailSender};
pub use telegram::{DEFAULT_VERIFICATION_TTL_MS, TelegramVerificationAdapter};
pub use webhook::{WebhookAdapter, WebhookError};

/// Result of one adapter attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
    /// Confirmation arrives later through an inbound callback.
    Deferred,
}

impl DeliveryOutcome {
    /// Status to acknowledge now; `None` for deferred jobs.
    pub fn status(self) -> Option<DeliveryStatus> {
        match self {
            Self::Delivered => Some(DeliveryStatus::Delivered),
            Self::Failed => Some(DeliveryStatus::Failed),
            Self::Deferred => None,
        }
    }
}

/// A channel-specific delivery strategy.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Attempt delivery of `job`.
    async fn attempt(&self, job: &DispatchJob) -> DeliveryOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferred_has_no_status() {
        assert_eq!(
            DeliveryOutcome::Delivered.status(),
            Some(DeliveryStatus::Delivered)
        );
        assert_eq!(DeliveryOutcome::Failed.status(), Some(DeliveryStatus::Failed));
        assert_eq!(DeliveryOutcome::Deferred.status(), None);
    }
}
