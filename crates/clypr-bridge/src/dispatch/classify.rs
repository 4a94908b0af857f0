//! Job classification.

use clypr_bridge_protocol::{ChannelType, DispatchJob, intents};

/// Which adapter handles a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    TelegramVerification,
    EmailVerification,
    EmailMessage,
    Webhook,
    /// Webhook-style delivery for channels without a dedicated adapter.
    Generic,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TelegramVerification => "telegram_verification",
            Self::EmailVerification => "email_verification",
            Self::EmailMessage => "email",
            Self::Webhook => "webhook",
            Self::Generic => "generic",
        }
    }
}

/// Route a job. Verification intents win over the channel type.
pub fn classify(job: &DispatchJob) -> Route {
    if has_intent_type(job, intents::TELEGRAM_VERIFICATION) {
        return Route::TelegramVerification;
    }
    if has_intent_type(job, intents::EMAIL_VERIFICATION) {
        return Route::EmailVerification;
    }
    match job.channel_type {
        ChannelType::Email => Route::EmailMessage,
        ChannelType::Webhook => Route::Webhook,
        ChannelType::TelegramContact
        | ChannelType::Sms
        | ChannelType::Push
        | ChannelType::Custom(_)
        | ChannelType::Unknown(_) => Route::Generic,
    }
}

fn has_intent_type(job: &DispatchJob, wanted: &str) -> bool {
    job.intents
        .iter()
        .any(|(key, value)| key == intents::INTENT_TYPE && value == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn job(channel_type: Value, intents: Value) -> DispatchJob {
        serde_json::from_value(json!({
            "id": 1,
            "channelType": channel_type,
            "intents": intents
        }))
        .unwrap()
    }

    #[test]
    fn verification_intents_take_precedence() {
        assert_eq!(
            classify(&job(json!("webhook"), json!([["intentType", "telegram_verification"]]))),
            Route::TelegramVerification
        );
        assert_eq!(
            classify(&job(json!("webhook"), json!([["intentType", "email_verification"]]))),
            Route::EmailVerification
        );
        assert_eq!(
            classify(&job(
                json!("email"),
                json!([
                    ["intentType", "email_verification"],
                    ["intentType", "telegram_verification"]
                ])
            )),
            Route::TelegramVerification
        );
    }

    #[test]
    fn channel_type_routes() {
        assert_eq!(classify(&job(json!("email"), json!([]))), Route::EmailMessage);
        assert_eq!(classify(&job(json!({"webhook": null}), json!([]))), Route::Webhook);
        assert_eq!(classify(&job(json!("telegramContact"), json!([]))), Route::Generic);
        assert_eq!(classify(&job(json!("telegram"), json!([]))), Route::Generic);
        assert_eq!(classify(&job(json!({"custom": "pager"}), json!([]))), Route::Generic);
        assert_eq!(classify(&job(json!("carrier-pigeon"), json!([]))), Route::Generic);
    }

    #[test]
    fn unrelated_intent_type_falls_through() {
        assert_eq!(
            classify(&job(json!("email"), json!([["intentType", "digest"]]))),
            Route::EmailMessage
        );
    }
}
