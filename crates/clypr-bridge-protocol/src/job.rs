//! Dispatch job types.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::pairs;

/// Backend-assigned job identifier, stable for the job's lifetime.
pub type JobId = u64;

/// Well-known intent keys and values.
pub mod intents {
    /// Key carrying the job's intent classification.
    pub const INTENT_TYPE: &str = "intentType";
    /// Intent for proving control of a Telegram chat.
    pub const TELEGRAM_VERIFICATION: &str = "telegram_verification";
    /// Intent for proving control of an email address.
    pub const EMAIL_VERIFICATION: &str = "email_verification";
    /// One-time verification token.
    pub const TOKEN: &str = "token";
    /// Verification expiry, nanoseconds since the epoch.
    pub const EXPIRES_AT: &str = "expiresAt";
    /// Recipient email address.
    pub const EMAIL: &str = "email";
}

// ============================================================================
// DispatchJob
// ============================================================================

/// A unit of outbound work pulled from the backend queue.
///
/// Jobs are never mutated by the bridge; the only way to change their state
/// is to acknowledge a terminal [`DeliveryStatus`](crate::DeliveryStatus).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    #[serde(deserialize_with = "pairs::nat")]
    pub id: JobId,
    #[serde(default)]
    pub message_type: String,
    pub channel_type: ChannelType,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub content: MessageContent,
    /// Routing hints, in backend order.
    #[serde(default, deserialize_with = "pairs::deserialize")]
    pub intents: Vec<(String, String)>,
    #[serde(default)]
    pub channel_config: Option<ChannelConfig>,
    #[serde(default)]
    pub retry_config: Option<RetryConfig>,
    /// Nanoseconds since the epoch; `0` when the backend sets no expiry.
    #[serde(default, deserialize_with = "pairs::nat")]
    pub expires_at: u64,
    /// Nanoseconds since the epoch.
    #[serde(default, deserialize_with = "pairs::nat")]
    pub created_at: u64,
    /// Delivery attempts recorded by the backend so far.
    #[serde(default, deserialize_with = "pairs::nat")]
    pub attempts: u32,
}

impl DispatchJob {
    /// First intent value stored under `key`.
    pub fn intent(&self, key: &str) -> Option<&str> {
        self.intents
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The job's `intentType`, if any.
    pub fn intent_type(&self) -> Option<&str> {
        self.intent(intents::INTENT_TYPE)
    }

    /// Whether the job carries an expiry that lies at or before `now_ns`.
    pub fn is_expired_at(&self, now_ns: u64) -> bool {
        self.expires_at != 0 && self.expires_at <= now_ns
    }

    /// Webhook settings when the job is configured for a webhook channel.
    pub fn webhook_config(&self) -> Option<&WebhookConfig> {
        match &self.channel_config {
            Some(ChannelConfig::Webhook(cfg)) => Some(cfg),
            _ => None,
        }
    }

    /// Email settings when the job is configured for an email channel.
    pub fn email_config(&self) -> Option<&EmailChannelConfig> {
        match &self.channel_config {
            Some(ChannelConfig::Email(cfg)) => Some(cfg),
            _ => None,
        }
    }

    /// Telegram settings when the job is configured for a Telegram channel.
    pub fn telegram_config(&self) -> Option<&TelegramChannelConfig> {
        match &self.channel_config {
            Some(ChannelConfig::Telegram(cfg)) => Some(cfg),
            _ => None,
        }
    }
}

/// Message payload of a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default, deserialize_with = "pairs::nat")]
    pub priority: u8,
    #[serde(default, deserialize_with = "pairs::deserialize")]
    pub metadata: Vec<(String, String)>,
}

/// Per-job override of the delivery retry policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default, deserialize_with = "pairs::opt_nat")]
    pub max_attempts: Option<u32>,
    #[serde(default, deserialize_with = "pairs::opt_nat")]
    pub timeout_ms: Option<u64>,
    #[serde(default, deserialize_with = "pairs::opt_nat")]
    pub backoff_ms: Option<u64>,
}

// ============================================================================
// ChannelType
// ============================================================================

/// Channel a job is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelType {
    Email,
    Webhook,
    TelegramContact,
    Sms,
    Push,
    /// A backend-defined channel with its own name.
    Custom(String),
    /// A tag this bridge does not recognize (kept for logging).
    Unknown(String),
}

impl ChannelType {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "email" => Self::Email,
            "webhook" => Self::Webhook,
            "telegramContact" | "telegram" | "telegram_contact" => Self::TelegramContact,
            "sms" => Self::Sms,
            "push" => Self::Push,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Stable tag used on the wire and in logs.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Email => "email",
            Self::Webhook => "webhook",
            Self::TelegramContact => "telegramContact",
            Self::Sms => "sms",
            Self::Push => "push",
            Self::Custom(_) => "custom",
            Self::Unknown(tag) => tag,
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Custom(name) => write!(f, "custom:{name}"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl Serialize for ChannelType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Custom(name) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("custom", name)?;
                map.end()
            }
            other => serializer.serialize_str(other.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for ChannelType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match &value {
            Value::String(tag) => Self::from_tag(tag),
            Value::Object(_) => match single_entry(&value) {
                Some(("custom", inner)) => Self::Custom(inner.as_str().unwrap_or_default().to_string()),
                Some((tag, _)) => Self::from_tag(tag),
                None => Self::Unknown(value.to_string()),
            },
            other => Self::Unknown(other.to_string()),
        })
    }
}

// ============================================================================
// ChannelConfig
// ============================================================================

/// Channel-specific connection parameters.
#[derive(Debug, Clone)]
pub enum ChannelConfig {
    Webhook(WebhookConfig),
    Email(EmailChannelConfig),
    Telegram(TelegramChannelConfig),
    /// A variant this bridge has no adapter settings for.
    Unrecognized(Value),
}

impl Serialize for ChannelConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        match self {
            Self::Unrecognized(value) => value.serialize(serializer),
            Self::Webhook(cfg) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("webhook", cfg)?;
                map.end()
            }
            Self::Email(cfg) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("email", cfg)?;
                map.end()
            }
            Self::Telegram(cfg) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("telegram", cfg)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ChannelConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let Some((tag, inner)) = single_entry(&value) else {
            return Ok(Self::Unrecognized(value));
        };
        let inner = inner.clone();
        match tag {
            "webhook" => serde_json::from_value(inner)
                .map(Self::Webhook)
                .map_err(D::Error::custom),
            "email" => serde_json::from_value(inner)
                .map(Self::Email)
                .map_err(D::Error::custom),
            "telegram" | "telegramContact" => serde_json::from_value(inner)
                .map(Self::Telegram)
                .map_err(D::Error::custom),
            _ => Ok(Self::Unrecognized(value)),
        }
    }
}

/// Outbound webhook settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    /// Extra request headers; accepted as pairs, entries or an object.
    #[serde(default, deserialize_with = "pairs::deserialize")]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub auth_type: Option<WebhookAuth>,
}

/// Authentication injected into webhook requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WebhookAuth {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// SMTP-style settings carried on an email channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailChannelConfig {
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default, deserialize_with = "pairs::opt_nat")]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
}

/// Telegram chat settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    #[serde(default, deserialize_with = "pairs::opt_id")]
    pub chat_id: Option<String>,
}

/// The single `(tag, payload)` entry of a candid variant object.
fn single_entry(value: &Value) -> Option<(&str, &Value)> {
    match value {
        Value::Object(map) if map.len() == 1 => map.iter().next().map(|(k, v)| (k.as_str(), v)),
        _ => None,
    }
}
