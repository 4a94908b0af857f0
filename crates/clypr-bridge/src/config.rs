//! Bridge configuration.
//!
//! Values come from an optional YAML file and are then overlaid by the
//! environment (`CANISTER_ID`, `BRIDGE_LIMIT`, `SMTP_HOST`, ...). The
//! environment always wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub email: EmailSettings,
    #[serde(default)]
    pub webhook: WebhookSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load the YAML file at `path`; a missing file yields defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Overlay values from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`. Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CANISTER_ID") {
            self.backend.canister_id = Some(v);
        }
        if let Some(v) = get("IC_HOST") {
            self.backend.host = v;
        }
        if let Some(v) = get("BRIDGE_IDENTITY_PATH") {
            self.backend.identity_path = Some(PathBuf::from(v));
        }

        if let Some(v) = get("BRIDGE_LIMIT") {
            self.dispatch.batch_limit = parse_env("BRIDGE_LIMIT", &v)?;
        }
        if let Some(v) = get("POLL_INTERVAL_MS") {
            self.dispatch.poll_interval_ms = parse_env("POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("BRIDGE_CONCURRENCY") {
            self.dispatch.concurrency = parse_env("BRIDGE_CONCURRENCY", &v)?;
        }

        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }

        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_API_URL") {
            self.telegram.api_url = v;
        }
        if let Some(v) = get("TELEGRAM_WEBHOOK_PATH") {
            self.telegram.webhook_path = normalize_path(&v);
        }

        if let Some(v) = get("SMTP_HOST") {
            self.email.smtp_host = Some(v);
        }
        if let Some(v) = get("SMTP_PORT") {
            self.email.smtp_port = parse_env("SMTP_PORT", &v)?;
        }
        if let Some(v) = get("SMTP_USER") {
            self.email.smtp_user = Some(v);
        }
        if let Some(v) = get("SMTP_PASS") {
            self.email.smtp_pass = Some(v);
        }
        if let Some(v) = get("VERIFICATION_FROM") {
            self.email.from = v;
        }
        if let Some(v) = get("FRONTEND_ORIGIN") {
            self.email.frontend_origin = v;
        }
        if let Some(v) = get("DEMO_EMAIL") {
            self.email.demo = parse_flag(&v);
        }
        if let Some(v) = get("DEMO_EMAIL_DIR") {
            self.email.demo_dir = PathBuf::from(v);
        }
        if let Some(v) = get("EMAIL_FALLBACK_DIR") {
            self.email.fallback_dir = PathBuf::from(v);
        }

        if let Some(v) = get("WEBHOOK_DEFAULT_URL") {
            self.webhook.default_url = Some(v);
        }

        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("REDACT_SENSITIVE_LOGS") {
            self.logging.redact_sensitive = parse_flag(&v);
        }

        Ok(())
    }

    /// Reject configurations the bridge cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend.canister_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => {}
            _ => return Err(ConfigError::Missing("CANISTER_ID")),
        }
        if self.dispatch.batch_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "BRIDGE_LIMIT",
                message: "must be at least 1".to_string(),
            });
        }
        if self.dispatch.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "BRIDGE_CONCURRENCY",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: format!("{value:?}: {e}"),
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

// ============================================================================
// BackendConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Canister hosting the job queue. Required.
    #[serde(default)]
    pub canister_id: Option<String>,
    #[serde(default = "default_backend_host")]
    pub host: String,
    /// Identity file presented to the backend as a bearer credential.
    #[serde(default)]
    pub identity_path: Option<PathBuf>,
    #[serde(default = "default_backend_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            canister_id: None,
            host: default_backend_host(),
            identity_path: None,
            request_timeout_ms: default_backend_timeout_ms(),
        }
    }
}

fn default_backend_host() -> String {
    "http://127.0.0.1:4943".to_string()
}

fn default_backend_timeout_ms() -> u64 {
    30_000
}

// ============================================================================
// DispatchConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Fixed delay after a failed poll.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Jobs of one batch processed at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_batch_limit() -> u32 {
    20
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_error_backoff_ms() -> u64 {
    1_000
}

fn default_concurrency() -> usize {
    4
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    30
}

// ============================================================================
// TelegramSettings
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TelegramSettings {
    /// Without a token, chat replies are skipped.
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_url: default_telegram_api_url(),
            webhook_path: default_webhook_path(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_telegram_api_url() -> String {
    clypr_bridge_telegram::DEFAULT_API_URL.to_string()
}

fn default_webhook_path() -> String {
    "/telegram/webhook".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

// ============================================================================
// EmailSettings
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct EmailSettings {
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_pass: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
    /// Base URL of the web app; verification links point here.
    #[serde(default = "default_frontend_origin")]
    pub frontend_origin: String,
    /// Write emails to `demo_dir` instead of sending them.
    #[serde(default)]
    pub demo: bool,
    #[serde(default = "default_demo_dir")]
    pub demo_dir: PathBuf,
    /// Where emails go when no SMTP server is configured.
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: PathBuf,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_user: None,
            smtp_pass: None,
            from: default_from(),
            frontend_origin: default_frontend_origin(),
            demo: false,
            demo_dir: default_demo_dir(),
            fallback_dir: default_fallback_dir(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from() -> String {
    "Clypr <no-reply@clypr.local>".to_string()
}

fn default_frontend_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_demo_dir() -> PathBuf {
    PathBuf::from("./demo-emails")
}

fn default_fallback_dir() -> PathBuf {
    PathBuf::from("./outbox")
}

// ============================================================================
// WebhookSettings
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    /// Target for jobs that carry no webhook URL of their own.
    #[serde(default)]
    pub default_url: Option<String>,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_webhook_retries")]
    pub retries: u32,
    #[serde(default = "default_webhook_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            default_url: None,
            timeout_ms: default_webhook_timeout_ms(),
            retries: default_webhook_retries(),
            backoff_ms: default_webhook_backoff_ms(),
        }
    }
}

fn default_webhook_timeout_ms() -> u64 {
    30_000
}

fn default_webhook_retries() -> u32 {
    2
}

fn default_webhook_backoff_ms() -> u64 {
    1_000
}

// ============================================================================
// LoggingConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Mask tokens, chat ids and addresses in log output.
    #[serde(default)]
    pub redact_sensitive: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            redact_sensitive: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dispatch.batch_limit, 20);
        assert_eq!(config.dispatch.poll_interval_ms, 500);
        assert_eq!(config.dispatch.error_backoff_ms, 1_000);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telegram.webhook_path, "/telegram/webhook");
        assert_eq!(config.telegram.sweep_interval_seconds, 60);
        assert_eq!(config.webhook.timeout_ms, 30_000);
        assert_eq!(config.webhook.retries, 2);
        assert_eq!(config.webhook.backoff_ms, 1_000);
        assert!(!config.email.demo);
        assert!(config.backend.canister_id.is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let missing_path = tmp_dir.path().join("missing-config.yaml");
        let config = Config::load(&missing_path).await.unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[tokio::test]
    async fn test_load_partial_yaml_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
backend:
  canister_id: "rrkah-fqaaa-aaaaa-aaaaq-cai"
dispatch:
  batch_limit: 5
email:
  demo: true
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(
            config.backend.canister_id.as_deref(),
            Some("rrkah-fqaaa-aaaaa-aaaaq-cai")
        );
        assert_eq!(config.dispatch.batch_limit, 5);
        assert_eq!(config.dispatch.poll_interval_ms, 500); // default
        assert!(config.email.demo);
        assert_eq!(config.email.smtp_port, 587); // default
    }

    #[tokio::test]
    async fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(file.path()).await;
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config.dispatch.batch_limit = 5;

        config
            .apply_env(env(&[
                ("CANISTER_ID", "abc-cai"),
                ("BRIDGE_LIMIT", "50"),
                ("POLL_INTERVAL_MS", "250"),
                ("PORT", "8088"),
                ("TELEGRAM_WEBHOOK_PATH", "tg/hook"),
                ("DEMO_EMAIL", "TRUE"),
                ("REDACT_SENSITIVE_LOGS", "1"),
                ("SMTP_HOST", ""),
            ]))
            .unwrap();

        assert_eq!(config.backend.canister_id.as_deref(), Some("abc-cai"));
        assert_eq!(config.dispatch.batch_limit, 50);
        assert_eq!(config.dispatch.poll_interval_ms, 250);
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.telegram.webhook_path, "/tg/hook");
        assert!(config.email.demo);
        assert!(config.logging.redact_sensitive);
        assert!(config.email.smtp_host.is_none()); // empty is unset
    }

    #[test]
    fn invalid_env_number_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("BRIDGE_LIMIT", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("BRIDGE_LIMIT"));
    }

    #[test]
    fn validate_requires_canister_id() {
        let mut config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("CANISTER_ID"))
        ));

        config.backend.canister_id = Some("  ".to_string());
        assert!(config.validate().is_err());

        config.backend.canister_id = Some("abc-cai".to_string());
        assert!(config.validate().is_ok());

        config.dispatch.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_error_display() {
        let io_error = ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "test",
        ));
        assert!(io_error.to_string().contains("failed to read config file"));
    }
}
