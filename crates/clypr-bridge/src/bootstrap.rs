//! Startup wiring.
//!
//! Builds every component from a validated [`Config`], then runs the
//! dispatch loop, the confirmation listener and the token sweep side by side.
//! Errors returned from here are fatal; once running, the bridge only stops
//! on Ctrl-C or when the listener dies.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use clypr_bridge_telegram::TelegramClient;

use crate::adapters::{EmailAdapter, EmailSender, TelegramVerificationAdapter, WebhookAdapter};
use crate::config::Config;
use crate::delivery::{DeliveryPolicy, HttpDelivery};
use crate::dispatch::{AdapterSet, Dispatcher};
use crate::redact::Redactor;
use crate::registry::{TokenRegistry, spawn_expiry_sweep};
use crate::server::{AppState, build_app};
use crate::source::{HttpJobSource, Identity, JobSource};

/// A fully wired bridge, ready to run.
pub struct Bridge {
    pub dispatcher: Dispatcher,
    pub app: Router,
    pub registry: TokenRegistry,
    bind_addr: String,
    sweep_interval: Duration,
}

impl Bridge {
    /// Wire the bridge around an existing job source.
    pub fn with_source(config: &Config, source: Arc<dyn JobSource>) -> Result<Self> {
        let redactor = Redactor::new(config.logging.redact_sensitive);
        let registry = TokenRegistry::new();

        let delivery_client = reqwest::Client::builder()
            .build()
            .context("failed to build delivery http client")?;
        let policy = DeliveryPolicy {
            timeout: Duration::from_millis(config.webhook.timeout_ms),
            retries: config.webhook.retries,
            backoff: Duration::from_millis(config.webhook.backoff_ms),
        };
        let webhook: Arc<WebhookAdapter> = Arc::new(WebhookAdapter::new(
            HttpDelivery::new(delivery_client),
            config.webhook.default_url.clone(),
            policy,
        ));

        let sender = Arc::new(EmailSender::new(config.email.clone(), redactor));
        if config.email.demo {
            info!(dir = %config.email.demo_dir.display(), "Demo email mode, emails are written to disk");
        } else if config.email.smtp_host.is_none() {
            warn!(dir = %config.email.fallback_dir.display(), "SMTP_HOST not set, emails without job SMTP settings go to disk");
        }

        let adapters = AdapterSet {
            telegram_verification: Arc::new(TelegramVerificationAdapter::new(
                registry.clone(),
                redactor,
            )),
            email_verification: Arc::new(EmailAdapter::verification(
                Arc::clone(&sender),
                config.email.frontend_origin.clone(),
            )),
            email_message: Arc::new(EmailAdapter::message(sender)),
            webhook: webhook.clone(),
            generic: webhook,
        };

        let telegram = match config.telegram.bot_token.as_deref() {
            Some(token) => Some(
                TelegramClient::new(&config.telegram.api_url, token)
                    .context("failed to build Telegram client")?,
            ),
            None => {
                warn!("TELEGRAM_BOT_TOKEN not set, chat replies are disabled");
                None
            }
        };

        let app = build_app(
            AppState {
                registry: registry.clone(),
                source: Arc::clone(&source),
                telegram,
                redactor,
            },
            &config.telegram.webhook_path,
            config.server.request_timeout_seconds,
        );

        Ok(Self {
            dispatcher: Dispatcher::new(source, adapters, config.dispatch.clone()),
            app,
            registry,
            bind_addr: format!("{}:{}", config.server.host, config.server.port),
            sweep_interval: Duration::from_secs(config.telegram.sweep_interval_seconds.max(1)),
        })
    }

    /// Wire the bridge against the backend named in `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let canister_id = config
            .backend
            .canister_id
            .as_deref()
            .context("CANISTER_ID is required")?;

        let identity = match &config.backend.identity_path {
            Some(path) => Some(
                Identity::load(path)
                    .await
                    .context("failed to load bridge identity")?,
            ),
            None => {
                warn!("No bridge identity configured, calling the backend anonymously");
                None
            }
        };

        let backend_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.backend.request_timeout_ms))
            .build()
            .context("failed to build backend http client")?;
        let source = HttpJobSource::new(
            backend_client,
            &config.backend.host,
            canister_id,
            identity,
        );
        info!(host = %config.backend.host, canister_id, "Using backend job source");

        Self::with_source(config, Arc::new(source))
    }

    /// Run until Ctrl-C. Returns an error if the listener cannot start or fails.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .with_context(|| format!("failed to bind listener to {}", self.bind_addr))?;
        info!(addr = %self.bind_addr, "Confirmation listener started");

        let sweep = spawn_expiry_sweep(self.registry.clone(), self.sweep_interval);
        let server = axum::serve(listener, self.app).into_future();

        let result = tokio::select! {
            res = server => res.context("confirmation listener failed"),
            () = self.dispatcher.run() => Ok(()),
            res = tokio::signal::ctrl_c() => res
                .context("failed to listen for shutdown signal")
                .map(|()| info!("Shutdown signal received")),
        };

        sweep.abort();
        result
    }
}
