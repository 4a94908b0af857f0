//! Dispatch loop.
//!
//! Pulls batches from the [`JobSource`], routes every job to one adapter and
//! acknowledges the outcome. Deferred jobs are left to the confirmation
//! webhook. A failing job never stops the loop.

mod classify;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use clypr_bridge_protocol::DispatchJob;

use crate::adapters::{ChannelAdapter, DeliveryOutcome};
use crate::config::DispatchConfig;
use crate::source::{JobSource, SourceError};

pub use classify::{Route, classify};

/// One adapter per route.
#[derive(Clone)]
pub struct AdapterSet {
    pub telegram_verification: Arc<dyn ChannelAdapter>,
    pub email_verification: Arc<dyn ChannelAdapter>,
    pub email_message: Arc<dyn ChannelAdapter>,
    pub webhook: Arc<dyn ChannelAdapter>,
    pub generic: Arc<dyn ChannelAdapter>,
}

impl AdapterSet {
    pub fn for_route(&self, route: Route) -> &Arc<dyn ChannelAdapter> {
        match route {
            Route::TelegramVerification => &self.telegram_verification,
            Route::EmailVerification => &self.email_verification,
            Route::EmailMessage => &self.email_message,
            Route::Webhook => &self.webhook,
            Route::Generic => &self.generic,
        }
    }
}

pub struct Dispatcher {
    source: Arc<dyn JobSource>,
    adapters: AdapterSet,
    config: DispatchConfig,
}

impl Dispatcher {
    #[must_use]
    pub fn new(source: Arc<dyn JobSource>, adapters: AdapterSet, config: DispatchConfig) -> Self {
        Self {
            source,
            adapters,
            config,
        }
    }

    /// Poll forever.
    ///
    /// Sleeps the poll interval only after an empty batch; a full batch is
    /// followed by another poll straight away.
    pub async fn run(&self) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let error_backoff = Duration::from_millis(self.config.error_backoff_ms);
        info!(
            batch_limit = self.config.batch_limit,
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            "Dispatch loop started"
        );

        loop {
            match self.poll_once().await {
                Ok(0) => tokio::time::sleep(poll_interval).await,
                Ok(count) => debug!(count, "Batch processed"),
                Err(e) => {
                    warn!(error = %e, "Polling for jobs failed, backing off");
                    tokio::time::sleep(error_backoff).await;
                }
            }
        }
    }

    /// Fetch and process one batch. Returns the number of jobs handled.
    pub async fn poll_once(&self) -> Result<usize, SourceError> {
        let jobs = self
            .source
            .next_dispatch_jobs(self.config.batch_limit)
            .await?;
        let count = jobs.len();
        if count == 0 {
            return Ok(0);
        }

        futures::stream::iter(jobs)
            .for_each_concurrent(self.config.concurrency.max(1), |job| self.process(job))
            .await;
        Ok(count)
    }

    async fn process(&self, job: DispatchJob) {
        let job_id = job.id;
        let route = classify(&job);
        let adapter = Arc::clone(self.adapters.for_route(route));

        if job.is_expired_at(now_ns()) {
            warn!(job_id, route = route.as_str(), "Job is past its expiry, attempting anyway");
        }
        debug!(job_id, route = route.as_str(), adapter = adapter.name(), "Dispatching job");

        // A panicking adapter only takes down its own task.
        let outcome = match tokio::spawn(async move { adapter.attempt(&job).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_id, route = route.as_str(), error = %e, "Adapter task aborted");
                DeliveryOutcome::Failed
            }
        };

        let Some(status) = outcome.status() else {
            debug!(job_id, "Delivery deferred, awaiting confirmation");
            return;
        };

        match self.source.acknowledge_job_delivery(job_id, status).await {
            Ok(()) => info!(job_id, status = %status, "Job acknowledged"),
            Err(e) => warn!(job_id, status = %status, error = %e, "Failed to acknowledge job"),
        }
    }
}

/// Current time in nanoseconds since the epoch.
fn now_ns() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or(u64::MAX)
}
