//! Backend job source.
//!
//! The backend owns the job queue and all durable state. The bridge pulls
//! batches, reports terminal statuses, and forwards verification
//! confirmations through the [`JobSource`] seam.

mod http;

use async_trait::async_trait;
use thiserror::Error;

use clypr_bridge_protocol::{DeliveryStatus, DispatchJob, JobId};

pub use http::{HttpJobSource, Identity};

/// Errors from backend calls.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Backend answered with a non-success HTTP status
    #[error("backend http error (status {status}): {message}")]
    Http { status: u16, message: String },

    /// Backend returned the `err` variant of its result
    #[error("backend rejected {method}: {message}")]
    Rejected { method: &'static str, message: String },

    /// Response body did not match the expected shape
    #[error("failed to decode backend response for {method}: {message}")]
    Decode { method: &'static str, message: String },

    /// Identity file could not be loaded
    #[error("failed to load identity from {path}: {message}")]
    Identity { path: String, message: String },
}

/// The external queue of dispatch jobs.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Fetch up to `limit` pending jobs.
    async fn next_dispatch_jobs(&self, limit: u32) -> Result<Vec<DispatchJob>, SourceError>;

    /// Report the terminal status of a job.
    async fn acknowledge_job_delivery(
        &self,
        job_id: JobId,
        status: DeliveryStatus,
    ) -> Result<(), SourceError>;

    /// Tell the backend a chat proved control of a verification token.
    async fn bridge_confirm_verification(
        &self,
        token: &str,
        chat_id: &str,
    ) -> Result<(), SourceError>;
}
