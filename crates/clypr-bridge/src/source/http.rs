//! JSON-over-HTTP client for the backend canister gateway.
//!
//! Each backend method is a `POST {host}/api/v1/canisters/{canister}/{method}`
//! with a JSON argument record. Responses carry a candid-style result:
//! `{"ok": ...}` or `{"err": ...}`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use tracing::{debug, warn};

use clypr_bridge_protocol::{DeliveryStatus, DispatchJob, JobId};

use super::{JobSource, SourceError};

/// Credential presented to the backend on every call.
#[derive(Clone)]
pub struct Identity {
    path: PathBuf,
    credential: String,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Identity {
    /// Read the identity file. Missing, unreadable or empty files are errors.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let identity_error = |message: String| SourceError::Identity {
            path: path.display().to_string(),
            message,
        };

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| identity_error(e.to_string()))?;
        let credential = contents.trim().to_string();
        if credential.is_empty() {
            return Err(identity_error("file is empty".to_string()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            credential,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum CallResult<T> {
    Ok(T),
    Err(Value),
}

/// [`JobSource`] backed by the canister HTTP gateway.
pub struct HttpJobSource {
    client: Client,
    base_url: String,
    identity: Option<Identity>,
}

impl HttpJobSource {
    #[must_use]
    pub fn new(client: Client, host: &str, canister_id: &str, identity: Option<Identity>) -> Self {
        Self {
            client,
            base_url: format!(
                "{}/api/v1/canisters/{}",
                host.trim_end_matches('/'),
                canister_id.trim()
            ),
            identity,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        args: Value,
    ) -> Result<T, SourceError> {
        let url = format!("{}/{}", self.base_url, method);

        let mut req = self.client.post(&url).json(&args);
        if let Some(identity) = &self.identity {
            req = req.bearer_auth(&identity.credential);
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Http { status, message });
        }

        let body = response.text().await?;
        let result: CallResult<T> =
            serde_json::from_str(&body).map_err(|e| SourceError::Decode {
                method,
                message: e.to_string(),
            })?;

        match result {
            CallResult::Ok(value) => Ok(value),
            CallResult::Err(err) => Err(SourceError::Rejected {
                method,
                message: describe_backend_error(&err),
            }),
        }
    }

    /// Report a job that arrived in a shape this bridge cannot decode.
    async fn fail_undecodable(&self, raw: &Value, error: &serde_json::Error) {
        let Some(job_id) = raw_job_id(raw) else {
            warn!(error = %error, "Dropping undecodable job without a readable id");
            return;
        };
        warn!(job_id, error = %error, "Undecodable job, acknowledging as failed");
        if let Err(e) = self
            .acknowledge_job_delivery(job_id, DeliveryStatus::Failed)
            .await
        {
            warn!(job_id, error = %e, "Failed to acknowledge undecodable job");
        }
    }
}

#[async_trait]
impl JobSource for HttpJobSource {
    async fn next_dispatch_jobs(&self, limit: u32) -> Result<Vec<DispatchJob>, SourceError> {
        let raw_jobs: Vec<Value> = self
            .call("nextDispatchJobs", json!({ "limit": limit }))
            .await?;

        let mut jobs = Vec::with_capacity(raw_jobs.len());
        for raw in raw_jobs {
            match serde_json::from_value::<DispatchJob>(raw.clone()) {
                Ok(job) => jobs.push(job),
                Err(e) => self.fail_undecodable(&raw, &e).await,
            }
        }
        debug!(count = jobs.len(), "Fetched dispatch jobs");
        Ok(jobs)
    }

    async fn acknowledge_job_delivery(
        &self,
        job_id: JobId,
        status: DeliveryStatus,
    ) -> Result<(), SourceError> {
        let _: IgnoredAny = self
            .call(
                "acknowledgeJobDelivery",
                json!({ "jobId": job_id, "status": status }),
            )
            .await?;
        Ok(())
    }

    async fn bridge_confirm_verification(
        &self,
        token: &str,
        chat_id: &str,
    ) -> Result<(), SourceError> {
        let _: IgnoredAny = self
            .call(
                "bridgeConfirmVerification",
                json!({ "token": token, "chatId": chat_id }),
            )
            .await?;
        Ok(())
    }
}

fn raw_job_id(raw: &Value) -> Option<JobId> {
    match raw.get("id")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Human-readable form of a backend `err` payload.
fn describe_backend_error(err: &Value) -> String {
    match err {
        Value::String(s) => s.clone(),
        Value::Object(map) if map.len() == 1 => {
            let (tag, inner) = map.iter().next().map_or(("error", &Value::Null), |(k, v)| (k.as_str(), v));
            match inner {
                Value::Null => tag.to_string(),
                Value::String(s) => format!("{tag}: {s}"),
                other => format!("{tag}: {other}"),
            }
        }
        other => other.to_string(),
    }
}
