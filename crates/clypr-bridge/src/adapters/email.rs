//! Email adapter: verification links and plain notifications.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use clypr_bridge_protocol::{DispatchJob, EmailChannelConfig, intents};

use super::{ChannelAdapter, DeliveryOutcome};
use crate::config::EmailSettings;
use crate::redact::Redactor;
use crate::sanitize::is_secret_key;

const IMPLICIT_TLS_PORT: u16 = 465;
const VERIFY_PATH: &str = "verify-email";
const DEFAULT_SUBJECT: &str = "Clypr notification";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("job has no recipient address")]
    MissingRecipient,

    #[error("verification job has no token")]
    MissingToken,

    #[error("invalid address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("invalid frontend origin {0:?}")]
    Origin(String),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("failed to write email file: {0}")]
    File(#[from] lettre::transport::file::Error),

    #[error("failed to prepare email directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Composition
// ============================================================================

/// Which of the two email flows a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailPurpose {
    Verification,
    Message,
}

/// A rendered email, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl ComposedEmail {
    /// Verification email carrying `token` and a link to the web app.
    pub fn verification(job: &DispatchJob, frontend_origin: &str) -> Result<Self, EmailError> {
        let to = job
            .intent(intents::EMAIL)
            .or_else(|| config_recipient(job))
            .filter(|addr| !addr.trim().is_empty())
            .ok_or(EmailError::MissingRecipient)?;
        let token = job
            .intent(intents::TOKEN)
            .filter(|t| !t.trim().is_empty())
            .ok_or(EmailError::MissingToken)?;

        let link = verification_url(frontend_origin, token)?;
        let body = format!(
            "Confirm this email address for Clypr notifications.\n\n\
             Open this link to verify:\n{link}\n\n\
             Or enter this code in the app: {token}\n\n\
             If you did not request this, you can ignore this message.\n"
        );

        Ok(Self {
            to: to.trim().to_string(),
            subject: "Verify your email for Clypr".to_string(),
            body,
        })
    }

    /// Notification email built from the job content.
    pub fn message(job: &DispatchJob) -> Result<Self, EmailError> {
        let to = config_recipient(job)
            .or_else(|| job.intent(intents::EMAIL))
            .filter(|addr| !addr.trim().is_empty())
            .ok_or(EmailError::MissingRecipient)?;

        let subject = match job.content.title.trim() {
            "" => DEFAULT_SUBJECT.to_string(),
            title => title.to_string(),
        };

        let mut body = job.content.body.clone();
        let footer = metadata_footer(&job.content.metadata);
        if !footer.is_empty() {
            body.push_str("\n\n--\n");
            body.push_str(&footer);
        }

        Ok(Self {
            to: to.trim().to_string(),
            subject,
            body,
        })
    }
}

fn config_recipient(job: &DispatchJob) -> Option<&str> {
    job.email_config().and_then(|cfg| cfg.recipient.as_deref())
}

/// `{origin}/verify-email?token={token}`, keeping any base path of the origin.
fn verification_url(origin: &str, token: &str) -> Result<Url, EmailError> {
    let mut url = Url::parse(origin.trim()).map_err(|_| EmailError::Origin(origin.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| EmailError::Origin(origin.to_string()))?
        .pop_if_empty()
        .push(VERIFY_PATH);
    url.query_pairs_mut().clear().append_pair("token", token);
    Ok(url)
}

/// One `key: value` line per metadata entry, skipping credential-like keys.
fn metadata_footer(metadata: &[(String, String)]) -> String {
    metadata
        .iter()
        .filter(|(key, _)| !is_secret_key(key))
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// EmailSender
// ============================================================================

enum Transport<'a> {
    File { dir: &'a Path, fallback: bool },
    Smtp(SmtpTarget<'a>),
}

struct SmtpTarget<'a> {
    host: &'a str,
    port: u16,
    user: Option<&'a str>,
    pass: Option<&'a str>,
}

/// Sends composed emails through SMTP or writes them to disk.
pub struct EmailSender {
    settings: EmailSettings,
    redactor: Redactor,
}

impl EmailSender {
    #[must_use]
    pub fn new(settings: EmailSettings, redactor: Redactor) -> Self {
        Self { settings, redactor }
    }

    /// Send `email`, honouring SMTP settings carried on the job.
    pub async fn send(
        &self,
        email: &ComposedEmail,
        job_config: Option<&EmailChannelConfig>,
    ) -> Result<(), EmailError> {
        let from = job_config
            .and_then(|cfg| cfg.from_address.as_deref())
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(&self.settings.from);
        let message = Message::builder()
            .from(parse_mailbox(from)?)
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())?;

        let to = self.redactor.mask(&email.to);
        match self.select_transport(job_config) {
            Transport::File { dir, fallback } => {
                if fallback {
                    warn!(dir = %dir.display(), "No SMTP server configured, writing email to disk");
                }
                let id = write_to_dir(dir, message).await?;
                info!(to = %to, id = %id, dir = %dir.display(), "Email written to file");
            }
            Transport::Smtp(target) => {
                send_smtp(&target, message).await?;
                info!(to = %to, host = target.host, "Email sent");
            }
        }
        Ok(())
    }

    fn select_transport<'a>(&'a self, job_config: Option<&'a EmailChannelConfig>) -> Transport<'a> {
        if self.settings.demo {
            return Transport::File {
                dir: &self.settings.demo_dir,
                fallback: false,
            };
        }

        if let Some(cfg) = job_config
            && let Some(host) = cfg.smtp_host.as_deref().filter(|h| !h.trim().is_empty())
        {
            return Transport::Smtp(SmtpTarget {
                host,
                port: cfg.smtp_port.unwrap_or(self.settings.smtp_port),
                user: cfg.username.as_deref(),
                pass: cfg.password.as_deref(),
            });
        }

        if let Some(host) = self.settings.smtp_host.as_deref() {
            return Transport::Smtp(SmtpTarget {
                host,
                port: self.settings.smtp_port,
                user: self.settings.smtp_user.as_deref(),
                pass: self.settings.smtp_pass.as_deref(),
            });
        }

        Transport::File {
            dir: &self.settings.fallback_dir,
            fallback: true,
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .trim()
        .parse()
        .map_err(|source| EmailError::Address {
            address: address.to_string(),
            source,
        })
}

async fn write_to_dir(dir: &Path, message: Message) -> Result<String, EmailError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| EmailError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
    let transport = AsyncFileTransport::<Tokio1Executor>::new(dir);
    Ok(transport.send(message).await?)
}

async fn send_smtp(target: &SmtpTarget<'_>, message: Message) -> Result<(), EmailError> {
    let builder = if target.port == IMPLICIT_TLS_PORT {
        AsyncSmtpTransport::<Tokio1Executor>::relay(target.host)?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(target.host)?
    };
    let mut builder = builder.port(target.port);
    if let (Some(user), Some(pass)) = (target.user, target.pass) {
        builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
    }

    let response = builder.build().send(message).await?;
    debug!(code = %response.code(), "SMTP server accepted message");
    Ok(())
}

// ============================================================================
// EmailAdapter
// ============================================================================

/// Channel adapter for one of the two email flows.
pub struct EmailAdapter {
    sender: Arc<EmailSender>,
    purpose: EmailPurpose,
    frontend_origin: String,
}

impl EmailAdapter {
    pub fn verification(sender: Arc<EmailSender>, frontend_origin: impl Into<String>) -> Self {
        Self {
            sender,
            purpose: EmailPurpose::Verification,
            frontend_origin: frontend_origin.into(),
        }
    }

    pub fn message(sender: Arc<EmailSender>) -> Self {
        Self {
            sender,
            purpose: EmailPurpose::Message,
            frontend_origin: String::new(),
        }
    }

    pub fn purpose(&self) -> EmailPurpose {
        self.purpose
    }

    fn compose(&self, job: &DispatchJob) -> Result<ComposedEmail, EmailError> {
        match self.purpose {
            EmailPurpose::Verification => ComposedEmail::verification(job, &self.frontend_origin),
            EmailPurpose::Message => ComposedEmail::message(job),
        }
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn name(&self) -> &'static str {
        match self.purpose {
            EmailPurpose::Verification => "email_verification",
            EmailPurpose::Message => "email",
        }
    }

    async fn attempt(&self, job: &DispatchJob) -> DeliveryOutcome {
        let email = match self.compose(job) {
            Ok(email) => email,
            Err(e) => {
                warn!(job_id = job.id, adapter = self.name(), error = %e, "Cannot compose email");
                return DeliveryOutcome::Failed;
            }
        };

        match self.sender.send(&email, job.email_config()).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(e) => {
                warn!(job_id = job.id, adapter = self.name(), error = %e, "Email delivery failed");
                DeliveryOutcome::Failed
            }
        }
    }
}
