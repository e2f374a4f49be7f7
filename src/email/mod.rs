//! Certificate distribution by email.
//!
//! With mail service credentials configured, each recipient gets one message
//! through the templated send API. Without them, drafts are built for the
//! user's own mail client. The mode is fixed when the [`Distributor`] is built.

pub mod draft;
pub mod emailjs;

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub use draft::Draft;
pub use emailjs::{EmailJsTransport, SendError};

use crate::batch::IssuedCertificate;
use crate::certificate::verification_url;
use crate::models::short_id;
use crate::progress::{self, ProgressSender};

/// Values shipped in sample configuration files. Treated as unset.
pub const PLACEHOLDERS: &[&str] = &[
    "your_service_id",
    "your_service_id_here",
    "your_template_id",
    "your_template_id_here",
    "your_public_key",
    "your_public_key_here",
];

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub service_id: Option<String>,
    pub template_id: Option<String>,
    pub public_key: Option<String>,
    /// Optional access token for accounts that require it on API calls.
    pub private_key: Option<String>,
    pub sender_name: String,
    pub reply_to: String,
    pub timeout: Duration,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            service_id: None,
            template_id: None,
            public_key: None,
            private_key: None,
            sender_name: "EventFlow Team".to_string(),
            reply_to: "noreply@eventflow.com".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

impl EmailConfig {
    /// The three required credentials, if all are usable.
    pub fn credentials(&self) -> Option<Credentials> {
        Some(Credentials {
            service_id: usable(&self.service_id)?,
            template_id: usable(&self.template_id)?,
            public_key: usable(&self.public_key)?,
            private_key: usable(&self.private_key),
        })
    }
}

fn usable(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !PLACEHOLDERS.contains(v))
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
    pub private_key: Option<String>,
}

/// Variables available to the mail template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateParams {
    pub to_name: String,
    pub to_email: String,
    pub from_name: String,
    pub subject: String,
    pub event_name: String,
    pub certificate_id: String,
    pub verification_url: String,
    pub reply_to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub email: String,
    pub token: String,
}

impl From<&IssuedCertificate> for Recipient {
    fn from(issued: &IssuedCertificate) -> Self {
        Self {
            name: issued.participant_name.clone(),
            email: issued.participant_email.clone(),
            token: issued.token.clone(),
        }
    }
}

/// Sends one templated message.
pub trait MailTransport: Send + Sync {
    fn send(&self, params: &TemplateParams) -> impl Future<Output = Result<(), SendError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Automated,
    Fallback,
}

/// How fallback drafts are addressed. Ignored in automated mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DraftStyle {
    #[default]
    Individual,
    Bulk,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendFailure {
    pub email: String,
    pub kind: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DistributionReport {
    Automated {
        success: usize,
        failed: usize,
        failures: Vec<SendFailure>,
    },
    /// Drafts cannot report delivery, only that they were built.
    Fallback { drafts: Vec<Draft> },
}

impl DistributionReport {
    pub fn mode(&self) -> DeliveryMode {
        match self {
            DistributionReport::Automated { .. } => DeliveryMode::Automated,
            DistributionReport::Fallback { .. } => DeliveryMode::Fallback,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            DistributionReport::Automated { success, failed, .. } if *failed == 0 => {
                format!("Sent {success} certificate emails")
            }
            DistributionReport::Automated { success, failed, .. } => {
                format!("Sent {success} certificate emails, {failed} failed")
            }
            DistributionReport::Fallback { drafts } => {
                let addressed: usize = drafts.iter().map(|d| d.to.len() + d.bcc.len()).sum();
                format!(
                    "Prepared {} email drafts for {addressed} participants; send them from your mail client",
                    drafts.len()
                )
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("no recipients to send to")]
    NoRecipients,

    #[error("email service is not configured")]
    NotConfigured,

    #[error("test email failed: {0}")]
    Send(#[from] SendError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to render email template: {0}")]
    Template(#[from] tera::Error),

    #[error("invalid draft address: {0}")]
    InvalidDraft(String),
}

enum Channel<T> {
    Automated(T),
    Fallback,
}

pub struct Distributor<T = EmailJsTransport> {
    channel: Channel<T>,
    sender_name: String,
    reply_to: String,
    base_url: String,
}

impl Distributor<EmailJsTransport> {
    pub fn from_config(config: &EmailConfig, base_url: &str) -> Result<Self, DistributionError> {
        let channel = match config.credentials() {
            Some(credentials) => {
                Channel::Automated(EmailJsTransport::new(credentials, config.timeout)?)
            }
            None => Channel::Fallback,
        };
        Ok(Self::build(config, base_url, channel))
    }
}

impl<T: MailTransport> Distributor<T> {
    /// Use `transport` if the credentials are usable, drafts otherwise.
    pub fn with_transport(config: &EmailConfig, base_url: &str, transport: T) -> Self {
        let channel = match config.credentials() {
            Some(_) => Channel::Automated(transport),
            None => Channel::Fallback,
        };
        Self::build(config, base_url, channel)
    }

    fn build(config: &EmailConfig, base_url: &str, channel: Channel<T>) -> Self {
        let distributor = Self {
            channel,
            sender_name: config.sender_name.clone(),
            reply_to: config.reply_to.clone(),
            base_url: base_url.to_string(),
        };
        tracing::info!(mode = ?distributor.mode(), "Email distribution configured");
        distributor
    }

    pub fn mode(&self) -> DeliveryMode {
        match self.channel {
            Channel::Automated(_) => DeliveryMode::Automated,
            Channel::Fallback => DeliveryMode::Fallback,
        }
    }

    pub fn params(&self, event_title: &str, recipient: &Recipient) -> TemplateParams {
        TemplateParams {
            to_name: recipient.name.clone(),
            to_email: recipient.email.clone(),
            from_name: self.sender_name.clone(),
            subject: format!("Your Certificate - {event_title}"),
            event_name: event_title.to_string(),
            certificate_id: short_id(&recipient.token),
            verification_url: verification_url(&self.base_url, &recipient.token),
            reply_to: self.reply_to.clone(),
        }
    }

    pub async fn distribute(
        &self,
        event_title: &str,
        recipients: &[Recipient],
        style: DraftStyle,
        progress: Option<&ProgressSender>,
    ) -> Result<DistributionReport, DistributionError> {
        if recipients.is_empty() {
            return Err(DistributionError::NoRecipients);
        }
        let params: Vec<TemplateParams> =
            recipients.iter().map(|r| self.params(event_title, r)).collect();
        let total = params.len();

        let report = match &self.channel {
            Channel::Automated(transport) => {
                let mut success = 0;
                let mut failures = Vec::new();
                for (i, p) in params.iter().enumerate() {
                    match transport.send(p).await {
                        Ok(()) => success += 1,
                        Err(e) => {
                            tracing::warn!(to = %p.to_email, kind = e.code(), error = %e, "Email send failed");
                            failures.push(SendFailure {
                                email: p.to_email.clone(),
                                kind: e.code(),
                                reason: e.to_string(),
                            });
                        }
                    }
                    progress::report(progress, i + 1, total);
                }
                DistributionReport::Automated {
                    success,
                    failed: failures.len(),
                    failures,
                }
            }
            Channel::Fallback => {
                let drafts = match style {
                    DraftStyle::Individual => {
                        let mut drafts = Vec::with_capacity(total);
                        for (i, p) in params.iter().enumerate() {
                            drafts.push(draft::individual(p)?);
                            progress::report(progress, i + 1, total);
                        }
                        drafts
                    }
                    DraftStyle::Bulk => {
                        let single = draft::bulk(event_title, &self.sender_name, &params)?;
                        progress::report(progress, total, total);
                        vec![single]
                    }
                };
                DistributionReport::Fallback { drafts }
            }
        };

        tracing::info!(event = %event_title, recipients = total, "{}", report.summary());
        Ok(report)
    }

    /// Send a fixed test message to `to` to check the service configuration.
    pub async fn send_test(&self, to: &str) -> Result<(), DistributionError> {
        let Channel::Automated(transport) = &self.channel else {
            return Err(DistributionError::NotConfigured);
        };
        let params = TemplateParams {
            to_name: "Test User".to_string(),
            to_email: to.to_string(),
            from_name: self.sender_name.clone(),
            subject: "Test Email Configuration".to_string(),
            event_name: "Test Event".to_string(),
            certificate_id: "TEST123".to_string(),
            verification_url: verification_url(&self.base_url, "TEST123"),
            reply_to: self.reply_to.clone(),
        };
        transport.send(&params).await?;
        tracing::info!(%to, "Test email sent");
        Ok(())
    }
}
