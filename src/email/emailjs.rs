use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;

use super::{Credentials, MailTransport, TemplateParams};

const SEND_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";

/// Why one templated send did not go through.
///
/// 4xx responses are split by what the operator has to fix.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("template rejected the variables (check template variables or service/template IDs): {0}")]
    BadTemplateVariables(String),

    #[error("authentication failed (check the public key): {0}")]
    Unauthorized(String),

    #[error("unknown service or template ID: {0}")]
    UnknownIdentifiers(String),

    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("mail service error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("mail service did not answer within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid recipient address `{0}`")]
    InvalidRecipient(String),
}

impl SendError {
    /// Short machine-readable kind for reports.
    pub fn code(&self) -> &'static str {
        match self {
            SendError::BadTemplateVariables(_) => "bad_template_variables",
            SendError::Unauthorized(_) => "unauthorized",
            SendError::UnknownIdentifiers(_) => "unknown_identifiers",
            SendError::Rejected { .. } => "rejected",
            SendError::Server { .. } => "server",
            SendError::Timeout(_) => "timeout",
            SendError::Network(_) => "network",
            SendError::InvalidRecipient(_) => "invalid_recipient",
        }
    }

    /// Map a non-success response to its error.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("no response body").to_string()
        } else {
            body.trim().to_string()
        };
        match status.as_u16() {
            400 => SendError::BadTemplateVariables(message),
            401 | 403 => SendError::Unauthorized(message),
            404 => SendError::UnknownIdentifiers(message),
            code if status.is_client_error() => SendError::Rejected { status: code, message },
            code => SendError::Server { status: code, message },
        }
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: &'a TemplateParams,
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
}

/// EmailJS REST transport. One HTTP call per message.
pub struct EmailJsTransport {
    client: Client,
    credentials: Credentials,
    timeout: Duration,
}

impl EmailJsTransport {
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            credentials,
            timeout,
        })
    }
}

impl MailTransport for EmailJsTransport {
    async fn send(&self, params: &TemplateParams) -> Result<(), SendError> {
        if !params.to_email.contains('@') {
            return Err(SendError::InvalidRecipient(params.to_email.clone()));
        }

        let body = SendRequest {
            service_id: &self.credentials.service_id,
            template_id: &self.credentials.template_id,
            user_id: &self.credentials.public_key,
            template_params: params,
            access_token: self.credentials.private_key.as_deref(),
        };

        let response = self
            .client
            .post(SEND_ENDPOINT)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Timeout(self.timeout)
                } else {
                    SendError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(to = %params.to_email, %status, "Email accepted");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(SendError::from_status(status, &text))
    }
}
