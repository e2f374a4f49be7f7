//! Certificate verification by token.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::store::{bounded, CertificateStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedParticipant {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedEvent {
    pub title: String,
    pub event_date: NaiveDate,
}

/// Answer to a verification request. Unknown tokens only carry `valid: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant: Option<VerifiedParticipant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<VerifiedEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

impl Verification {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            certificate_id: None,
            participant: None,
            event: None,
            verified_count: None,
            generated_at: None,
        }
    }
}

pub struct Verifier<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: CertificateStore> Verifier<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Look up `token` (exact match) and record one verification if it
    /// exists.
    pub async fn verify(&self, token: &str) -> StoreResult<Verification> {
        if token.is_empty() {
            return Ok(Verification::invalid());
        }

        let Some(record) = bounded(
            "find_certificate_by_token",
            self.timeout,
            self.store.find_certificate_by_token(token),
        )
        .await?
        else {
            tracing::info!(token, "Verification of unknown certificate");
            return Ok(Verification::invalid());
        };

        // A regeneration may remove the record between lookup and increment.
        let record = match bounded(
            "increment_verification",
            self.timeout,
            self.store.increment_verification(record.id),
        )
        .await
        {
            Ok(record) => record,
            Err(StoreError::NotFound { .. }) => {
                tracing::info!(token, "Certificate replaced during verification");
                return Ok(Verification::invalid());
            }
            Err(e) => return Err(e),
        };

        let participant = bounded(
            "get_participant",
            self.timeout,
            self.store.get_participant(record.participant_id),
        )
        .await?;
        let event = bounded("get_event", self.timeout, self.store.get_event(record.event_id)).await?;

        tracing::info!(
            certificate_id = %record.id,
            verified_count = record.verified_count,
            "Certificate verified"
        );

        Ok(Verification {
            valid: true,
            certificate_id: Some(record.short_id()),
            participant: participant.map(|p| VerifiedParticipant {
                name: p.name,
                email: p.email,
            }),
            event: event.map(|e| VerifiedEvent {
                title: e.title,
                event_date: e.event_date,
            }),
            verified_count: Some(record.verified_count),
            generated_at: Some(record.generated_at),
        })
    }
}
