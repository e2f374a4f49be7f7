//! Certificate batch generation for one event.
//!
//! A run fetches the event's participants, produces one certificate per
//! participant (token, QR code, PDF), replaces the event's stored records and
//! packages the documents into a zip. Failures of single participants are
//! recorded and skipped; failures of a whole phase abort the run with a
//! [`BatchError`].
//!
//! Per-participant work runs on the blocking pool, `workers` at a time, but
//! results are consumed in participant order: progress updates and archive
//! entries follow the input list. Cancellation is checked between items;
//! whatever was produced before it is still persisted and packaged.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::archive;
use crate::certificate::{encode_verification_code, generate_token};
use crate::config::Config;
use crate::error::{BatchError, ItemError};
use crate::models::{short_id, CertificateRecord, Event, Participant};
use crate::pdf::{self, CertificateData};
use crate::progress::{self, ProgressSender};
use crate::store::{bounded, CertificateStore};

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Prefix of every verification link.
    pub base_url: String,
    /// Footer branding on each certificate.
    pub issuer: String,
    /// Certificates rendered concurrently.
    pub workers: usize,
    pub store_timeout: Duration,
}

impl BatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.base_url.clone(),
            issuer: config.issuer_name.clone(),
            workers: config.batch_workers,
            store_timeout: config.store_timeout,
        }
    }
}

/// What a participant needs to be told about their certificate.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCertificate {
    pub participant_id: Uuid,
    pub participant_name: String,
    pub participant_email: String,
    pub token: String,
    pub short_id: String,
    pub verification_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    /// Position in the participant list, starting at 0.
    pub index: usize,
    pub participant_id: Uuid,
    pub participant_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOutcome {
    Success,
    Partial,
    Cancelled,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub event_id: Uuid,
    pub event_title: String,
    /// Zip of all produced certificates.
    #[serde(skip)]
    pub archive: Vec<u8>,
    pub archive_name: String,
    /// Participants fetched for the run.
    pub total: usize,
    pub produced: usize,
    pub skipped: usize,
    /// Certificates embedding a placeholder instead of a QR code.
    pub degraded_codes: usize,
    /// Previous records removed by this run.
    pub replaced: u64,
    pub cancelled: bool,
    pub issued: Vec<IssuedCertificate>,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn outcome(&self) -> BatchOutcome {
        if self.cancelled {
            BatchOutcome::Cancelled
        } else if self.skipped > 0 {
            BatchOutcome::Partial
        } else {
            BatchOutcome::Success
        }
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "Generated {} of {} certificates for \"{}\"",
            self.produced, self.total, self.event_title
        );
        if self.skipped > 0 {
            line.push_str(&format!(", {} skipped", self.skipped));
        }
        if self.degraded_codes > 0 {
            line.push_str(&format!(", {} without a scannable code", self.degraded_codes));
        }
        if self.cancelled {
            line.push_str(", cancelled before completion");
        }
        line
    }
}

/// One participant's finished certificate, held until packaging.
struct ProducedItem {
    issued: IssuedCertificate,
    record: CertificateRecord,
    entry_name: String,
    document: Vec<u8>,
    degraded: bool,
}

pub struct BatchOrchestrator<S> {
    store: Arc<S>,
    settings: Arc<BatchSettings>,
}

impl<S: CertificateStore> BatchOrchestrator<S> {
    pub fn new(store: Arc<S>, settings: BatchSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    pub async fn run(
        &self,
        event_id: Uuid,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, BatchError> {
        let timeout = self.settings.store_timeout;

        let event = bounded("get_event", timeout, self.store.get_event(event_id))
            .await
            .map_err(BatchError::Fetch)?
            .ok_or(BatchError::EventNotFound(event_id))?;

        let participants = bounded(
            "list_participants",
            timeout,
            self.store.list_participants(event_id),
        )
        .await
        .map_err(BatchError::Fetch)?;

        if participants.is_empty() {
            return Err(BatchError::NoParticipants(event_id));
        }

        tracing::info!(
            %event_id,
            participants = participants.len(),
            workers = self.settings.workers,
            "Generating certificates"
        );

        let (outcomes, cancelled) = self.process(&event, &participants, progress, cancel).await;

        let mut produced = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(item) => produced.push(item),
                Err(e) => {
                    let participant = &participants[index];
                    failures.push(ItemFailure {
                        index,
                        participant_id: participant.id,
                        participant_name: participant.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut report = BatchReport {
            event_id,
            event_title: event.title.clone(),
            archive: Vec::new(),
            archive_name: archive::archive_name(&event.title),
            total: participants.len(),
            produced: produced.len(),
            skipped: failures.len(),
            degraded_codes: produced.iter().filter(|p| p.degraded).count(),
            replaced: 0,
            cancelled,
            issued: Vec::new(),
            failures,
        };

        if produced.is_empty() {
            if cancelled {
                // Nothing to replace the old records with; leave them alone.
                tracing::info!(%event_id, "Batch cancelled before any certificate was produced");
                return Ok(report);
            }
            tracing::error!(%event_id, attempted = participants.len(), "No certificates produced");
            return Err(BatchError::NothingProduced {
                attempted: participants.len(),
            });
        }

        let records: Vec<CertificateRecord> = produced.iter().map(|p| p.record.clone()).collect();
        // A cancelled run only supersedes the participants it reached.
        let replaced = if cancelled {
            bounded(
                "replace_participant_certificates",
                timeout,
                self.store.replace_participant_certificates(event_id, records),
            )
            .await
        } else {
            bounded(
                "replace_certificates",
                timeout,
                self.store.replace_certificates(event_id, records),
            )
            .await
        };
        report.replaced = replaced.map_err(BatchError::Persist)?;

        report.archive = archive::package(
            produced
                .iter()
                .map(|p| (p.entry_name.as_str(), p.document.as_slice())),
        )?;
        report.issued = produced.into_iter().map(|p| p.issued).collect();

        tracing::info!(
            %event_id,
            produced = report.produced,
            skipped = report.skipped,
            replaced = report.replaced,
            cancelled,
            "{}",
            report.summary()
        );

        Ok(report)
    }

    /// Produce certificates in participant order. Returns the outcome per
    /// participant index and whether the run was cancelled early.
    async fn process(
        &self,
        event: &Event,
        participants: &[Participant],
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> (BTreeMap<usize, Result<ProducedItem, ItemError>>, bool) {
        let total = participants.len();
        let event = Arc::new(event.clone());

        let items = stream::iter(participants.iter().cloned().enumerate())
            .map(|(index, participant)| {
                let event = Arc::clone(&event);
                let settings = Arc::clone(&self.settings);
                async move {
                    let outcome = tokio::task::spawn_blocking(move || {
                        produce(&participant, &event, &settings)
                    })
                    .await
                    .unwrap_or_else(|e| Err(ItemError::Worker(e.to_string())));
                    (index, outcome)
                }
            })
            .buffered(self.settings.workers.max(1));
        let mut items = std::pin::pin!(items);

        let mut outcomes = BTreeMap::new();
        let mut processed = 0;
        while processed < total {
            if cancel.is_cancelled() {
                tracing::warn!(event_id = %event.id, processed, total, "Batch cancelled");
                return (outcomes, true);
            }
            let Some((index, outcome)) = items.next().await else {
                break;
            };

            if let Err(e) = &outcome {
                tracing::warn!(
                    index,
                    participant_id = %participants[index].id,
                    error = %e,
                    "Skipping participant"
                );
            }
            outcomes.insert(index, outcome);
            processed += 1;
            progress::report(progress, processed, total);
        }

        (outcomes, false)
    }
}

fn produce(
    participant: &Participant,
    event: &Event,
    settings: &BatchSettings,
) -> Result<ProducedItem, ItemError> {
    let token = generate_token(participant.id, event.id, Utc::now());
    let code = encode_verification_code(&settings.base_url, &token);

    let document = pdf::render_certificate(
        &CertificateData {
            participant_name: &participant.name,
            event_title: &event.title,
            event_date: event.event_date,
            token: &token,
            issuer: &settings.issuer,
        },
        &code.png,
    )?;

    let record = CertificateRecord::new(participant.id, event.id, token.clone(), code.base64());

    Ok(ProducedItem {
        issued: IssuedCertificate {
            participant_id: participant.id,
            participant_name: participant.name.clone(),
            participant_email: participant.email.clone(),
            short_id: short_id(&token),
            verification_url: code.url,
            token,
        },
        record,
        entry_name: archive::entry_name(&participant.name),
        document,
        degraded: code.degraded,
    })
}
