#![allow(dead_code)]

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use eventcert::batch::{BatchOrchestrator, BatchSettings};
use eventcert::config::Config;
use eventcert::email::{EmailConfig, MailTransport, SendError, TemplateParams};
use eventcert::error::{StoreError, StoreResult};
use eventcert::models::{
    CertificateRecord, CertificateStats, Event, EventStatus, Participant,
};
use eventcert::store::{CertificateStore, MemoryStore};

pub const BASE_URL: &str = "https://certs.example";

pub fn event(title: &str) -> Event {
    Event {
        id: Uuid::new_v4(),
        title: title.to_string(),
        event_date: NaiveDate::from_ymd_opt(2025, 10, 3).unwrap(),
        status: EventStatus::Completed,
    }
}

pub fn participant(event_id: Uuid, name: &str) -> Participant {
    let email = if name.is_empty() {
        "anonymous@example.com".to_string()
    } else {
        format!("{}@example.com", name.to_lowercase().replace(' ', "."))
    };
    Participant {
        id: Uuid::new_v4(),
        event_id,
        name: name.to_string(),
        email,
        created_at: Utc::now(),
    }
}

/// A memory store holding one event with the given participant names.
pub fn seeded(title: &str, names: &[&str]) -> (Arc<MemoryStore>, Event, Vec<Participant>) {
    let store = Arc::new(MemoryStore::new());
    let event = event(title);
    let participants: Vec<Participant> = names.iter().map(|n| participant(event.id, n)).collect();
    store.add_event(event.clone()).unwrap();
    store.set_participants(event.id, participants.clone()).unwrap();
    (store, event, participants)
}

pub fn settings() -> BatchSettings {
    BatchSettings {
        base_url: BASE_URL.to_string(),
        issuer: "EventFlow".to_string(),
        workers: 4,
        store_timeout: Duration::from_secs(5),
    }
}

pub fn orchestrator<S: CertificateStore>(store: Arc<S>) -> BatchOrchestrator<S> {
    BatchOrchestrator::new(store, settings())
}

pub fn config(results_folder: &std::path::Path, email: EmailConfig) -> Config {
    Config {
        database_url: String::new(),
        base_url: BASE_URL.to_string(),
        results_folder: results_folder.to_path_buf(),
        host: "127.0.0.1".to_string(),
        port: 0,
        issuer_name: "EventFlow".to_string(),
        store_timeout: Duration::from_secs(5),
        batch_workers: 2,
        email,
    }
}

pub fn email_configured() -> EmailConfig {
    EmailConfig {
        service_id: Some("service_abc".into()),
        template_id: Some("template_xyz".into()),
        public_key: Some("pk_123".into()),
        ..EmailConfig::default()
    }
}

/// Entry names of a zip archive, in order.
pub fn zip_entries(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

pub fn zip_entry(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    out
}

/// Transport double that records every call. Clones share the log.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub calls: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<TemplateParams>>>,
    /// Recipients whose sends fail, with the HTTP status to fail with.
    pub failing: Vec<(String, u16)>,
}

impl RecordingTransport {
    pub fn failing_for(email: &str, status: u16) -> Self {
        Self {
            failing: vec![(email.to_string(), status)],
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MailTransport for RecordingTransport {
    async fn send(&self, params: &TemplateParams) -> Result<(), SendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((_, status)) = self.failing.iter().find(|(e, _)| *e == params.to_email) {
            let status = reqwest::StatusCode::from_u16(*status).unwrap();
            return Err(SendError::from_status(status, ""));
        }
        self.sent.lock().unwrap().push(params.clone());
        Ok(())
    }
}

/// Memory store with injectable faults.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_insert: bool,
    pub fail_delete: bool,
    /// Participant listing never answers within any reasonable timeout.
    pub stall_participants: bool,
    /// Records disappear between lookup and increment, as when a
    /// regeneration runs concurrently.
    pub lose_increments: bool,
}

impl CertificateStore for FlakyStore {
    async fn get_event(&self, event_id: Uuid) -> StoreResult<Option<Event>> {
        self.inner.get_event(event_id).await
    }

    async fn get_participant(&self, participant_id: Uuid) -> StoreResult<Option<Participant>> {
        self.inner.get_participant(participant_id).await
    }

    async fn list_participants(&self, event_id: Uuid) -> StoreResult<Vec<Participant>> {
        if self.stall_participants {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.list_participants(event_id).await
    }

    async fn delete_certificates(&self, event_id: Uuid) -> StoreResult<u64> {
        if self.fail_delete {
            return Err(StoreError::Unavailable("delete refused".into()));
        }
        self.inner.delete_certificates(event_id).await
    }

    async fn delete_participant_certificates(
        &self,
        event_id: Uuid,
        participant_ids: Vec<Uuid>,
    ) -> StoreResult<u64> {
        if self.fail_delete {
            return Err(StoreError::Unavailable("delete refused".into()));
        }
        self.inner
            .delete_participant_certificates(event_id, participant_ids)
            .await
    }

    async fn insert_certificates(&self, records: Vec<CertificateRecord>) -> StoreResult<()> {
        if self.fail_insert {
            return Err(StoreError::Unavailable("insert refused".into()));
        }
        self.inner.insert_certificates(records).await
    }

    async fn find_certificate_by_token(&self, token: &str) -> StoreResult<Option<CertificateRecord>> {
        self.inner.find_certificate_by_token(token).await
    }

    async fn increment_verification(&self, certificate_id: Uuid) -> StoreResult<CertificateRecord> {
        if self.lose_increments {
            return Err(StoreError::NotFound {
                entity: "certificate",
                id: certificate_id.to_string(),
            });
        }
        self.inner.increment_verification(certificate_id).await
    }

    async fn list_certificates(&self, event_id: Uuid) -> StoreResult<Vec<CertificateRecord>> {
        self.inner.list_certificates(event_id).await
    }

    async fn certificate_stats(&self, event_id: Uuid) -> StoreResult<CertificateStats> {
        self.inner.certificate_stats(event_id).await
    }
}
