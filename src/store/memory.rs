use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use super::CertificateStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    CertificateRecord, CertificateStats, CertificateStatus, Event, Participant,
};

/// In-process store used by tests and local runs without a database.
///
/// Every operation takes one lock, so each call is atomic with respect to
/// the others.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    events: HashMap<Uuid, Event>,
    participants: Vec<Participant>,
    certificates: Vec<CertificateRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    pub fn add_event(&self, event: Event) -> StoreResult<()> {
        self.lock()?.events.insert(event.id, event);
        Ok(())
    }

    /// Replace the participant list of an event, as a re-upload does.
    pub fn set_participants(&self, event_id: Uuid, participants: Vec<Participant>) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.participants.retain(|p| p.event_id != event_id);
        inner.participants.extend(participants);
        Ok(())
    }

    fn event(&self, event_id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.lock()?.events.get(&event_id).cloned())
    }

    fn participant(&self, participant_id: Uuid) -> StoreResult<Option<Participant>> {
        Ok(self
            .lock()?
            .participants
            .iter()
            .find(|p| p.id == participant_id)
            .cloned())
    }

    fn participants_of(&self, event_id: Uuid) -> StoreResult<Vec<Participant>> {
        Ok(self
            .lock()?
            .participants
            .iter()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect())
    }

    fn remove_certificates(&self, event_id: Uuid) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        let before = inner.certificates.len();
        inner.certificates.retain(|c| c.event_id != event_id);
        Ok((before - inner.certificates.len()) as u64)
    }

    fn add_certificates(&self, records: Vec<CertificateRecord>) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let mut tokens: HashSet<&str> = inner.certificates.iter().map(|c| c.token.as_str()).collect();
        for record in &records {
            if !tokens.insert(record.token.as_str()) {
                return Err(StoreError::Conflict(format!(
                    "duplicate certificate token {}",
                    record.token
                )));
            }
        }
        inner.certificates.extend(records);
        Ok(())
    }

    fn remove_participant_certificates(
        &self,
        event_id: Uuid,
        participant_ids: &HashSet<Uuid>,
    ) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        let before = inner.certificates.len();
        inner
            .certificates
            .retain(|c| c.event_id != event_id || !participant_ids.contains(&c.participant_id));
        Ok((before - inner.certificates.len()) as u64)
    }

    /// Drop the event's records matching `replaced`, then add `records`, all
    /// under one lock. Nothing changes on a token conflict.
    fn swap_certificates(
        &self,
        event_id: Uuid,
        records: Vec<CertificateRecord>,
        replaced: impl Fn(&CertificateRecord) -> bool,
    ) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        let before = inner.certificates.len();
        let kept: Vec<CertificateRecord> = inner
            .certificates
            .iter()
            .filter(|c| c.event_id != event_id || !replaced(c))
            .cloned()
            .collect();
        let deleted = (before - kept.len()) as u64;

        let mut tokens: HashSet<&str> = kept.iter().map(|c| c.token.as_str()).collect();
        for record in &records {
            if !tokens.insert(record.token.as_str()) {
                return Err(StoreError::Conflict(format!(
                    "duplicate certificate token {}",
                    record.token
                )));
            }
        }

        inner.certificates = kept;
        inner.certificates.extend(records);
        Ok(deleted)
    }

    fn by_token(&self, token: &str) -> StoreResult<Option<CertificateRecord>> {
        Ok(self
            .lock()?
            .certificates
            .iter()
            .find(|c| c.token == token)
            .cloned())
    }

    fn bump(&self, certificate_id: Uuid) -> StoreResult<CertificateRecord> {
        let mut inner = self.lock()?;
        let record = inner
            .certificates
            .iter_mut()
            .find(|c| c.id == certificate_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "certificate",
                id: certificate_id.to_string(),
            })?;
        record.verified_count += 1;
        record.last_verified_at = Some(Utc::now());
        record.status = CertificateStatus::Verified;
        Ok(record.clone())
    }

    fn certificates_of(&self, event_id: Uuid) -> StoreResult<Vec<CertificateRecord>> {
        Ok(self
            .lock()?
            .certificates
            .iter()
            .filter(|c| c.event_id == event_id)
            .cloned()
            .collect())
    }

    fn stats(&self, event_id: Uuid) -> StoreResult<CertificateStats> {
        let inner = self.lock()?;
        let mut stats = CertificateStats::default();
        for c in inner.certificates.iter().filter(|c| c.event_id == event_id) {
            stats.total += 1;
            match c.status {
                CertificateStatus::Generated => stats.pending += 1,
                CertificateStatus::Verified => stats.verified += 1,
            }
        }
        Ok(stats)
    }
}

impl CertificateStore for MemoryStore {
    async fn get_event(&self, event_id: Uuid) -> StoreResult<Option<Event>> {
        self.event(event_id)
    }

    async fn get_participant(&self, participant_id: Uuid) -> StoreResult<Option<Participant>> {
        self.participant(participant_id)
    }

    async fn list_participants(&self, event_id: Uuid) -> StoreResult<Vec<Participant>> {
        self.participants_of(event_id)
    }

    async fn delete_certificates(&self, event_id: Uuid) -> StoreResult<u64> {
        self.remove_certificates(event_id)
    }

    async fn insert_certificates(&self, records: Vec<CertificateRecord>) -> StoreResult<()> {
        self.add_certificates(records)
    }

    async fn replace_certificates(
        &self,
        event_id: Uuid,
        records: Vec<CertificateRecord>,
    ) -> StoreResult<u64> {
        self.swap_certificates(event_id, records, |_| true)
    }

    async fn delete_participant_certificates(
        &self,
        event_id: Uuid,
        participant_ids: Vec<Uuid>,
    ) -> StoreResult<u64> {
        self.remove_participant_certificates(event_id, &participant_ids.into_iter().collect())
    }

    async fn replace_participant_certificates(
        &self,
        event_id: Uuid,
        records: Vec<CertificateRecord>,
    ) -> StoreResult<u64> {
        let ids: HashSet<Uuid> = records.iter().map(|r| r.participant_id).collect();
        self.swap_certificates(event_id, records, |c| ids.contains(&c.participant_id))
    }

    async fn find_certificate_by_token(&self, token: &str) -> StoreResult<Option<CertificateRecord>> {
        self.by_token(token)
    }

    async fn increment_verification(&self, certificate_id: Uuid) -> StoreResult<CertificateRecord> {
        self.bump(certificate_id)
    }

    async fn list_certificates(&self, event_id: Uuid) -> StoreResult<Vec<CertificateRecord>> {
        self.certificates_of(event_id)
    }

    async fn certificate_stats(&self, event_id: Uuid) -> StoreResult<CertificateStats> {
        self.stats(event_id)
    }
}
