//! Persistence contract for events, participants and certificate records.
//!
//! All operations are async and must be safe to call concurrently.
//! [`CertificateStore::increment_verification`] must serialize concurrent
//! increments of the same record.

mod memory;

pub use memory::MemoryStore;

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{CertificateRecord, CertificateStats, Event, Participant};

pub trait CertificateStore: Send + Sync {
    fn get_event(&self, event_id: Uuid) -> impl Future<Output = StoreResult<Option<Event>>> + Send;

    fn get_participant(
        &self,
        participant_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Participant>>> + Send;

    /// Participants of an event in a stable order.
    fn list_participants(
        &self,
        event_id: Uuid,
    ) -> impl Future<Output = StoreResult<Vec<Participant>>> + Send;

    /// Remove every certificate of an event. Returns how many were removed.
    fn delete_certificates(&self, event_id: Uuid) -> impl Future<Output = StoreResult<u64>> + Send;

    fn insert_certificates(
        &self,
        records: Vec<CertificateRecord>,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Swap an event's certificates for `records`.
    ///
    /// The default deletes then inserts; a failed delete is logged and the
    /// insert still runs. Stores with transactions should override this to
    /// make the swap atomic.
    fn replace_certificates(
        &self,
        event_id: Uuid,
        records: Vec<CertificateRecord>,
    ) -> impl Future<Output = StoreResult<u64>> + Send {
        async move {
            let deleted = match self.delete_certificates(event_id).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(%event_id, error = %e, "Could not delete existing certificates");
                    0
                }
            };
            self.insert_certificates(records).await?;
            Ok(deleted)
        }
    }

    /// Remove the certificates the given participants hold for an event.
    fn delete_participant_certificates(
        &self,
        event_id: Uuid,
        participant_ids: Vec<Uuid>,
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Swap certificates only for the participants `records` belong to;
    /// every other record of the event stays. Failure handling matches
    /// [`CertificateStore::replace_certificates`].
    fn replace_participant_certificates(
        &self,
        event_id: Uuid,
        records: Vec<CertificateRecord>,
    ) -> impl Future<Output = StoreResult<u64>> + Send {
        async move {
            let participant_ids = participant_ids(&records);
            let deleted = match self
                .delete_participant_certificates(event_id, participant_ids)
                .await
            {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(%event_id, error = %e, "Could not delete existing certificates");
                    0
                }
            };
            self.insert_certificates(records).await?;
            Ok(deleted)
        }
    }

    fn find_certificate_by_token(
        &self,
        token: &str,
    ) -> impl Future<Output = StoreResult<Option<CertificateRecord>>> + Send;

    /// Bump the verification counter, stamp `last_verified_at` and mark the
    /// record verified, as one atomic update. Returns the updated record.
    fn increment_verification(
        &self,
        certificate_id: Uuid,
    ) -> impl Future<Output = StoreResult<CertificateRecord>> + Send;

    fn list_certificates(
        &self,
        event_id: Uuid,
    ) -> impl Future<Output = StoreResult<Vec<CertificateRecord>>> + Send;

    fn certificate_stats(
        &self,
        event_id: Uuid,
    ) -> impl Future<Output = StoreResult<CertificateStats>> + Send;
}

/// Distinct participant ids of `records`, in first-seen order.
pub fn participant_ids(records: &[CertificateRecord]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .map(|r| r.participant_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Run a store call with a deadline.
pub async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_secs = limit.as_secs(), "Store call timed out");
            Err(StoreError::Timeout {
                operation,
                after: limit,
            })
        }
    }
}
