use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{CertificateRecord, CertificateStatus, Event, EventStatus, Participant};

#[derive(Debug, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub title: String,
    pub event_date: NaiveDate,
    pub status: String,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let status = EventStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown event status `{}`", row.status)))?;
        Ok(Event {
            id: row.id,
            title: row.title,
            event_date: row.event_date,
            status,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ParticipantRow {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Participant {
            id: row.id,
            event_id: row.event_id,
            name: row.name,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct CertificateRow {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub event_id: Uuid,
    pub certificate_hash: String,
    pub qr_code_data: String,
    pub status: String,
    pub verified_count: i32,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
}

impl TryFrom<CertificateRow> for CertificateRecord {
    type Error = StoreError;

    fn try_from(row: CertificateRow) -> Result<Self, Self::Error> {
        let status = CertificateStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown certificate status `{}`", row.status))
        })?;
        let verified_count = u32::try_from(row.verified_count).map_err(|_| {
            StoreError::Corrupt(format!("negative verification count on {}", row.id))
        })?;
        Ok(CertificateRecord {
            id: row.id,
            participant_id: row.participant_id,
            event_id: row.event_id,
            token: row.certificate_hash,
            qr_code_data: row.qr_code_data,
            status,
            verified_count,
            last_verified_at: row.last_verified_at,
            generated_at: row.generated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct StatsRow {
    pub total: i64,
    pub pending: i64,
    pub verified: i64,
}
