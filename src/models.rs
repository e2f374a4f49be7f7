use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Active,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Active => "active",
            EventStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(EventStatus::Draft),
            "active" => Some(EventStatus::Active),
            "completed" => Some(EventStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub event_date: NaiveDate,
    pub status: EventStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Generated,
    Verified,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Generated => "generated",
            CertificateStatus::Verified => "verified",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "generated" => Some(CertificateStatus::Generated),
            "verified" => Some(CertificateStatus::Verified),
            _ => None,
        }
    }
}

/// Persisted proof that a certificate was issued.
///
/// `token` is the lookup key used by verification links; `qr_code_data`
/// keeps the base64 PNG so a certificate can be re-rendered without
/// re-encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub event_id: Uuid,
    pub token: String,
    #[serde(skip_serializing)]
    pub qr_code_data: String,
    pub status: CertificateStatus,
    pub verified_count: u32,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
}

impl CertificateRecord {
    pub fn new(participant_id: Uuid, event_id: Uuid, token: String, qr_code_data: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            participant_id,
            event_id,
            token,
            qr_code_data,
            status: CertificateStatus::Generated,
            verified_count: 0,
            last_verified_at: None,
            generated_at: Utc::now(),
        }
    }

    /// Human-readable ID printed on the document and quoted in emails.
    pub fn short_id(&self) -> String {
        short_id(&self.token)
    }
}

/// First 8 characters of a token, upper-cased.
pub fn short_id(token: &str) -> String {
    token.chars().take(8).collect::<String>().to_uppercase()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateStats {
    pub total: u64,
    pub pending: u64,
    pub verified: u64,
}
