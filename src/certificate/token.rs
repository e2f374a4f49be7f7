use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of every certificate token.
pub const TOKEN_LEN: usize = 32;

/// Random characters mixed into each token so identical inputs diverge.
const SALT_LEN: usize = 8;

/// Derive a fresh certificate token for a participant of an event.
///
/// Always returns an alphanumeric token of exactly [`TOKEN_LEN`] characters.
/// Two calls with the same inputs return different tokens.
pub fn generate_token(participant_id: Uuid, event_id: Uuid, timestamp: DateTime<Utc>) -> String {
    let salt = random_alphanumeric(SALT_LEN);
    let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);

    derive_token(
        &participant_id.to_string(),
        &event_id.to_string(),
        &timestamp,
        &salt,
    )
    .unwrap_or_else(|| {
        tracing::warn!(%participant_id, %event_id, "Token encoding came up short, using a random token");
        random_alphanumeric(TOKEN_LEN)
    })
}

/// Digest the joined inputs and keep the first [`TOKEN_LEN`] alphanumeric
/// characters of its base64 form. `None` when the digest does not yield
/// enough of them.
fn derive_token(participant_id: &str, event_id: &str, timestamp: &str, salt: &str) -> Option<String> {
    let data = format!("{participant_id}-{event_id}-{timestamp}-{salt}");
    let digest = Sha256::digest(data.as_bytes());

    let token: String = URL_SAFE_NO_PAD
        .encode(digest)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(TOKEN_LEN)
        .collect();

    (token.len() == TOKEN_LEN).then_some(token)
}

pub fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Tokens accepted by verification lookups.
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LEN && token.chars().all(|c| c.is_ascii_alphanumeric())
}
