mod models;

pub use models::*;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{CertificateRecord, CertificateStats, Event, Participant};
use crate::store::{participant_ids, CertificateStore};

pub type DbPool = Arc<PgPool>;

/// Rows per INSERT statement; keeps bind parameters under the Postgres limit.
const INSERT_CHUNK: usize = 1000;

const CERTIFICATE_COLUMNS: &str = "id, participant_id, event_id, certificate_hash, qr_code_data, \
     status, verified_count, last_verified_at, generated_at";

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// PostgreSQL-backed [`CertificateStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

async fn insert_chunked(conn: &mut PgConnection, records: &[CertificateRecord]) -> Result<(), sqlx::Error> {
    for chunk in records.chunks(INSERT_CHUNK) {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO certificates ({CERTIFICATE_COLUMNS}) "
        ));
        query.push_values(chunk, |mut row, r| {
            row.push_bind(r.id)
                .push_bind(r.participant_id)
                .push_bind(r.event_id)
                .push_bind(&r.token)
                .push_bind(&r.qr_code_data)
                .push_bind(r.status.as_str())
                .push_bind(r.verified_count as i32)
                .push_bind(r.last_verified_at)
                .push_bind(r.generated_at);
        });
        query.build().execute(&mut *conn).await?;
    }
    Ok(())
}

impl CertificateStore for PgStore {
    async fn get_event(&self, event_id: Uuid) -> StoreResult<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT id, title, event_date, status FROM events WHERE id = $1",
        )
        .bind(event_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Event::try_from).transpose()
    }

    async fn get_participant(&self, participant_id: Uuid) -> StoreResult<Option<Participant>> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            "SELECT id, event_id, name, email, created_at FROM participants WHERE id = $1",
        )
        .bind(participant_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Participant::from))
    }

    async fn list_participants(&self, event_id: Uuid) -> StoreResult<Vec<Participant>> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT id, event_id, name, email, created_at
            FROM participants
            WHERE event_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(event_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(Participant::from).collect())
    }

    async fn delete_certificates(&self, event_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM certificates WHERE event_id = $1")
            .bind(event_id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_certificates(&self, records: Vec<CertificateRecord>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_chunked(&mut *tx, &records).await?;
        tx.commit().await?;
        Ok(())
    }

    // Delete and insert share one transaction: a failure at any point leaves
    // the previous certificates untouched.
    async fn replace_certificates(
        &self,
        event_id: Uuid,
        records: Vec<CertificateRecord>,
    ) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM certificates WHERE event_id = $1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        insert_chunked(&mut *tx, &records).await?;
        tx.commit().await?;

        tracing::info!(%event_id, deleted, inserted = records.len(), "Replaced event certificates");
        Ok(deleted)
    }

    async fn delete_participant_certificates(
        &self,
        event_id: Uuid,
        participant_ids: Vec<Uuid>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM certificates WHERE event_id = $1 AND participant_id = ANY($2)",
        )
        .bind(event_id)
        .bind(&participant_ids)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    async fn replace_participant_certificates(
        &self,
        event_id: Uuid,
        records: Vec<CertificateRecord>,
    ) -> StoreResult<u64> {
        let participant_ids = participant_ids(&records);
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM certificates WHERE event_id = $1 AND participant_id = ANY($2)",
        )
        .bind(event_id)
        .bind(&participant_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        insert_chunked(&mut *tx, &records).await?;
        tx.commit().await?;

        tracing::info!(
            %event_id,
            deleted,
            inserted = records.len(),
            "Replaced certificates of processed participants"
        );
        Ok(deleted)
    }

    async fn find_certificate_by_token(&self, token: &str) -> StoreResult<Option<CertificateRecord>> {
        let row = sqlx::query_as::<_, CertificateRow>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE certificate_hash = $1"
        ))
        .bind(token)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(CertificateRecord::try_from).transpose()
    }

    async fn increment_verification(&self, certificate_id: Uuid) -> StoreResult<CertificateRecord> {
        let row = sqlx::query_as::<_, CertificateRow>(&format!(
            r#"
            UPDATE certificates
            SET verified_count = verified_count + 1,
                last_verified_at = NOW(),
                status = 'verified'
            WHERE id = $1
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        ))
        .bind(certificate_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some(row) => CertificateRecord::try_from(row),
            None => Err(StoreError::NotFound {
                entity: "certificate",
                id: certificate_id.to_string(),
            }),
        }
    }

    async fn list_certificates(&self, event_id: Uuid) -> StoreResult<Vec<CertificateRecord>> {
        let rows = sqlx::query_as::<_, CertificateRow>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE event_id = $1 ORDER BY generated_at, id"
        ))
        .bind(event_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.into_iter().map(CertificateRecord::try_from).collect()
    }

    async fn certificate_stats(&self, event_id: Uuid) -> StoreResult<CertificateStats> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'generated') AS pending,
                   COUNT(*) FILTER (WHERE status = 'verified') AS verified
            FROM certificates
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(CertificateStats {
            total: row.total.max(0) as u64,
            pending: row.pending.max(0) as u64,
            verified: row.verified.max(0) as u64,
        })
    }
}
