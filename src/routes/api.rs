use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::{BatchOutcome, BatchReport};
use crate::certificate::{encode_verification_code, token::is_well_formed, verification_url};
use crate::email::{DistributionReport, DraftStyle, MailTransport, Recipient};
use crate::error::{AppError, AppResult};
use crate::models::{CertificateRecord, CertificateStats, Event};
use crate::progress;
use crate::state::AppState;
use crate::storage;
use crate::store::{bounded, CertificateStore};
use crate::verify::Verification;

type SharedState<S, T> = State<Arc<AppState<S, T>>>;

#[derive(Serialize)]
pub struct GenerateResponse {
    pub outcome: BatchOutcome,
    pub summary: String,
    pub download_url: Option<String>,
    #[serde(flatten)]
    pub report: BatchReport,
}

pub async fn generate_certificates<S, T>(
    State(state): SharedState<S, T>,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<GenerateResponse>>
where
    S: CertificateStore,
    T: MailTransport,
{
    let (tx, mut rx) = progress::channel();
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            tracing::debug!(%event_id, processed = update.processed, total = update.total, percent = update.percent, "Batch progress");
        }
    });

    let cancel = state.shutdown.child_token();
    let report = state.batch.run(event_id, Some(&tx), &cancel).await?;

    let download_url = if report.produced > 0 {
        let stored = storage::stored_archive_name(event_id, &report.archive_name);
        storage::save_archive(&state.config.results_folder, &stored, &report.archive)
            .await
            .map_err(|e| AppError::InternalError(format!("saving archive: {e}")))?;
        Some(format!("/download/{stored}"))
    } else {
        None
    };

    Ok(Json(GenerateResponse {
        outcome: report.outcome(),
        summary: report.summary(),
        download_url,
        report,
    }))
}

#[derive(Serialize)]
pub struct CertificateView {
    #[serde(flatten)]
    pub record: CertificateRecord,
    pub certificate_id: String,
    pub verification_url: String,
}

pub async fn list_certificates<S, T>(
    State(state): SharedState<S, T>,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<Vec<CertificateView>>>
where
    S: CertificateStore,
    T: MailTransport,
{
    require_event(&state, event_id).await?;
    let records = bounded(
        "list_certificates",
        state.config.store_timeout,
        state.store.list_certificates(event_id),
    )
    .await?;

    let views = records
        .into_iter()
        .map(|record| CertificateView {
            certificate_id: record.short_id(),
            verification_url: verification_url(&state.config.base_url, &record.token),
            record,
        })
        .collect();
    Ok(Json(views))
}

pub async fn certificate_stats<S, T>(
    State(state): SharedState<S, T>,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<CertificateStats>>
where
    S: CertificateStore,
    T: MailTransport,
{
    require_event(&state, event_id).await?;
    let stats = bounded(
        "certificate_stats",
        state.config.store_timeout,
        state.store.certificate_stats(event_id),
    )
    .await?;
    Ok(Json(stats))
}

#[derive(Debug, Default, Deserialize)]
pub struct DistributeRequest {
    /// One BCC draft for everyone instead of one draft per participant.
    #[serde(default)]
    pub bulk: bool,
}

#[derive(Serialize)]
pub struct DistributeResponse {
    pub summary: String,
    #[serde(flatten)]
    pub report: DistributionReport,
}

pub async fn distribute_certificates<S, T>(
    State(state): SharedState<S, T>,
    Path(event_id): Path<Uuid>,
    body: Option<Json<DistributeRequest>>,
) -> AppResult<Json<DistributeResponse>>
where
    S: CertificateStore,
    T: MailTransport,
{
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let event = require_event(&state, event_id).await?;
    let timeout = state.config.store_timeout;

    let certificates = bounded("list_certificates", timeout, state.store.list_certificates(event_id)).await?;
    let participants: HashMap<Uuid, _> =
        bounded("list_participants", timeout, state.store.list_participants(event_id))
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

    let recipients: Vec<Recipient> = certificates
        .iter()
        .filter_map(|c| {
            let participant = participants.get(&c.participant_id)?;
            Some(Recipient {
                name: participant.name.clone(),
                email: participant.email.clone(),
                token: c.token.clone(),
            })
        })
        .collect();

    let style = if request.bulk {
        DraftStyle::Bulk
    } else {
        DraftStyle::Individual
    };
    let report = state
        .distributor
        .distribute(&event.title, &recipients, style, None)
        .await?;

    Ok(Json(DistributeResponse {
        summary: report.summary(),
        report,
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub id: Option<String>,
}

pub async fn verify_certificate<S, T>(
    State(state): SharedState<S, T>,
    Query(query): Query<VerifyQuery>,
) -> AppResult<Json<Verification>>
where
    S: CertificateStore,
    T: MailTransport,
{
    let token = query.id.unwrap_or_default();
    Ok(Json(state.verifier.verify(&token).await?))
}

pub async fn qr_code<S, T>(
    State(state): SharedState<S, T>,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse>
where
    S: CertificateStore,
    T: MailTransport,
{
    if !is_well_formed(&token) {
        return Err(AppError::BadRequest("Malformed certificate token".to_string()));
    }
    let code = encode_verification_code(&state.config.base_url, &token);
    Ok(([(header::CONTENT_TYPE, "image/png")], code.png))
}

pub async fn download_file<S, T>(
    State(state): SharedState<S, T>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse>
where
    S: CertificateStore,
    T: MailTransport,
{
    let path = storage::resolve_download(&state.config.results_folder, &filename)
        .ok_or_else(|| AppError::BadRequest("Invalid file name".to_string()))?;

    let content = tokio::fs::read(&path)
        .await
        .map_err(|_| AppError::NotFound(format!("file {filename}")))?;

    let mime = mime_guess::from_path(&filename)
        .first_raw()
        .unwrap_or("application/octet-stream");

    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}\"",
                    storage::download_name(&filename)
                ),
            ),
        ],
        content,
    ))
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub to: String,
}

pub async fn send_test_email<S, T>(
    State(state): SharedState<S, T>,
    Json(request): Json<TestEmailRequest>,
) -> AppResult<Json<serde_json::Value>>
where
    S: CertificateStore,
    T: MailTransport,
{
    if !request.to.contains('@') {
        return Err(AppError::BadRequest(format!("`{}` is not an email address", request.to)));
    }
    state.distributor.send_test(&request.to).await?;
    Ok(Json(serde_json::json!({
        "sent": true,
        "to": request.to,
        "mode": state.distributor.mode(),
    })))
}

async fn require_event<S, T>(state: &AppState<S, T>, event_id: Uuid) -> AppResult<Event>
where
    S: CertificateStore,
{
    bounded("get_event", state.config.store_timeout, state.store.get_event(event_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("event {event_id}")))
}
