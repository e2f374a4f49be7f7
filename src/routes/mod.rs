pub mod api;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::email::MailTransport;
use crate::state::AppState;
use crate::store::CertificateStore;

pub fn router<S, T>(state: Arc<AppState<S, T>>) -> Router
where
    S: CertificateStore + 'static,
    T: MailTransport + 'static,
{
    Router::new()
        .route(
            "/api/events/:event_id/certificates",
            post(api::generate_certificates::<S, T>).get(api::list_certificates::<S, T>),
        )
        .route(
            "/api/events/:event_id/certificates/stats",
            get(api::certificate_stats::<S, T>),
        )
        .route(
            "/api/events/:event_id/certificates/distribute",
            post(api::distribute_certificates::<S, T>),
        )
        .route("/api/email/test", post(api::send_test_email::<S, T>))
        .route("/verify", get(api::verify_certificate::<S, T>))
        .route("/qr/:token", get(api::qr_code::<S, T>))
        .route("/download/:filename", get(api::download_file::<S, T>))
        .with_state(state)
}
