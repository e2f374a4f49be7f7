use crate::batch::{BatchOrchestrator, BatchSettings};
use crate::config::Config;
use crate::email::{Distributor, EmailJsTransport};
use crate::verify::Verifier;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct AppState<S, T = EmailJsTransport> {
    pub store: Arc<S>,
    pub config: Arc<Config>,
    pub batch: BatchOrchestrator<S>,
    pub verifier: Verifier<S>,
    pub distributor: Distributor<T>,
    /// Cancelled on shutdown; running batches stop between certificates.
    pub shutdown: CancellationToken,
}

impl<S, T> AppState<S, T>
where
    S: crate::store::CertificateStore,
{
    pub fn new(store: Arc<S>, config: Arc<Config>, distributor: Distributor<T>) -> Self {
        Self {
            batch: BatchOrchestrator::new(Arc::clone(&store), BatchSettings::from_config(&config)),
            verifier: Verifier::new(Arc::clone(&store), config.store_timeout),
            store,
            config,
            distributor,
            shutdown: CancellationToken::new(),
        }
    }
}
