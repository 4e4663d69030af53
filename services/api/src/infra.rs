use loan_journey::config::JourneyConfig;
use loan_journey::error::AppError;
use loan_journey::journey::{
    Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
    JourneyEngine, JourneyError, RuleBasedTextService, TemplateDocumentExtractor,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Checkpoint storage selected from configuration.
pub(crate) enum CheckpointBackend {
    Memory(InMemoryCheckpointStore),
    File(FileCheckpointStore),
}

impl CheckpointStore for CheckpointBackend {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        match self {
            CheckpointBackend::Memory(store) => store.save(checkpoint),
            CheckpointBackend::File(store) => store.save(checkpoint),
        }
    }

    fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        match self {
            CheckpointBackend::Memory(store) => store.load(thread_id),
            CheckpointBackend::File(store) => store.load(thread_id),
        }
    }

    fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        match self {
            CheckpointBackend::Memory(store) => store.delete(thread_id),
            CheckpointBackend::File(store) => store.delete(thread_id),
        }
    }

    fn threads(&self) -> Result<Vec<String>, CheckpointError> {
        match self {
            CheckpointBackend::Memory(store) => store.threads(),
            CheckpointBackend::File(store) => store.threads(),
        }
    }
}

pub(crate) type ApiEngine = JourneyEngine<CheckpointBackend>;

pub(crate) fn checkpoint_backend(config: &JourneyConfig) -> Result<CheckpointBackend, AppError> {
    match &config.checkpoint_dir {
        Some(dir) => {
            let store = FileCheckpointStore::open(dir.clone()).map_err(JourneyError::from)?;
            info!(path = %store.root().display(), "using file checkpoints");
            Ok(CheckpointBackend::File(store))
        }
        None => {
            info!("using in-memory checkpoints");
            Ok(CheckpointBackend::Memory(InMemoryCheckpointStore::new()))
        }
    }
}

pub(crate) fn build_engine(config: &JourneyConfig) -> Result<ApiEngine, AppError> {
    let checkpoints = checkpoint_backend(config)?;
    Ok(JourneyEngine::new(
        config.clone(),
        Arc::new(RuleBasedTextService::new()),
        Arc::new(TemplateDocumentExtractor::new(config.extraction_latency)),
        Arc::new(checkpoints),
    ))
}
