use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::extractor::DocumentExtractor;
use super::store::{Epoch, ExtractionOutcome, ProcessingStore};
use crate::journey::state::DocumentType;

/// Runs one supervised extraction task per submitted document.
#[derive(Clone)]
pub struct DocumentWorkerPool {
    extractor: Arc<dyn DocumentExtractor>,
}

impl DocumentWorkerPool {
    pub fn new(extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self { extractor }
    }

    /// Mark `document` in flight and start extracting it. Returns without waiting.
    ///
    /// Extractor errors and panics are written to the store as failed outcomes, so the
    /// document always leaves the in-flight set.
    pub fn submit(
        &self,
        store: &Arc<ProcessingStore>,
        document: DocumentType,
        locator: String,
    ) -> DocumentTask {
        let epoch = store.mark_processing(document);
        let extractor = Arc::clone(&self.extractor);
        let store = Arc::clone(store);

        let handle = tokio::spawn(async move {
            let extraction = {
                let locator = locator.clone();
                tokio::task::spawn_blocking(move || extractor.extract(document, &locator)).await
            };

            let outcome = match extraction {
                Ok(Ok(fields)) => {
                    info!(%document, epoch, fields = fields.len(), "document extracted");
                    ExtractionOutcome::Extracted { fields }
                }
                Ok(Err(error)) => {
                    warn!(%document, epoch, %locator, error = %error, "document extraction failed");
                    ExtractionOutcome::Failed {
                        reason: error.to_string(),
                    }
                }
                Err(join_error) => {
                    warn!(%document, epoch, error = %join_error, "document worker aborted");
                    ExtractionOutcome::Failed {
                        reason: format!("worker aborted: {join_error}"),
                    }
                }
            };

            store.store_result(epoch, document, outcome);
        });

        DocumentTask {
            document,
            epoch,
            handle,
        }
    }
}

/// Handle to a submitted extraction.
#[derive(Debug)]
pub struct DocumentTask {
    document: DocumentType,
    epoch: Epoch,
    handle: JoinHandle<()>,
}

impl DocumentTask {
    pub fn document(&self) -> DocumentType {
        self.document
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to publish its outcome.
    pub async fn join(self) {
        if let Err(error) = self.handle.await {
            warn!(document = %self.document, error = %error, "document supervisor ended abnormally");
        }
    }
}
