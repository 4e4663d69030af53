use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::journey::state::{DocumentType, FieldMap};

/// Generation counter for a store; bumped by [`ProcessingStore::reset`].
pub type Epoch = u64;

/// Result a worker hands back for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Extracted { fields: FieldMap },
    Failed { reason: String },
}

#[derive(Debug, Default)]
struct StoreInner {
    epoch: Epoch,
    in_flight: BTreeSet<DocumentType>,
    completed: BTreeMap<DocumentType, ExtractionOutcome>,
}

/// Handoff between document workers and the journey engine.
///
/// A document is either in flight, completed and awaiting pickup, or absent. Every operation
/// takes the same lock, so the four transitions are serialized relative to each other.
#[derive(Debug, Default)]
pub struct ProcessingStore {
    inner: Mutex<StoreInner>,
}

impl ProcessingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_epoch(epoch: Epoch) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                epoch,
                ..StoreInner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn epoch(&self) -> Epoch {
        self.lock().epoch
    }

    /// Record `document` as in flight and return the epoch the worker must report back with.
    pub fn mark_processing(&self, document: DocumentType) -> Epoch {
        let mut inner = self.lock();
        if inner.completed.remove(&document).is_some() {
            warn!(%document, "dropping unpicked result for resubmitted document");
        }
        inner.in_flight.insert(document);
        debug!(%document, epoch = inner.epoch, "document marked processing");
        inner.epoch
    }

    /// Publish a worker result. Returns `false` when the result belongs to an older epoch or to
    /// a document that is no longer in flight; such results are discarded.
    pub fn store_result(
        &self,
        epoch: Epoch,
        document: DocumentType,
        outcome: ExtractionOutcome,
    ) -> bool {
        let mut inner = self.lock();
        if epoch != inner.epoch {
            warn!(
                %document,
                result_epoch = epoch,
                current_epoch = inner.epoch,
                "discarding result from a previous epoch"
            );
            return false;
        }
        if !inner.in_flight.remove(&document) {
            warn!(%document, "discarding result for a document that is not in flight");
            return false;
        }
        inner.completed.insert(document, outcome);
        debug!(%document, epoch, "document result stored");
        true
    }

    /// Take every completed result; each result is returned by exactly one call.
    pub fn pop_completed(&self) -> Vec<(DocumentType, ExtractionOutcome)> {
        let mut inner = self.lock();
        std::mem::take(&mut inner.completed).into_iter().collect()
    }

    pub fn is_any_processing(&self) -> bool {
        !self.lock().in_flight.is_empty()
    }

    pub fn is_processing(&self, document: DocumentType) -> bool {
        self.lock().in_flight.contains(&document)
    }

    pub fn processing_docs(&self) -> Vec<DocumentType> {
        self.lock().in_flight.iter().copied().collect()
    }

    /// Clear everything and move to a new epoch so late results from old workers are ignored.
    pub fn reset(&self) -> Epoch {
        let mut inner = self.lock();
        inner.in_flight.clear();
        inner.completed.clear();
        inner.epoch += 1;
        inner.epoch
    }

    /// Poll until nothing is in flight. Returns `false` if `timeout` elapsed first.
    pub async fn wait_until_idle(&self, poll: Duration, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if !self.is_any_processing() {
                return true;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return false;
                }
            }
            tokio::time::sleep(poll).await;
        }
    }
}
