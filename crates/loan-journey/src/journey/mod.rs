//! Resumable loan application journey.
//!
//! A journey walks the [`JourneyBlueprint`] one step at a time, suspending at each step until an
//! answer arrives. Uploaded documents are extracted in the background and reported through a
//! per-journey [`ProcessingStore`]; finished extractions are queued for human verification, which
//! [`route`] always schedules ahead of the next step. [`JourneyEngine`] persists a
//! [`Checkpoint`] after every node so a journey can be resumed from any process.

pub mod checkpoint;
pub mod documents;
pub mod engine;
pub mod nodes;
pub mod normalizers;
pub mod router;
pub mod routing;
pub mod state;
pub mod steps;
pub mod suspend;
pub mod text;
pub mod verification;

#[cfg(test)]
mod tests;

pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
    PendingSuspend,
};
pub use documents::{
    extraction_prompt, DocumentExtractor, DocumentTask, DocumentWorkerPool, Epoch,
    ExtractionError, ExtractionOutcome, PlainTextDocumentExtractor, ProcessingStore,
    TemplateDocumentExtractor,
};
pub use engine::{JourneyEngine, JourneyError, JourneySnapshot, ResumeOutcome, StartOutcome};
pub use normalizers::{FieldKind, NormalizeError};
pub use router::journey_router;
pub use routing::{route, Destination, Node, TerminalReason};
pub use state::{
    DocumentStatus, DocumentType, FieldMap, JourneyState, StateDelta, Termination,
};
pub use steps::{FieldSpec, JourneyBlueprint, StepDescriptor, StepKind, Validation};
pub use suspend::SuspendPayload;
pub use text::{RuleBasedTextService, TextService, TextServiceError};
pub use verification::VerificationResponse;
