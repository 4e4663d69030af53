//! Background document extraction and the store workers report into.

pub mod extractor;
pub mod store;
pub mod worker;

pub use extractor::{
    extraction_prompt, DocumentExtractor, ExtractionError, PlainTextDocumentExtractor,
    TemplateDocumentExtractor,
};
pub use store::{Epoch, ExtractionOutcome, ProcessingStore};
pub use worker::{DocumentTask, DocumentWorkerPool};
