use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::state::{DocumentStatus, DocumentType, FieldMap};

/// Payload emitted when a node pauses for external input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuspendPayload {
    JourneyStep {
        step: u32,
        field: String,
        message: String,
        attempt: u32,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        missing_fields: Vec<String>,
    },
    DocumentUpload {
        step: u32,
        required_documents: Vec<DocumentType>,
        message: String,
    },
    DocumentVerification {
        document: DocumentType,
        extracted_fields: FieldMap,
        message: String,
    },
    Review {
        step: u32,
        collected_data: BTreeMap<String, FieldMap>,
        documents_status: BTreeMap<DocumentType, DocumentStatus>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        still_processing: Vec<DocumentType>,
        message: String,
    },
    Summary {
        step: u32,
        collected_data: BTreeMap<String, FieldMap>,
        documents_status: BTreeMap<DocumentType, DocumentStatus>,
        message: String,
    },
}

impl SuspendPayload {
    pub fn message(&self) -> &str {
        match self {
            SuspendPayload::JourneyStep { message, .. }
            | SuspendPayload::DocumentUpload { message, .. }
            | SuspendPayload::DocumentVerification { message, .. }
            | SuspendPayload::Review { message, .. }
            | SuspendPayload::Summary { message, .. } => message,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SuspendPayload::JourneyStep { .. } => "journey_step",
            SuspendPayload::DocumentUpload { .. } => "document_upload",
            SuspendPayload::DocumentVerification { .. } => "document_verification",
            SuspendPayload::Review { .. } => "review",
            SuspendPayload::Summary { .. } => "summary",
        }
    }
}
