use serde_json::Value;
use tracing::info;

use super::documents::ProcessingStore;
use super::nodes::{sync_completed, NodeOutcome};
use super::state::{DocumentStatus, DocumentType, FieldMap, JourneyState, StateDelta};
use super::suspend::SuspendPayload;

/// Human answer to a verification prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationResponse {
    pub confirmed: bool,
    pub corrections: FieldMap,
}

impl VerificationResponse {
    /// `{"confirmed": bool}`, `{"corrections": {...}}` or a plain confirmation string. Anything
    /// else counts as a confirmation without corrections.
    pub fn parse(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self {
                confirmed: true,
                corrections: FieldMap::new(),
            };
        };

        let corrections: FieldMap = map
            .get("corrections")
            .and_then(Value::as_object)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let confirmed = map
            .get("confirmed")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        Self {
            confirmed,
            corrections,
        }
    }
}

fn title(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn enter_verification(state: &JourneyState, document: DocumentType) -> NodeOutcome {
    let extracted = state
        .extracted_data
        .get(&document)
        .cloned()
        .unwrap_or_default();
    let lines = extracted
        .iter()
        .map(|(key, value)| match value {
            Value::String(text) => format!("- {}: {text}", title(key)),
            other => format!("- {}: {other}", title(key)),
        })
        .collect::<Vec<_>>()
        .join("\n");
    let message = format!(
        "{} verification\n\n{lines}\n\nReply confirm to accept, or provide corrections.",
        document.label()
    );

    NodeOutcome::suspend(SuspendPayload::DocumentVerification {
        document,
        extracted_fields: extracted,
        message,
    })
}

/// Confirm the head of the queue: merge corrections, mark verified, dequeue, then pick up any
/// documents that finished meanwhile.
pub fn resume_verification(
    store: &ProcessingStore,
    state: &JourneyState,
    document: DocumentType,
    value: &Value,
) -> NodeOutcome {
    let response = VerificationResponse::parse(value);
    info!(
        %document,
        confirmed = response.confirmed,
        corrections = response.corrections.len(),
        "document verified"
    );

    let mut delta = StateDelta::executed(state);
    if !response.corrections.is_empty() {
        delta.extracted_data.insert(document, response.corrections);
    }
    delta
        .status_changes
        .push((document, DocumentStatus::Verified));
    delta.dequeue = Some(document);

    NodeOutcome::complete(delta.with(sync_completed(store, state)))
}
