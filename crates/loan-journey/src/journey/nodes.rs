//! Node routines for the step sequence.
//!
//! Entering a node produces the suspend payload; resuming it with the external value produces
//! the state delta. Neither touches persisted state or the worker pool directly: submissions
//! are returned to the engine, which runs them once the delta is committed.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::documents::{ExtractionOutcome, ProcessingStore};
use super::state::{DocumentStatus, DocumentType, FieldMap, JourneyState, StateDelta, Termination};
use super::steps::{JourneyBlueprint, StepDescriptor};
use super::suspend::SuspendPayload;
use super::text::{
    fallback_review_summary, retry_prompt, template_prompt, TextService, FALLBACK_FINAL_SUMMARY,
};

/// What a node asks the engine to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Complete {
        delta: StateDelta,
        submissions: Vec<(DocumentType, String)>,
    },
    /// `delta` holds effects that happened before the suspend point; it is committed together
    /// with the pending suspend so a resume never repeats them.
    Suspend {
        delta: StateDelta,
        payload: SuspendPayload,
        attempt: u32,
    },
}

impl NodeOutcome {
    pub fn complete(delta: StateDelta) -> Self {
        NodeOutcome::Complete {
            delta,
            submissions: Vec::new(),
        }
    }

    pub fn suspend(payload: SuspendPayload) -> Self {
        NodeOutcome::Suspend {
            delta: StateDelta::default(),
            payload,
            attempt: 0,
        }
    }
}

/// Collaborators a node reads from.
pub struct NodeContext<'a> {
    pub blueprint: &'a JourneyBlueprint,
    pub text: &'a dyn TextService,
    pub store: &'a ProcessingStore,
    pub max_validation_retries: u32,
}

impl NodeContext<'_> {
    fn prompt_for(&self, step: &StepDescriptor, state: &JourneyState) -> String {
        let total = self.blueprint.total();
        self.text
            .generate_prompt(step, total, &state.collected_data)
            .unwrap_or_else(|error| {
                warn!(step = step.number, error = %error, "prompt generation failed, using template");
                template_prompt(step, total, &state.collected_data)
            })
    }
}

/// Move finished extractions from the store into the journey.
///
/// Extracted documents become ready for verification and are queued; failed ones are marked
/// failed. Results for documents the journey does not consider in flight are dropped.
pub fn sync_completed(store: &ProcessingStore, state: &JourneyState) -> StateDelta {
    let mut delta = StateDelta::default();
    for (document, outcome) in store.pop_completed() {
        if state.status_of(document) != Some(DocumentStatus::Processing) {
            warn!(%document, "ignoring extraction result for a document that is not processing");
            continue;
        }
        match outcome {
            ExtractionOutcome::Extracted { fields } => {
                debug!(%document, "document ready for verification");
                delta
                    .status_changes
                    .push((document, DocumentStatus::ReadyForVerification));
                delta.extracted_data.insert(document, fields);
                delta.enqueue.push(document);
            }
            ExtractionOutcome::Failed { reason } => {
                warn!(%document, %reason, "document processing failed");
                delta.status_changes.push((document, DocumentStatus::Failed));
            }
        }
    }
    delta
}

fn answer_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn with_collected(mut delta: StateDelta, step: &StepDescriptor, fields: FieldMap) -> StateDelta {
    delta.collected_data.insert(step.id.to_string(), fields);
    delta
}

fn complete_step(
    ctx: &NodeContext<'_>,
    state: &JourneyState,
    step: &StepDescriptor,
    fields: FieldMap,
) -> NodeOutcome {
    let delta = with_collected(StateDelta::advanced(state, step.number), step, fields);
    NodeOutcome::complete(delta.with(sync_completed(ctx.store, state)))
}

pub fn enter_collect(ctx: &NodeContext<'_>, state: &JourneyState, step: &StepDescriptor) -> NodeOutcome {
    NodeOutcome::suspend(SuspendPayload::JourneyStep {
        step: step.number,
        field: step.id.to_string(),
        message: ctx.prompt_for(step, state),
        attempt: 0,
        missing_fields: Vec::new(),
    })
}

/// Extract, validate and either advance or re-prompt.
///
/// Extraction failures are accepted immediately as raw text. Validation failures re-prompt
/// until `max_validation_retries` is reached, then the validated subset is accepted together
/// with the raw answer.
pub fn resume_collect(
    ctx: &NodeContext<'_>,
    state: &JourneyState,
    step: &StepDescriptor,
    attempt: u32,
    value: &Value,
) -> NodeOutcome {
    let raw = answer_text(value);

    let extracted = match value {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<FieldMap>()),
        _ => ctx.text.extract_fields(step, &raw),
    };

    let fields = match extracted {
        Ok(fields) => fields,
        Err(error) => {
            warn!(step = step.number, error = %error, "field extraction failed, keeping raw answer");
            let mut fallback = FieldMap::new();
            fallback.insert("raw_input".to_string(), json!(raw));
            return complete_step(ctx, state, step, fallback);
        }
    };

    let validation = ctx.text.validate(step, &fields);
    if validation.is_complete() {
        info!(step = step.number, "step completed");
        return complete_step(ctx, state, step, validation.validated);
    }

    if attempt < ctx.max_validation_retries {
        let next_attempt = attempt + 1;
        let labels = step.missing_labels(&validation.missing);
        debug!(step = step.number, attempt = next_attempt, missing = ?validation.missing, "re-prompting");
        return NodeOutcome::Suspend {
            delta: StateDelta::default(),
            payload: SuspendPayload::JourneyStep {
                step: step.number,
                field: step.id.to_string(),
                message: retry_prompt(step, &labels, next_attempt),
                attempt: next_attempt,
                missing_fields: validation.missing,
            },
            attempt: next_attempt,
        };
    }

    warn!(
        step = step.number,
        missing = ?validation.missing,
        "retries exhausted, accepting best-effort answer"
    );
    let mut accepted = validation.validated;
    accepted.insert("raw_input".to_string(), json!(raw));
    complete_step(ctx, state, step, accepted)
}

pub fn enter_upload(ctx: &NodeContext<'_>, state: &JourneyState, step: &StepDescriptor) -> NodeOutcome {
    NodeOutcome::suspend(SuspendPayload::DocumentUpload {
        step: step.number,
        required_documents: DocumentType::REQUIRED.to_vec(),
        message: ctx.prompt_for(step, state),
    })
}

/// Read `{doc: locator}` objects or `doc: locator, ...` strings; anything else uploads every
/// required document at its default location.
pub fn parse_uploads(value: &Value) -> Vec<(DocumentType, String)> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(key, locator)| {
                let document = DocumentType::parse(key)?;
                let locator = locator.as_str()?.trim();
                (!locator.is_empty()).then(|| (document, locator.to_string()))
            })
            .collect(),
        Value::String(text) => {
            let listed: Vec<(DocumentType, String)> = text
                .split([',', '\n'])
                .filter_map(|entry| entry.split_once(':'))
                .filter_map(|(key, locator)| {
                    let document = DocumentType::parse(key)?;
                    let locator = locator.trim();
                    (!locator.is_empty()).then(|| (document, locator.to_string()))
                })
                .collect();
            if listed.is_empty() {
                default_uploads()
            } else {
                listed
            }
        }
        _ => default_uploads(),
    }
}

fn default_uploads() -> Vec<(DocumentType, String)> {
    DocumentType::REQUIRED
        .iter()
        .map(|document| (*document, format!("/uploads/{}.pdf", document.key())))
        .collect()
}

pub fn resume_upload(
    ctx: &NodeContext<'_>,
    state: &JourneyState,
    step: &StepDescriptor,
    value: &Value,
) -> NodeOutcome {
    let mut delta = StateDelta::advanced(state, step.number);
    let mut submissions = Vec::new();
    let mut recorded = FieldMap::new();

    for (document, locator) in parse_uploads(value) {
        if let Some(status) = state.status_of(document) {
            warn!(%document, status = status.label(), "document already uploaded, ignoring");
            continue;
        }
        if submissions.iter().any(|(queued, _)| *queued == document) {
            continue;
        }
        delta
            .status_changes
            .extend([(document, DocumentStatus::Pending), (document, DocumentStatus::Processing)]);
        delta.documents_uploaded.insert(document, locator.clone());
        recorded.insert(document.key().to_string(), json!(locator));
        submissions.push((document, locator));
    }

    info!(step = step.number, documents = submissions.len(), "documents submitted for extraction");
    let delta = with_collected(delta, step, recorded).with(sync_completed(ctx.store, state));
    NodeOutcome::Complete { delta, submissions }
}

/// Present everything collected for confirmation, unless finished documents need verifying
/// first, in which case the node completes without advancing.
pub fn enter_review(
    ctx: &NodeContext<'_>,
    state: &JourneyState,
    step: &StepDescriptor,
    still_processing: Vec<DocumentType>,
) -> NodeOutcome {
    let synced = sync_completed(ctx.store, state);
    if !synced.enqueue.is_empty() {
        debug!(queued = synced.enqueue.len(), "review deferred for verification");
        return NodeOutcome::complete(StateDelta::executed(state).with(synced));
    }

    let mut preview = state.clone();
    preview.apply(synced.clone());
    let summary = ctx
        .text
        .review_summary(&preview.collected_data)
        .unwrap_or_else(|error| {
            warn!(error = %error, "review summary failed, using fallback");
            fallback_review_summary(&preview.collected_data)
        });
    let mut message = format!("{summary}\n\nPlease review and confirm your application.");
    if !still_processing.is_empty() {
        let pending: Vec<&str> = still_processing.iter().map(|document| document.label()).collect();
        message.push_str(&format!(
            "\n\nStill processing: {}. These will be verified separately.",
            pending.join(", ")
        ));
    }

    NodeOutcome::Suspend {
        delta: synced,
        payload: SuspendPayload::Review {
            step: step.number,
            collected_data: preview.collected_data,
            documents_status: preview.documents_status,
            still_processing,
            message,
        },
        attempt: 0,
    }
}

pub fn resume_review(
    ctx: &NodeContext<'_>,
    state: &JourneyState,
    step: &StepDescriptor,
    value: &Value,
) -> NodeOutcome {
    let mut confirmation = FieldMap::new();
    confirmation.insert("confirmed_response".to_string(), value.clone());
    complete_step(ctx, state, step, confirmation)
}

pub fn enter_summary(ctx: &NodeContext<'_>, state: &JourneyState, step: &StepDescriptor) -> NodeOutcome {
    let message = ctx
        .text
        .final_summary(&state.collected_data, &state.documents_status)
        .unwrap_or_else(|error| {
            warn!(error = %error, "final summary failed, using fallback");
            FALLBACK_FINAL_SUMMARY.to_string()
        });
    NodeOutcome::suspend(SuspendPayload::Summary {
        step: step.number,
        collected_data: state.collected_data.clone(),
        documents_status: state.documents_status.clone(),
        message,
    })
}

pub fn resume_summary(state: &JourneyState, step: &StepDescriptor) -> NodeOutcome {
    NodeOutcome::complete(StateDelta {
        finished: true,
        termination: Some(Termination::Completed),
        ..StateDelta::advanced(state, step.number)
    })
}
