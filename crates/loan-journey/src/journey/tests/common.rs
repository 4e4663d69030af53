use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::JourneyConfig;
use crate::journey::checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore, PendingSuspend};
use crate::journey::documents::{DocumentExtractor, ExtractionError, TemplateDocumentExtractor};
use crate::journey::engine::{JourneyEngine, ResumeOutcome};
use crate::journey::routing::Node;
use crate::journey::state::{DocumentType, FieldMap, JourneyState};
use crate::journey::suspend::SuspendPayload;
use crate::journey::text::RuleBasedTextService;

pub(super) type MemoryEngine = JourneyEngine<InMemoryCheckpointStore>;

pub(super) fn test_config() -> JourneyConfig {
    JourneyConfig {
        review_poll_interval: Duration::from_millis(5),
        extraction_latency: Duration::ZERO,
        ..JourneyConfig::default()
    }
}

pub(super) fn build_engine() -> Arc<MemoryEngine> {
    build_engine_with(test_config(), Arc::new(TemplateDocumentExtractor::default()))
}

pub(super) fn build_engine_with(
    config: JourneyConfig,
    extractor: Arc<dyn DocumentExtractor>,
) -> Arc<MemoryEngine> {
    Arc::new(JourneyEngine::new(
        config,
        Arc::new(RuleBasedTextService::new()),
        extractor,
        Arc::new(InMemoryCheckpointStore::new()),
    ))
}

pub(super) struct FailingExtractor;

impl DocumentExtractor for FailingExtractor {
    fn extract(&self, _: DocumentType, locator: &str) -> Result<FieldMap, ExtractionError> {
        Err(ExtractionError::Backend(format!("unreadable scan at {locator}")))
    }
}

/// Template extractor that counts the documents it was asked to read.
#[derive(Default)]
pub(super) struct CountingExtractor {
    calls: AtomicUsize,
    inner: TemplateDocumentExtractor,
}

impl CountingExtractor {
    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DocumentExtractor for CountingExtractor {
    fn extract(&self, document: DocumentType, locator: &str) -> Result<FieldMap, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.extract(document, locator)
    }
}

/// Answer that passes validation for each step of the standard blueprint.
pub(super) fn canned_answer(step: u32) -> Value {
    match step {
        1 => json!("John Doe"),
        2 => json!("15/01/1990"),
        3 => json!("9876543210, john@example.com"),
        4 => json!("75,000 per month, salary from software job"),
        5 => json!({
            "pan": "/uploads/pan.pdf",
            "payslip": "/uploads/payslip.pdf",
        }),
        6 => json!("TCS, Senior Developer, 3 years"),
        7 => json!("42, MG Road, Bengaluru, Karnataka 560001"),
        8 => json!("5 lakhs"),
        9 => json!("36 months"),
        10 => json!("Home renovation"),
        11 => json!("Rahul Verma, 9988776655, colleague"),
        12 => json!("HDFC Bank, A/C 123456789012, IFSC HDFC0001234"),
        13 => json!("Yes, I agree"),
        14 => json!("Looks good"),
        _ => json!("Thanks"),
    }
}

pub(super) fn respond_to(payload: &SuspendPayload) -> Value {
    match payload {
        SuspendPayload::JourneyStep { step, .. } => canned_answer(*step),
        SuspendPayload::DocumentUpload { step, .. } => canned_answer(*step),
        SuspendPayload::DocumentVerification { .. } => json!({ "confirmed": true }),
        SuspendPayload::Review { step, .. } | SuspendPayload::Summary { step, .. } => {
            canned_answer(*step)
        }
    }
}

pub(super) async fn answer(engine: &MemoryEngine, thread_id: &str, value: Value) -> ResumeOutcome {
    engine
        .resume(thread_id, value)
        .await
        .expect("resume succeeds")
}

/// Start a journey and answer collect prompts until `step` is the pending step.
pub(super) async fn start_at_step(engine: &MemoryEngine, step: u32) -> String {
    let started = engine.start("user-42").await.expect("journey starts");
    let thread_id = started.thread_id;
    loop {
        let snapshot = engine.get_state(&thread_id).expect("state loads");
        let payload = snapshot.pending.expect("journey is suspended");
        if matches!(&payload, SuspendPayload::JourneyStep { step: current, .. } | SuspendPayload::DocumentUpload { step: current, .. } if *current == step)
        {
            return thread_id;
        }
        answer(engine, &thread_id, respond_to(&payload)).await;
    }
}

/// Run a fresh journey to completion with canned answers and return its thread id.
pub(super) async fn finish_journey(engine: &MemoryEngine, user_id: &str) -> String {
    let started = engine.start(user_id).await.expect("journey starts");
    let mut payload = started.payload.expect("first payload");
    loop {
        let resumed = answer(engine, &started.thread_id, respond_to(&payload)).await;
        if resumed.finished {
            return started.thread_id;
        }
        payload = resumed.payload.expect("journey suspended again");
    }
}

pub(super) async fn wait_for_documents(engine: &MemoryEngine, thread_id: &str) {
    let store = engine
        .processing_store(thread_id)
        .expect("journey has a processing store");
    let idle = store
        .wait_until_idle(Duration::from_millis(5), Some(Duration::from_secs(5)))
        .await;
    assert!(idle, "documents finished processing");
}

pub(super) fn collect_pending(step: u32) -> PendingSuspend {
    PendingSuspend {
        node: Node::Step(step),
        payload: SuspendPayload::JourneyStep {
            step,
            field: format!("step_{step}"),
            message: format!("Step {step}/15: Please answer."),
            attempt: 0,
            missing_fields: Vec::new(),
        },
        attempt: 0,
    }
}

/// Persist a hand-built checkpoint, as if written by an earlier process.
pub(super) fn seed_checkpoint(
    engine: &MemoryEngine,
    thread_id: &str,
    state: JourneyState,
    pending: Option<PendingSuspend>,
) {
    engine
        .checkpoints()
        .save(&Checkpoint::new(thread_id, state, pending))
        .expect("checkpoint saves");
}

pub(super) async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
