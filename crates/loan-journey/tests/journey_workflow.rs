//! Integration specifications for the loan application journey.
//!
//! Scenarios drive the public engine facade against file-backed checkpoints so persistence,
//! restarts, and background document extraction are exercised together.

mod common {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Value};

    use loan_journey::config::JourneyConfig;
    use loan_journey::journey::{
        FileCheckpointStore, JourneyEngine, RuleBasedTextService, SuspendPayload,
        TemplateDocumentExtractor,
    };

    pub(super) type FileEngine = JourneyEngine<FileCheckpointStore>;

    pub(super) fn build_engine(root: &Path) -> FileEngine {
        let config = JourneyConfig {
            review_poll_interval: Duration::from_millis(5),
            extraction_latency: Duration::ZERO,
            ..JourneyConfig::default()
        };
        let checkpoints = FileCheckpointStore::open(root).expect("checkpoint directory opens");
        JourneyEngine::new(
            config,
            Arc::new(RuleBasedTextService::new()),
            Arc::new(TemplateDocumentExtractor::new(Duration::ZERO)),
            Arc::new(checkpoints),
        )
    }

    pub(super) fn respond_to(payload: &SuspendPayload) -> Value {
        match payload {
            SuspendPayload::DocumentVerification { .. } => json!("confirm"),
            SuspendPayload::JourneyStep { step, .. }
            | SuspendPayload::DocumentUpload { step, .. }
            | SuspendPayload::Review { step, .. }
            | SuspendPayload::Summary { step, .. } => match step {
                1 => json!("Priya Sharma"),
                2 => json!("1988-03-22"),
                3 => json!("priya.sharma@example.com, +91 98200 12345"),
                4 => json!("1,20,000 per month from salary"),
                5 => json!("payslip: /uploads/priya/payslip.pdf, aadhaar: /uploads/priya/aadhaar.pdf"),
                6 => json!("Infosys, Product Manager, 6 years"),
                7 => json!("Flat 12, Carter Road, Mumbai, Maharashtra 400050"),
                8 => json!("12 lakhs"),
                9 => json!("5 years"),
                10 => json!("Car purchase"),
                11 => json!("Anita Desai, 9811122233, friend"),
                12 => json!("ICICI Bank, account 004501234567, IFSC ICIC0000045"),
                13 => json!("I agree"),
                14 => json!("All correct"),
                _ => json!("Done"),
            },
        }
    }
}

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::*;
use loan_journey::journey::{
    journey_router, DocumentStatus, DocumentType, JourneyError, SuspendPayload, Termination,
};

#[tokio::test]
async fn journey_survives_a_restart_with_documents_in_flight() {
    let directory = tempfile::tempdir().expect("temp dir");

    let thread_id = {
        let engine = build_engine(directory.path());
        let started = engine.start("user-7").await.expect("journey starts");
        let mut payload = started.payload.expect("first prompt");
        loop {
            let uploading = matches!(payload, SuspendPayload::DocumentUpload { .. });
            let resumed = engine
                .resume(&started.thread_id, respond_to(&payload))
                .await
                .expect("resume succeeds");
            payload = resumed.payload.expect("journey suspends");
            if uploading {
                break;
            }
        }
        started.thread_id
    };

    let engine = build_engine(directory.path());
    let snapshot = engine.get_state(&thread_id).expect("checkpoint reloads");
    assert_eq!(snapshot.state.current_step, 6);
    assert_eq!(
        snapshot.state.documents_with_status(DocumentStatus::Processing),
        vec![DocumentType::Payslip, DocumentType::Aadhaar]
    );

    let mut payload = snapshot.pending.expect("pending prompt survives restart");
    let mut verified_in_order = Vec::new();
    loop {
        if let SuspendPayload::DocumentVerification { document, .. } = &payload {
            verified_in_order.push(*document);
        }
        let resumed = engine
            .resume(&thread_id, respond_to(&payload))
            .await
            .expect("resume succeeds");
        if resumed.finished {
            break;
        }
        payload = resumed.payload.expect("journey suspends");
    }

    assert_eq!(
        verified_in_order,
        vec![DocumentType::Payslip, DocumentType::Aadhaar]
    );
    let state = engine.get_state(&thread_id).expect("state").state;
    assert!(state.finished);
    assert_eq!(state.termination, Some(Termination::Completed));
    assert!(state.verification_queue.is_empty());
    assert_eq!(
        state.documents_with_status(DocumentStatus::Verified),
        vec![DocumentType::Payslip, DocumentType::Aadhaar]
    );
    assert!(directory.path().join(format!("{thread_id}.json")).exists());
}

#[tokio::test]
async fn state_reads_do_not_change_the_checkpoint() {
    let directory = tempfile::tempdir().expect("temp dir");
    let engine = build_engine(directory.path());
    let started = engine.start("user-8").await.expect("journey starts");
    let path = directory.path().join(format!("{}.json", started.thread_id));
    let before = std::fs::read_to_string(&path).expect("checkpoint written");

    for _ in 0..3 {
        engine.get_state(&started.thread_id).expect("state loads");
    }

    let after = std::fs::read_to_string(&path).expect("checkpoint still present");
    assert_eq!(before, after);
}

#[tokio::test]
async fn reset_starts_over_for_the_same_user() {
    let directory = tempfile::tempdir().expect("temp dir");
    let engine = build_engine(directory.path());
    let started = engine.start("user-9").await.expect("journey starts");
    engine
        .resume(&started.thread_id, respond_to(&started.payload.expect("prompt")))
        .await
        .expect("resume succeeds");

    let restarted = engine.reset(&started.thread_id).await.expect("reset");

    let state = engine.get_state(&restarted.thread_id).expect("state").state;
    assert_eq!(state.user_id, "user-9");
    assert_eq!(state.current_step, 1);
    assert_eq!(state.epoch, 1);
    assert!(state.collected_data.is_empty());
}

#[tokio::test]
async fn malformed_thread_ids_read_as_missing_journeys() {
    let directory = tempfile::tempdir().expect("temp dir");
    let engine = build_engine(directory.path());

    let error = engine.get_state("../escape").expect_err("rejected id");
    assert!(matches!(error, JourneyError::ThreadNotFound(_)));
    let error = engine
        .resume("../escape", json!("hello"))
        .await
        .expect_err("rejected id");
    assert!(matches!(error, JourneyError::ThreadNotFound(_)));
    let error = engine.reset("bad.id").await.expect_err("rejected id");
    assert!(matches!(error, JourneyError::ThreadNotFound(_)));

    let response = journey_router(Arc::new(engine))
        .oneshot(
            Request::get("/api/v1/journeys/bad.id")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
