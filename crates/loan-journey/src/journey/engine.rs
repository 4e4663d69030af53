use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::checkpoint::{Checkpoint, CheckpointError, CheckpointStore, PendingSuspend};
use super::documents::{DocumentExtractor, DocumentTask, DocumentWorkerPool, ProcessingStore};
use super::nodes::{self, NodeContext, NodeOutcome};
use super::routing::{route, Destination, Node, TerminalReason};
use super::state::{DocumentStatus, JourneyState, StateDelta, Termination};
use super::steps::{JourneyBlueprint, StepDescriptor, StepKind};
use super::suspend::SuspendPayload;
use super::text::TextService;
use super::verification;
use crate::config::JourneyConfig;

/// Error raised at the journey boundary.
#[derive(Debug, thiserror::Error)]
pub enum JourneyError {
    #[error("journey '{0}' not found")]
    ThreadNotFound(String),
    #[error("journey '{thread_id}' has no outstanding prompt to resume")]
    ResumeMismatch { thread_id: String },
    #[error("journey '{thread_id}' stopped after {guard_counter} node executions (limit {limit})")]
    GuardExceeded {
        thread_id: String,
        guard_counter: u32,
        limit: u32,
    },
    #[error("step {0} is not part of the journey")]
    UnknownStep(u32),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartOutcome {
    pub thread_id: String,
    pub prompt: Option<String>,
    pub payload: Option<SuspendPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeOutcome {
    pub thread_id: String,
    pub next_prompt: Option<String>,
    pub payload: Option<SuspendPayload>,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JourneySnapshot {
    pub thread_id: String,
    pub state: JourneyState,
    pub pending_prompt: Option<String>,
    pub pending: Option<SuspendPayload>,
}

fn prompt_of(checkpoint: &Checkpoint) -> (Option<String>, Option<SuspendPayload>) {
    match &checkpoint.pending {
        Some(pending) => (
            Some(pending.payload.message().to_string()),
            Some(pending.payload.clone()),
        ),
        None => (None, None),
    }
}

/// Per-thread execution context: calls on one thread are serialized through `gate`.
struct JourneyRuntime {
    gate: tokio::sync::Mutex<()>,
    store: Arc<ProcessingStore>,
    tasks: Mutex<Vec<DocumentTask>>,
    /// Set once the journey has no outstanding suspend.
    retired: AtomicBool,
}

impl JourneyRuntime {
    fn new(epoch: u64) -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            store: Arc::new(ProcessingStore::with_epoch(epoch)),
            tasks: Mutex::new(Vec::new()),
            retired: AtomicBool::new(false),
        }
    }

    fn track(&self, thread_id: &str, task: DocumentTask) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|running| !running.is_finished());
        debug!(
            %thread_id,
            document = %task.document(),
            epoch = task.epoch(),
            running = tasks.len(),
            "extraction submitted"
        );
        tasks.push(task);
    }

    /// No document in flight and every extraction supervisor has exited.
    fn is_idle(&self) -> bool {
        if self.store.is_any_processing() {
            return false;
        }
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.iter().all(DocumentTask::is_finished)
    }

    fn is_releasable(&self) -> bool {
        self.retired.load(Ordering::Acquire) && self.is_idle()
    }
}

fn release_idle(runtimes: &mut HashMap<String, Arc<JourneyRuntime>>) {
    runtimes.retain(|thread_id, runtime| {
        let release = runtime.is_releasable();
        if release {
            debug!(%thread_id, "journey runtime released");
        }
        !release
    });
}

/// Drives journeys node by node, persisting after each one.
pub struct JourneyEngine<C> {
    config: JourneyConfig,
    blueprint: JourneyBlueprint,
    text: Arc<dyn TextService>,
    workers: DocumentWorkerPool,
    checkpoints: Arc<C>,
    runtimes: Mutex<HashMap<String, Arc<JourneyRuntime>>>,
}

impl<C> JourneyEngine<C>
where
    C: CheckpointStore + 'static,
{
    pub fn new(
        config: JourneyConfig,
        text: Arc<dyn TextService>,
        extractor: Arc<dyn DocumentExtractor>,
        checkpoints: Arc<C>,
    ) -> Self {
        Self {
            config,
            blueprint: JourneyBlueprint::standard(),
            text,
            workers: DocumentWorkerPool::new(extractor),
            checkpoints,
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &JourneyConfig {
        &self.config
    }

    pub fn blueprint(&self) -> &JourneyBlueprint {
        &self.blueprint
    }

    pub fn checkpoints(&self) -> &Arc<C> {
        &self.checkpoints
    }

    /// The processing store for a thread with a live runtime in this process.
    ///
    /// Runtimes are released once their journey has ended and no extraction is running.
    pub fn processing_store(&self, thread_id: &str) -> Option<Arc<ProcessingStore>> {
        let runtimes = self.runtimes.lock().unwrap_or_else(PoisonError::into_inner);
        runtimes
            .get(thread_id)
            .map(|runtime| Arc::clone(&runtime.store))
    }

    fn runtime(&self, thread_id: &str, epoch: u64) -> (Arc<JourneyRuntime>, bool) {
        let mut runtimes = self.runtimes.lock().unwrap_or_else(PoisonError::into_inner);
        release_idle(&mut runtimes);
        if let Some(runtime) = runtimes.get(thread_id) {
            return (Arc::clone(runtime), false);
        }
        let runtime = Arc::new(JourneyRuntime::new(epoch));
        runtimes.insert(thread_id.to_string(), Arc::clone(&runtime));
        (runtime, true)
    }

    /// Flag the runtime as ended and drop every ended runtime that has gone idle.
    fn retire(&self, runtime: &JourneyRuntime) {
        runtime.retired.store(true, Ordering::Release);
        let mut runtimes = self.runtimes.lock().unwrap_or_else(PoisonError::into_inner);
        release_idle(&mut runtimes);
    }

    fn load(&self, thread_id: &str) -> Result<Checkpoint, JourneyError> {
        match self.checkpoints.load(thread_id) {
            Ok(Some(checkpoint)) => Ok(checkpoint),
            Ok(None) | Err(CheckpointError::InvalidThreadId(_)) => {
                Err(JourneyError::ThreadNotFound(thread_id.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn resume_mismatch(thread_id: &str) -> JourneyError {
        warn!(%thread_id, "resume without an outstanding suspend");
        JourneyError::ResumeMismatch {
            thread_id: thread_id.to_string(),
        }
    }

    /// Create a journey and run it to its first suspend point.
    ///
    /// A blank `user_id` is replaced by the new thread id.
    pub async fn start(&self, user_id: &str) -> Result<StartOutcome, JourneyError> {
        let thread_id = Uuid::new_v4().to_string();
        let user_id = match user_id.trim() {
            "" => thread_id.as_str(),
            trimmed => trimmed,
        };
        let (runtime, _) = self.runtime(&thread_id, 0);
        let _gate = runtime.gate.lock().await;

        info!(%thread_id, %user_id, "journey started");
        let state = JourneyState::new(user_id, runtime.store.epoch());
        let checkpoint = self.drive(&thread_id, &runtime, state, None).await?;
        let (prompt, payload) = prompt_of(&checkpoint);
        Ok(StartOutcome {
            thread_id,
            prompt,
            payload,
        })
    }

    /// Deliver `value` to the thread's outstanding suspend point and run until the next one.
    pub async fn resume(&self, thread_id: &str, value: Value) -> Result<ResumeOutcome, JourneyError> {
        let existing = self.load(thread_id)?;
        if existing.pending.is_none() {
            return Err(Self::resume_mismatch(thread_id));
        }
        let (runtime, fresh) = self.runtime(thread_id, existing.state.epoch);
        let _gate = runtime.gate.lock().await;

        let checkpoint = self.load(thread_id)?;
        let Some(pending) = checkpoint.pending else {
            self.retire(&runtime);
            return Err(Self::resume_mismatch(thread_id));
        };
        if fresh && checkpoint.state.termination.is_none() {
            self.rehydrate(thread_id, &runtime, &checkpoint.state);
        }

        debug!(%thread_id, node = ?pending.node, "resuming");
        let checkpoint = self
            .drive(thread_id, &runtime, checkpoint.state, Some((pending, value)))
            .await?;
        let (next_prompt, payload) = prompt_of(&checkpoint);
        Ok(ResumeOutcome {
            thread_id: thread_id.to_string(),
            next_prompt,
            payload,
            finished: checkpoint.state.finished,
        })
    }

    /// Pure read of the persisted journey.
    pub fn get_state(&self, thread_id: &str) -> Result<JourneySnapshot, JourneyError> {
        let checkpoint = self.load(thread_id)?;
        let (pending_prompt, pending) = prompt_of(&checkpoint);
        Ok(JourneySnapshot {
            thread_id: checkpoint.thread_id,
            state: checkpoint.state,
            pending_prompt,
            pending,
        })
    }

    /// Clear the journey and restart it for the same user under a new store epoch.
    pub async fn reset(&self, thread_id: &str) -> Result<StartOutcome, JourneyError> {
        let existing = self.load(thread_id)?;
        let (runtime, _) = self.runtime(thread_id, existing.state.epoch);
        let _gate = runtime.gate.lock().await;
        runtime.retired.store(false, Ordering::Release);
        self.runtimes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::clone(&runtime));

        let epoch = runtime.store.reset();
        info!(%thread_id, epoch, "journey reset");
        let state = JourneyState::new(existing.state.user_id, epoch);
        let checkpoint = self.drive(thread_id, &runtime, state, None).await?;
        let (prompt, payload) = prompt_of(&checkpoint);
        Ok(StartOutcome {
            thread_id: thread_id.to_string(),
            prompt,
            payload,
        })
    }

    /// Resubmit documents a previous process left processing.
    fn rehydrate(&self, thread_id: &str, runtime: &JourneyRuntime, state: &JourneyState) {
        for document in state.documents_with_status(DocumentStatus::Processing) {
            if runtime.store.is_processing(document) {
                continue;
            }
            match state.documents_uploaded.get(&document) {
                Some(locator) => {
                    info!(%thread_id, %document, "resubmitting document after restart");
                    let task = self.workers.submit(&runtime.store, document, locator.clone());
                    runtime.track(thread_id, task);
                }
                None => warn!(%thread_id, %document, "processing document has no locator"),
            }
        }
    }

    fn context<'a>(&'a self, runtime: &'a JourneyRuntime) -> NodeContext<'a> {
        NodeContext {
            blueprint: &self.blueprint,
            text: self.text.as_ref(),
            store: &runtime.store,
            max_validation_retries: self.config.max_validation_retries,
        }
    }

    fn step(&self, number: u32) -> Result<&StepDescriptor, JourneyError> {
        self.blueprint
            .step(number)
            .ok_or(JourneyError::UnknownStep(number))
    }

    async fn enter(
        &self,
        runtime: &JourneyRuntime,
        state: &JourneyState,
        node: Node,
    ) -> Result<NodeOutcome, JourneyError> {
        let ctx = self.context(runtime);
        let outcome = match node {
            Node::Verification(document) => verification::enter_verification(state, document),
            Node::Step(number) => {
                let step = self.step(number)?;
                match step.kind {
                    StepKind::Collect => nodes::enter_collect(&ctx, state, step),
                    StepKind::DocumentUpload => nodes::enter_upload(&ctx, state, step),
                    StepKind::Review => {
                        let idle = runtime
                            .store
                            .wait_until_idle(
                                self.config.review_poll_interval,
                                self.config.review_gate_timeout,
                            )
                            .await;
                        let still_processing = if idle {
                            Vec::new()
                        } else {
                            let pending = runtime.store.processing_docs();
                            warn!(?pending, "review gate timed out with documents in flight");
                            pending
                        };
                        nodes::enter_review(&ctx, state, step, still_processing)
                    }
                    StepKind::Summary => nodes::enter_summary(&ctx, state, step),
                }
            }
        };
        Ok(outcome)
    }

    fn resume_node(
        &self,
        runtime: &JourneyRuntime,
        state: &JourneyState,
        pending: &PendingSuspend,
        value: &Value,
    ) -> Result<NodeOutcome, JourneyError> {
        let ctx = self.context(runtime);
        let outcome = match pending.node {
            Node::Verification(document) => {
                verification::resume_verification(&runtime.store, state, document, value)
            }
            Node::Step(number) => {
                let step = self.step(number)?;
                match step.kind {
                    StepKind::Collect => {
                        nodes::resume_collect(&ctx, state, step, pending.attempt, value)
                    }
                    StepKind::DocumentUpload => nodes::resume_upload(&ctx, state, step, value),
                    StepKind::Review => nodes::resume_review(&ctx, state, step, value),
                    StepKind::Summary => nodes::resume_summary(state, step),
                }
            }
        };
        Ok(outcome)
    }

    /// Run nodes until the journey suspends or terminates, saving after each node.
    async fn drive(
        &self,
        thread_id: &str,
        runtime: &JourneyRuntime,
        mut state: JourneyState,
        mut resume: Option<(PendingSuspend, Value)>,
    ) -> Result<Checkpoint, JourneyError> {
        let limit = self.config.max_steps_guard;
        loop {
            let (node, outcome) = match resume.take() {
                Some((pending, value)) => {
                    let outcome = self.resume_node(runtime, &state, &pending, &value)?;
                    (pending.node, outcome)
                }
                None => match route(&state, &self.blueprint, limit) {
                    Destination::Node(node) => (node, self.enter(runtime, &state, node).await?),
                    Destination::Terminal(TerminalReason::GuardExceeded) => {
                        state.apply(StateDelta {
                            termination: Some(Termination::GuardExceeded),
                            ..StateDelta::default()
                        });
                        self.checkpoints
                            .save(&Checkpoint::new(thread_id, state.clone(), None))?;
                        self.retire(runtime);
                        warn!(
                            %thread_id,
                            guard_counter = state.guard_counter,
                            limit,
                            step = state.current_step,
                            "journey stopped by step guard"
                        );
                        return Err(JourneyError::GuardExceeded {
                            thread_id: thread_id.to_string(),
                            guard_counter: state.guard_counter,
                            limit,
                        });
                    }
                    Destination::Terminal(reason) => {
                        state.apply(StateDelta {
                            finished: true,
                            termination: Some(Termination::Completed),
                            ..StateDelta::default()
                        });
                        let checkpoint = Checkpoint::new(thread_id, state, None);
                        self.checkpoints.save(&checkpoint)?;
                        self.retire(runtime);
                        info!(%thread_id, ?reason, "journey finished");
                        return Ok(checkpoint);
                    }
                },
            };

            match outcome {
                NodeOutcome::Complete { delta, submissions } => {
                    state.apply(delta);
                    self.checkpoints
                        .save(&Checkpoint::new(thread_id, state.clone(), None))?;
                    for (document, locator) in submissions {
                        let task = self.workers.submit(&runtime.store, document, locator);
                        runtime.track(thread_id, task);
                    }
                    debug!(
                        %thread_id,
                        ?node,
                        step = state.current_step,
                        guard_counter = state.guard_counter,
                        "node completed"
                    );
                }
                NodeOutcome::Suspend {
                    delta,
                    payload,
                    attempt,
                } => {
                    state.apply(delta);
                    let checkpoint = Checkpoint::new(
                        thread_id,
                        state,
                        Some(PendingSuspend {
                            node,
                            payload,
                            attempt,
                        }),
                    );
                    self.checkpoints.save(&checkpoint)?;
                    debug!(%thread_id, ?node, attempt, "journey suspended");
                    return Ok(checkpoint);
                }
            }
        }
    }
}
