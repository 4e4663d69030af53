use serde::{Deserialize, Serialize};

use super::state::{DocumentType, JourneyState, Termination};
use super::steps::JourneyBlueprint;

/// A node the engine can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum Node {
    Step(u32),
    Verification(DocumentType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    GuardExceeded,
    Completed,
    SequenceExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Node(Node),
    Terminal(TerminalReason),
}

/// Decide where a journey goes next. Pure and safe to call repeatedly.
///
/// Priority: guard limit, finished flag, verification queue head, current step.
pub fn route(state: &JourneyState, blueprint: &JourneyBlueprint, guard_limit: u32) -> Destination {
    if state.guard_counter > guard_limit
        || state.termination == Some(Termination::GuardExceeded)
    {
        return Destination::Terminal(TerminalReason::GuardExceeded);
    }
    if state.finished {
        return Destination::Terminal(TerminalReason::Completed);
    }
    if let Some(document) = state.verification_queue.first() {
        return Destination::Node(Node::Verification(*document));
    }
    match blueprint.step(state.current_step) {
        Some(step) => Destination::Node(Node::Step(step.number)),
        None => Destination::Terminal(TerminalReason::SequenceExhausted),
    }
}
