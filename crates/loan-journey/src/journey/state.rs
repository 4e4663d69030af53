use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Structured fields extracted from an answer or a document.
pub type FieldMap = BTreeMap<String, Value>;

/// Documents the applicant uploads during the journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    BankStatement,
    Payslip,
    Cibil,
    Pan,
    Aadhaar,
}

impl DocumentType {
    pub const REQUIRED: [DocumentType; 5] = [
        DocumentType::BankStatement,
        DocumentType::Payslip,
        DocumentType::Cibil,
        DocumentType::Pan,
        DocumentType::Aadhaar,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            DocumentType::BankStatement => "bank_statement",
            DocumentType::Payslip => "payslip",
            DocumentType::Cibil => "cibil",
            DocumentType::Pan => "pan",
            DocumentType::Aadhaar => "aadhaar",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::BankStatement => "Bank Statement",
            DocumentType::Payslip => "Payslip",
            DocumentType::Cibil => "CIBIL Report",
            DocumentType::Pan => "PAN Card",
            DocumentType::Aadhaar => "Aadhaar Card",
        }
    }

    /// Fields an extractor is expected to produce for this document.
    pub fn expected_fields(&self) -> &'static [&'static str] {
        match self {
            DocumentType::BankStatement => &[
                "bank_name",
                "account_number",
                "ifsc",
                "account_holder",
                "balance",
            ],
            DocumentType::Payslip => &["employer", "gross_salary", "net_salary", "pay_period"],
            DocumentType::Cibil => &["cibil_score", "report_date", "outstanding_loans"],
            DocumentType::Pan => &["pan_number", "name_on_pan", "dob"],
            DocumentType::Aadhaar => &["aadhaar_number", "name_on_aadhaar", "address"],
        }
    }

    /// Lenient parse accepting keys, labels, and spaced or hyphenated spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace([' ', '-'], "_");
        match normalized.as_str() {
            "bank_statement" | "bank" | "statement" => Some(DocumentType::BankStatement),
            "payslip" | "pay_slip" | "salary_slip" => Some(DocumentType::Payslip),
            "cibil" | "cibil_report" | "credit_report" => Some(DocumentType::Cibil),
            "pan" | "pan_card" => Some(DocumentType::Pan),
            "aadhaar" | "aadhaar_card" | "aadhar" => Some(DocumentType::Aadhaar),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    ReadyForVerification,
    Verified,
    Failed,
}

impl DocumentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::ReadyForVerification => "ready_for_verification",
            DocumentStatus::Verified => "verified",
            DocumentStatus::Failed => "failed",
        }
    }

    /// Statuses only move forward one stage at a time, or divert to `Failed`.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (DocumentStatus::Pending, DocumentStatus::Processing)
                | (DocumentStatus::Processing, DocumentStatus::ReadyForVerification)
                | (DocumentStatus::ReadyForVerification, DocumentStatus::Verified)
                | (DocumentStatus::Pending, DocumentStatus::Failed)
                | (DocumentStatus::Processing, DocumentStatus::Failed)
                | (DocumentStatus::ReadyForVerification, DocumentStatus::Failed)
        )
    }
}

/// How a journey stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Completed,
    GuardExceeded,
}

/// Complete state of one applicant journey, persisted after every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyState {
    pub user_id: String,
    pub current_step: u32,
    pub guard_counter: u32,
    pub finished: bool,
    #[serde(default)]
    pub termination: Option<Termination>,
    #[serde(default)]
    pub epoch: u64,
    #[serde(default)]
    pub collected_data: BTreeMap<String, FieldMap>,
    #[serde(default)]
    pub documents_uploaded: BTreeMap<DocumentType, String>,
    #[serde(default)]
    pub documents_status: BTreeMap<DocumentType, DocumentStatus>,
    #[serde(default)]
    pub extracted_data: BTreeMap<DocumentType, FieldMap>,
    #[serde(default)]
    pub verification_queue: Vec<DocumentType>,
}

impl JourneyState {
    pub fn new(user_id: impl Into<String>, epoch: u64) -> Self {
        Self {
            user_id: user_id.into(),
            current_step: 1,
            guard_counter: 0,
            finished: false,
            termination: None,
            epoch,
            collected_data: BTreeMap::new(),
            documents_uploaded: BTreeMap::new(),
            documents_status: BTreeMap::new(),
            extracted_data: BTreeMap::new(),
            verification_queue: Vec::new(),
        }
    }

    pub fn status_of(&self, document: DocumentType) -> Option<DocumentStatus> {
        self.documents_status.get(&document).copied()
    }

    pub fn documents_with_status(&self, status: DocumentStatus) -> Vec<DocumentType> {
        self.documents_status
            .iter()
            .filter(|(_, current)| **current == status)
            .map(|(document, _)| *document)
            .collect()
    }

    /// Apply a node's delta. Invalid status transitions and backwards step moves are
    /// rejected individually and logged; the rest of the delta still lands.
    pub fn apply(&mut self, delta: StateDelta) {
        if let Some(step) = delta.current_step {
            if step >= self.current_step {
                self.current_step = step;
            } else {
                warn!(
                    current = self.current_step,
                    requested = step,
                    "ignoring backwards step move"
                );
            }
        }

        if let Some(guard) = delta.guard_counter {
            self.guard_counter = self.guard_counter.max(guard);
        }

        if delta.finished {
            self.finished = true;
        }

        if self.termination.is_none() {
            self.termination = delta.termination;
        }

        self.collected_data.extend(delta.collected_data);
        self.documents_uploaded.extend(delta.documents_uploaded);

        for (document, next) in delta.status_changes {
            match self.status_of(document) {
                None if next == DocumentStatus::Pending => {
                    self.documents_status.insert(document, next);
                }
                Some(current) if current.can_transition_to(next) => {
                    self.documents_status.insert(document, next);
                }
                current => {
                    warn!(
                        %document,
                        from = current.map(|status| status.label()).unwrap_or("absent"),
                        to = next.label(),
                        "rejected document status transition"
                    );
                }
            }
        }

        for (document, fields) in delta.extracted_data {
            self.extracted_data
                .entry(document)
                .or_default()
                .extend(fields);
        }

        if let Some(document) = delta.dequeue {
            if self.verification_queue.first() != Some(&document) {
                warn!(%document, "dequeued document was not at the head of the queue");
            }
            self.verification_queue.retain(|queued| *queued != document);
        }

        for document in delta.enqueue {
            let ready = self.status_of(document) == Some(DocumentStatus::ReadyForVerification);
            if ready && !self.verification_queue.contains(&document) {
                self.verification_queue.push(document);
            }
        }

        let statuses = &self.documents_status;
        self.verification_queue
            .retain(|queued| statuses.get(queued) == Some(&DocumentStatus::ReadyForVerification));
    }
}

/// Changes a node asks the engine to make to [`JourneyState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub current_step: Option<u32>,
    pub guard_counter: Option<u32>,
    pub finished: bool,
    pub termination: Option<Termination>,
    pub collected_data: BTreeMap<String, FieldMap>,
    pub documents_uploaded: BTreeMap<DocumentType, String>,
    pub status_changes: Vec<(DocumentType, DocumentStatus)>,
    pub extracted_data: BTreeMap<DocumentType, FieldMap>,
    pub dequeue: Option<DocumentType>,
    pub enqueue: Vec<DocumentType>,
}

impl StateDelta {
    /// Delta recording one finished node execution.
    pub fn executed(state: &JourneyState) -> Self {
        Self {
            guard_counter: Some(state.guard_counter + 1),
            ..Self::default()
        }
    }

    /// Delta recording one finished node execution that also moves past `step`.
    pub fn advanced(state: &JourneyState, step: u32) -> Self {
        Self {
            current_step: Some(step + 1),
            ..Self::executed(state)
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold `other` into `self`; later scalar values win, collections accumulate.
    pub fn merge(&mut self, other: StateDelta) {
        if other.current_step.is_some() {
            self.current_step = other.current_step;
        }
        if other.guard_counter.is_some() {
            self.guard_counter = other.guard_counter;
        }
        self.finished |= other.finished;
        if other.termination.is_some() {
            self.termination = other.termination;
        }
        self.collected_data.extend(other.collected_data);
        self.documents_uploaded.extend(other.documents_uploaded);
        self.status_changes.extend(other.status_changes);
        for (document, fields) in other.extracted_data {
            self.extracted_data
                .entry(document)
                .or_default()
                .extend(fields);
        }
        if other.dequeue.is_some() {
            self.dequeue = other.dequeue;
        }
        self.enqueue.extend(other.enqueue);
    }

    pub fn with(mut self, other: StateDelta) -> Self {
        self.merge(other);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), json!(value)))
            .collect()
    }

    #[test]
    fn new_state_starts_at_step_one_with_empty_collections() {
        let state = JourneyState::new("user-1", 0);
        assert_eq!(state.current_step, 1);
        assert_eq!(state.guard_counter, 0);
        assert!(!state.finished);
        assert!(state.collected_data.is_empty());
        assert!(state.verification_queue.is_empty());
    }

    #[test]
    fn status_transitions_only_move_forward() {
        use DocumentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(ReadyForVerification));
        assert!(ReadyForVerification.can_transition_to(Verified));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(ReadyForVerification));
        assert!(!Processing.can_transition_to(Verified));
        assert!(!Verified.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn apply_rejects_skipped_status_transitions() {
        let mut state = JourneyState::new("user-1", 0);
        state.apply(StateDelta {
            status_changes: vec![
                (DocumentType::Pan, DocumentStatus::Pending),
                (DocumentType::Pan, DocumentStatus::Verified),
            ],
            ..StateDelta::default()
        });
        assert_eq!(
            state.status_of(DocumentType::Pan),
            Some(DocumentStatus::Pending)
        );
    }

    #[test]
    fn enqueue_admits_only_ready_documents_once() {
        let mut state = JourneyState::new("user-1", 0);
        state.apply(StateDelta {
            status_changes: vec![
                (DocumentType::Pan, DocumentStatus::Pending),
                (DocumentType::Pan, DocumentStatus::Processing),
                (DocumentType::Pan, DocumentStatus::ReadyForVerification),
                (DocumentType::Payslip, DocumentStatus::Pending),
                (DocumentType::Payslip, DocumentStatus::Processing),
            ],
            enqueue: vec![DocumentType::Pan, DocumentType::Payslip, DocumentType::Pan],
            ..StateDelta::default()
        });
        assert_eq!(state.verification_queue, vec![DocumentType::Pan]);
    }

    #[test]
    fn extracted_fields_merge_instead_of_replacing() {
        let mut state = JourneyState::new("user-1", 0);
        state.extracted_data.insert(
            DocumentType::Pan,
            fields(&[("pan_number", "ABCDE1234F"), ("name_on_pan", "J DOE")]),
        );
        let mut delta = StateDelta::default();
        delta
            .extracted_data
            .insert(DocumentType::Pan, fields(&[("name_on_pan", "John Doe")]));
        state.apply(delta);

        let pan = &state.extracted_data[&DocumentType::Pan];
        assert_eq!(pan["pan_number"], json!("ABCDE1234F"));
        assert_eq!(pan["name_on_pan"], json!("John Doe"));
    }

    #[test]
    fn current_step_never_moves_backwards() {
        let mut state = JourneyState::new("user-1", 0);
        state.current_step = 6;
        state.apply(StateDelta {
            current_step: Some(3),
            ..StateDelta::default()
        });
        assert_eq!(state.current_step, 6);
    }

    #[test]
    fn finished_is_one_way() {
        let mut state = JourneyState::new("user-1", 0);
        state.apply(StateDelta {
            finished: true,
            ..StateDelta::default()
        });
        state.apply(StateDelta::default());
        assert!(state.finished);
    }

    #[test]
    fn merge_accumulates_status_changes_in_order() {
        let state = JourneyState::new("user-1", 0);
        let delta = StateDelta::advanced(&state, 5).with(StateDelta {
            status_changes: vec![(DocumentType::Cibil, DocumentStatus::Pending)],
            ..StateDelta::default()
        });
        assert_eq!(delta.current_step, Some(6));
        assert_eq!(delta.guard_counter, Some(1));
        assert_eq!(delta.status_changes.len(), 1);
    }

    #[test]
    fn document_type_parse_accepts_labels() {
        assert_eq!(
            DocumentType::parse("Bank Statement"),
            Some(DocumentType::BankStatement)
        );
        assert_eq!(DocumentType::parse("pan-card"), Some(DocumentType::Pan));
        assert_eq!(DocumentType::parse("passport"), None);
    }
}
