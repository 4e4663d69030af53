//! Prompt generation and free-text field extraction.
//!
//! The engine only talks to [`TextService`]; a model-backed implementation can replace the
//! [`RuleBasedTextService`] heuristics without touching step or routing code. Every failure is
//! recoverable: callers fall back to [`template_prompt`] and raw-text capture.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::normalizers::FieldKind;
use super::state::{DocumentStatus, DocumentType, FieldMap};
use super::steps::{FieldSpec, StepDescriptor, Validation};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextServiceError {
    #[error("text service unavailable: {0}")]
    Unavailable(String),
    #[error("could not extract fields for step '{step}'")]
    Unparseable { step: String },
}

pub trait TextService: Send + Sync {
    fn generate_prompt(
        &self,
        step: &StepDescriptor,
        total_steps: u32,
        collected: &BTreeMap<String, FieldMap>,
    ) -> Result<String, TextServiceError>;

    fn extract_fields(
        &self,
        step: &StepDescriptor,
        answer: &str,
    ) -> Result<FieldMap, TextServiceError>;

    fn validate(&self, step: &StepDescriptor, fields: &FieldMap) -> Validation {
        step.validate(fields)
    }

    fn review_summary(
        &self,
        collected: &BTreeMap<String, FieldMap>,
    ) -> Result<String, TextServiceError>;

    fn final_summary(
        &self,
        collected: &BTreeMap<String, FieldMap>,
        statuses: &BTreeMap<DocumentType, DocumentStatus>,
    ) -> Result<String, TextServiceError>;
}

/// Prompt used whenever no generated prompt is available.
pub fn template_prompt(
    step: &StepDescriptor,
    total_steps: u32,
    collected: &BTreeMap<String, FieldMap>,
) -> String {
    let greeting = collected
        .get("name")
        .and_then(|name| name.get("first_name"))
        .and_then(Value::as_str)
        .map(|first| format!("Thanks, {first}! "))
        .unwrap_or_default();
    format!(
        "{greeting}Step {}/{total_steps}: Please provide {}.",
        step.number, step.ask
    )
}

pub fn retry_prompt(step: &StepDescriptor, missing_labels: &[&str], attempt: u32) -> String {
    format!(
        "Sorry, I couldn't read your {} (attempt {attempt}). Please provide {}, for example: \"{}\".",
        missing_labels.join(", "),
        step.ask,
        step.example
    )
}

pub fn fallback_review_summary(collected: &BTreeMap<String, FieldMap>) -> String {
    let lines: Vec<String> = collected
        .iter()
        .map(|(step, fields)| {
            let readable = fields
                .iter()
                .map(|(key, value)| format!("{key}: {}", display_value(value)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("- {}: {readable}", title(step))
        })
        .collect();
    format!("Here's everything you've provided:\n\n{}", lines.join("\n"))
}

pub const FALLBACK_FINAL_SUMMARY: &str =
    "Your loan application has been submitted successfully! We'll contact you shortly.";

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn title(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
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

/// Heuristic text service that needs no external model.
#[derive(Debug, Default, Clone)]
pub struct RuleBasedTextService;

impl RuleBasedTextService {
    pub fn new() -> Self {
        Self
    }
}

const NAME_LEAD_INS: [&str; 5] = ["my name is", "name is", "i am", "i'm", "this is"];

fn strip_lead_in(answer: &str) -> &str {
    let lowered = answer.to_ascii_lowercase();
    NAME_LEAD_INS
        .iter()
        .find(|lead_in| lowered.starts_with(*lead_in))
        .map(|lead_in| answer[lead_in.len()..].trim_start_matches([' ', ':', ',']))
        .unwrap_or(answer)
}

fn segments(text: &str) -> Vec<String> {
    text.split([',', ';', '\n'])
        .map(|segment| segment.trim().trim_matches(['.', '-', ':']).trim())
        .filter(|segment| segment.chars().any(char::is_alphanumeric))
        .map(str::to_string)
        .collect()
}

fn city_candidate(answer: &str) -> Option<String> {
    let alphabetic: Vec<String> = answer
        .split(',')
        .map(|segment| {
            segment
                .chars()
                .filter(|c| !c.is_ascii_digit())
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|segment| !segment.is_empty())
        .collect();
    match alphabetic.len() {
        0 => None,
        1 | 2 => alphabetic.last().cloned(),
        len => Some(alphabetic[len - 2].clone()),
    }
}

fn split_name(answer: &str, first: &FieldSpec, last: &FieldSpec) -> FieldMap {
    let mut fields = FieldMap::new();
    let cleaned = strip_lead_in(answer.trim());
    let mut words = cleaned.split_whitespace();
    if let Some(given) = words.next() {
        fields.insert(first.key.to_string(), json!(given));
    }
    let rest = words.collect::<Vec<_>>().join(" ");
    if !rest.is_empty() {
        fields.insert(last.key.to_string(), json!(rest));
    }
    fields
}

impl TextService for RuleBasedTextService {
    fn generate_prompt(
        &self,
        step: &StepDescriptor,
        total_steps: u32,
        collected: &BTreeMap<String, FieldMap>,
    ) -> Result<String, TextServiceError> {
        Ok(template_prompt(step, total_steps, collected))
    }

    fn extract_fields(
        &self,
        step: &StepDescriptor,
        answer: &str,
    ) -> Result<FieldMap, TextServiceError> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(TextServiceError::Unparseable {
                step: step.id.to_string(),
            });
        }

        if let [only] = step.fields.as_slice() {
            let value = only.kind.locate(answer).unwrap_or(answer).trim();
            let mut fields = FieldMap::new();
            fields.insert(only.key.to_string(), json!(value));
            return Ok(fields);
        }

        if let [first, last] = step.fields.as_slice() {
            if first.kind == FieldKind::Name && last.kind == FieldKind::Name {
                return Ok(split_name(answer, first, last));
            }
        }

        let mut fields = FieldMap::new();
        let mut remaining = answer.to_string();
        for spec in step.fields.iter().filter(|spec| spec.kind.is_pattern()) {
            if let Some(found) = spec.kind.locate(&remaining).map(str::to_string) {
                fields.insert(spec.key.to_string(), json!(found.trim()));
                remaining = remaining.replacen(&found, " ", 1);
            }
        }

        for spec in &step.fields {
            match spec.kind {
                FieldKind::Address => {
                    fields.insert(spec.key.to_string(), json!(answer));
                }
                FieldKind::City => {
                    if let Some(city) = city_candidate(answer) {
                        fields.insert(spec.key.to_string(), json!(city));
                    }
                }
                _ => {}
            }
        }

        let unfilled: Vec<&FieldSpec> = step
            .fields
            .iter()
            .filter(|spec| matches!(spec.kind, FieldKind::Text | FieldKind::Name))
            .filter(|spec| !fields.contains_key(spec.key))
            .collect();
        let mut pieces = segments(&remaining);
        if let [only] = unfilled.as_slice() {
            if let Some(longest) = pieces.iter().max_by_key(|piece| piece.len()) {
                fields.insert(only.key.to_string(), json!(longest));
            }
        } else {
            pieces.truncate(unfilled.len());
            for (spec, piece) in unfilled.iter().zip(pieces) {
                fields.insert(spec.key.to_string(), json!(piece));
            }
        }

        if fields.is_empty() {
            return Err(TextServiceError::Unparseable {
                step: step.id.to_string(),
            });
        }
        Ok(fields)
    }

    fn review_summary(
        &self,
        collected: &BTreeMap<String, FieldMap>,
    ) -> Result<String, TextServiceError> {
        Ok(fallback_review_summary(collected))
    }

    fn final_summary(
        &self,
        collected: &BTreeMap<String, FieldMap>,
        statuses: &BTreeMap<DocumentType, DocumentStatus>,
    ) -> Result<String, TextServiceError> {
        let first_name = collected
            .get("name")
            .and_then(|name| name.get("first_name"))
            .and_then(Value::as_str);
        let amount = collected
            .get("loan_amount")
            .and_then(|loan| loan.get("amount"))
            .map(display_value);
        let verified = statuses
            .values()
            .filter(|status| **status == DocumentStatus::Verified)
            .count();

        let mut summary = match first_name {
            Some(first) => format!("Thank you, {first}! Your loan application has been submitted."),
            None => "Your loan application has been submitted.".to_string(),
        };
        if let Some(amount) = amount {
            summary.push_str(&format!(" Requested amount: INR {amount}."));
        }
        summary.push_str(&format!(
            " {verified} of {} documents verified. We'll contact you shortly.",
            statuses.len()
        ));
        Ok(summary)
    }
}
