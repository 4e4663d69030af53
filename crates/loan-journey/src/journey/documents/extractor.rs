use std::path::Path;
use std::time::Duration;

use serde_json::json;

use crate::journey::state::{DocumentType, FieldMap};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to read document at {locator}: {source}")]
    Read {
        locator: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no {document} fields found in {locator}")]
    NoFields {
        document: DocumentType,
        locator: String,
    },
    #[error("extraction backend failed: {0}")]
    Backend(String),
}

/// Pulls structured fields out of one uploaded document. Runs on the blocking pool.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, document: DocumentType, locator: &str) -> Result<FieldMap, ExtractionError>;
}

/// Prompt a model-backed extractor sends along with the document content.
pub fn extraction_prompt(document: DocumentType, content: &str) -> String {
    let fields = document
        .expected_fields()
        .iter()
        .map(|field| format!("- {field}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Extract the following fields from this {}:\n{fields}\nReturn as JSON.\n\n---\nDocument content:\n{content}",
        document.label()
    )
}

/// Returns placeholder values for every expected field after an optional delay.
#[derive(Debug, Clone, Default)]
pub struct TemplateDocumentExtractor {
    latency: Duration,
}

impl TemplateDocumentExtractor {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl DocumentExtractor for TemplateDocumentExtractor {
    fn extract(&self, document: DocumentType, _locator: &str) -> Result<FieldMap, ExtractionError> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(document
            .expected_fields()
            .iter()
            .map(|field| (field.to_string(), json!(format!("<extracted_{field}>"))))
            .collect())
    }
}

/// Reads `field: value` lines from a UTF-8 text file.
#[derive(Debug, Clone, Default)]
pub struct PlainTextDocumentExtractor;

impl DocumentExtractor for PlainTextDocumentExtractor {
    fn extract(&self, document: DocumentType, locator: &str) -> Result<FieldMap, ExtractionError> {
        let content =
            std::fs::read_to_string(Path::new(locator)).map_err(|source| ExtractionError::Read {
                locator: locator.to_string(),
                source,
            })?;

        let expected = document.expected_fields();
        let fields: FieldMap = content
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| {
                (
                    key.trim().to_ascii_lowercase().replace(' ', "_"),
                    value.trim(),
                )
            })
            .filter(|(key, value)| expected.contains(&key.as_str()) && !value.is_empty())
            .map(|(key, value)| (key, json!(value)))
            .collect();

        if fields.is_empty() {
            return Err(ExtractionError::NoFields {
                document,
                locator: locator.to_string(),
            });
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn template_extractor_fills_expected_fields() {
        let fields = TemplateDocumentExtractor::default()
            .extract(DocumentType::Pan, "/uploads/pan.pdf")
            .expect("template extraction");
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["pan_number"], json!("<extracted_pan_number>"));
    }

    #[test]
    fn plain_text_extractor_reads_matching_lines() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "PAN Number: ABCDE1234F").expect("write");
        writeln!(file, "name_on_pan: John Doe").expect("write");
        writeln!(file, "issued_by: Income Tax Department").expect("write");

        let locator = file.path().to_string_lossy().to_string();
        let fields = PlainTextDocumentExtractor
            .extract(DocumentType::Pan, &locator)
            .expect("plain text extraction");

        assert_eq!(fields["pan_number"], json!("ABCDE1234F"));
        assert_eq!(fields["name_on_pan"], json!("John Doe"));
        assert!(!fields.contains_key("issued_by"));
    }

    #[test]
    fn plain_text_extractor_reports_missing_files() {
        let error = PlainTextDocumentExtractor
            .extract(DocumentType::Cibil, "/definitely/not/here.txt")
            .expect_err("missing file");
        assert!(matches!(error, ExtractionError::Read { .. }));
    }

    #[test]
    fn extraction_prompt_lists_expected_fields() {
        let prompt = extraction_prompt(DocumentType::Payslip, "ACME Corp payslip");
        assert!(prompt.starts_with("Extract the following fields from this Payslip"));
        assert!(prompt.contains("- net_salary"));
        assert!(prompt.ends_with("ACME Corp payslip"));
    }
}
