use serde_json::Value;

use super::normalizers::FieldKind;
use super::state::FieldMap;

/// How the generic step routine treats a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Ask, extract, validate, retry.
    Collect,
    /// Accept document locators and hand them to the worker pool.
    DocumentUpload,
    /// Wait for in-flight documents, then present everything for confirmation.
    Review,
    /// Final confirmation; finishes the journey.
    Summary,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    const fn required(key: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            label,
            kind,
            required: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepDescriptor {
    pub number: u32,
    pub id: &'static str,
    pub kind: StepKind,
    pub ask: &'static str,
    pub example: &'static str,
    pub fields: Vec<FieldSpec>,
}

/// Outcome of checking extracted fields against a step's field specs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    pub validated: FieldMap,
    pub missing: Vec<String>,
}

impl Validation {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

impl StepDescriptor {
    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.key == key)
    }

    /// Normalize every declared field; required fields that are absent or fail their
    /// normalizer are reported as missing.
    pub fn validate(&self, fields: &FieldMap) -> Validation {
        let mut validation = Validation::default();
        for spec in &self.fields {
            let normalized = fields
                .get(spec.key)
                .unwrap_or(&Value::Null)
                .clone();
            match spec.kind.normalize(&normalized) {
                Ok(value) => {
                    validation.validated.insert(spec.key.to_string(), value);
                }
                Err(_) if spec.required => validation.missing.push(spec.key.to_string()),
                Err(_) => {}
            }
        }
        validation
    }

    pub fn missing_labels(&self, missing: &[String]) -> Vec<&'static str> {
        missing
            .iter()
            .filter_map(|key| self.field(key).map(|spec| spec.label))
            .collect()
    }
}

/// The ordered step sequence a journey walks through.
#[derive(Debug)]
pub struct JourneyBlueprint {
    steps: Vec<StepDescriptor>,
}

impl JourneyBlueprint {
    pub fn standard() -> Self {
        Self {
            steps: standard_steps(),
        }
    }

    pub fn step(&self, number: u32) -> Option<&StepDescriptor> {
        self.steps.iter().find(|step| step.number == number)
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn total(&self) -> u32 {
        self.steps.len() as u32
    }
}

fn standard_steps() -> Vec<StepDescriptor> {
    use FieldKind::*;

    let collect = |number, id, ask, example, fields| StepDescriptor {
        number,
        id,
        kind: StepKind::Collect,
        ask,
        example,
        fields,
    };

    vec![
        collect(
            1,
            "name",
            "the applicant's full name (first and last)",
            "My name is Priya Sharma",
            vec![
                FieldSpec::required("first_name", "First name", Name),
                FieldSpec::required("last_name", "Last name", Name),
            ],
        ),
        collect(
            2,
            "dob",
            "their date of birth",
            "I was born on 15 January 1990",
            vec![FieldSpec::required("date_of_birth", "Date of birth", Date)],
        ),
        collect(
            3,
            "contact",
            "their phone number and email address",
            "9876543210, priya@email.com",
            vec![
                FieldSpec::required("phone", "Phone number", Phone),
                FieldSpec::required("email", "Email address", Email),
            ],
        ),
        collect(
            4,
            "income",
            "their monthly income and its source",
            "75,000 per month, salary from my job as a software engineer",
            vec![
                FieldSpec::required("monthly_income", "Monthly income", Amount),
                FieldSpec::required("income_source", "Source of income", Text),
            ],
        ),
        StepDescriptor {
            number: 5,
            id: "document_upload",
            kind: StepKind::DocumentUpload,
            ask: "to upload their documents (Bank Statement, Payslip, CIBIL, PAN, Aadhaar)",
            example: "bank_statement: /uploads/statement.pdf, pan: /uploads/pan.pdf",
            fields: Vec::new(),
        },
        collect(
            6,
            "employment",
            "their employment details: employer name, designation, and tenure",
            "TCS, Senior Developer, 3 years",
            vec![
                FieldSpec::required("employer", "Employer name", Text),
                FieldSpec::required("designation", "Job title", Text),
                FieldSpec::required("tenure_years", "Years at current employer", Integer),
            ],
        ),
        collect(
            7,
            "address",
            "their current residential address",
            "42, MG Road, Bengaluru, Karnataka 560001",
            vec![
                FieldSpec::required("full_address", "Complete current address", Address),
                FieldSpec::required("city", "City", City),
                FieldSpec::required("pincode", "PIN code", Pincode),
            ],
        ),
        collect(
            8,
            "loan_amount",
            "how much loan they are requesting",
            "I need a loan of 5 lakhs",
            vec![FieldSpec::required("amount", "Requested loan amount in INR", Amount)],
        ),
        collect(
            9,
            "loan_tenure",
            "their preferred loan repayment tenure",
            "I'd like to repay over 36 months",
            vec![FieldSpec::required("tenure_months", "Loan tenure in months", Integer)],
        ),
        collect(
            10,
            "purpose",
            "the purpose of this loan",
            "I want to renovate my house",
            vec![FieldSpec::required("loan_purpose", "Purpose of the loan", Text)],
        ),
        collect(
            11,
            "references",
            "a personal reference (name, phone, relationship)",
            "Rahul Verma, 9988776655, colleague",
            vec![
                FieldSpec::required("ref_name", "Reference person's name", Name),
                FieldSpec::required("ref_phone", "Reference phone", Phone),
                FieldSpec::required("ref_relation", "Relationship", Text),
            ],
        ),
        collect(
            12,
            "bank_details",
            "their bank account details for loan disbursement",
            "HDFC Bank, A/C 123456789012, IFSC HDFC0001234",
            vec![
                FieldSpec::required("account_number", "Bank account number", AccountNumber),
                FieldSpec::required("ifsc", "IFSC code", Ifsc),
                FieldSpec::required("bank_name", "Bank name", Text),
            ],
        ),
        collect(
            13,
            "consent",
            "whether they agree to the Terms & Conditions",
            "Yes, I agree",
            vec![FieldSpec::required("agreed", "Agreement to T&C", YesNo)],
        ),
        StepDescriptor {
            number: 14,
            id: "review",
            kind: StepKind::Review,
            ask: "to review and confirm the application",
            example: "Looks good",
            fields: Vec::new(),
        },
        StepDescriptor {
            number: 15,
            id: "summary",
            kind: StepKind::Summary,
            ask: "to acknowledge the submitted application",
            example: "Thanks",
            fields: Vec::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_blueprint_has_fifteen_ordered_steps() {
        let blueprint = JourneyBlueprint::standard();
        assert_eq!(blueprint.total(), 15);
        for (index, step) in blueprint.steps().iter().enumerate() {
            assert_eq!(step.number, index as u32 + 1);
        }
        assert_eq!(
            blueprint.step(5).map(|step| step.kind),
            Some(StepKind::DocumentUpload)
        );
        assert_eq!(blueprint.step(14).map(|step| step.kind), Some(StepKind::Review));
        assert!(blueprint.step(16).is_none());
    }

    #[test]
    fn validate_reports_missing_and_invalid_required_fields() {
        let blueprint = JourneyBlueprint::standard();
        let contact = blueprint.step(3).expect("contact step");
        let mut fields = FieldMap::new();
        fields.insert("phone".to_string(), json!("12345"));

        let validation = contact.validate(&fields);

        assert!(!validation.is_complete());
        assert_eq!(validation.missing, vec!["phone", "email"]);
        assert_eq!(
            contact.missing_labels(&validation.missing),
            vec!["Phone number", "Email address"]
        );
    }

    #[test]
    fn validate_normalizes_accepted_fields() {
        let blueprint = JourneyBlueprint::standard();
        let loan = blueprint.step(8).expect("loan amount step");
        let mut fields = FieldMap::new();
        fields.insert("amount".to_string(), json!("5 lakhs"));
        fields.insert("unexpected".to_string(), json!("dropped"));

        let validation = loan.validate(&fields);

        assert!(validation.is_complete());
        assert_eq!(validation.validated["amount"], json!(500_000));
        assert!(!validation.validated.contains_key("unexpected"));
    }
}
