//! Tagged registry of field normalizers.
//!
//! Every collected field declares a [`FieldKind`]. The kind decides how a raw answer is
//! located inside free text ([`FieldKind::locate`]) and how a located value is cleaned up into
//! its canonical form ([`FieldKind::normalize`]).

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Name,
    Address,
    City,
    Date,
    Phone,
    Email,
    Amount,
    Integer,
    Pincode,
    Ifsc,
    AccountNumber,
    YesNo,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("value is empty")]
    Empty,
    #[error("'{value}' is not a valid {kind}")]
    Invalid { kind: &'static str, value: String },
}

impl FieldKind {
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Name => "name",
            FieldKind::Address => "address",
            FieldKind::City => "city",
            FieldKind::Date => "date",
            FieldKind::Phone => "phone number",
            FieldKind::Email => "email address",
            FieldKind::Amount => "amount",
            FieldKind::Integer => "number",
            FieldKind::Pincode => "PIN code",
            FieldKind::Ifsc => "IFSC code",
            FieldKind::AccountNumber => "account number",
            FieldKind::YesNo => "yes/no answer",
        }
    }

    /// Kinds that can be picked out of a longer answer by pattern alone.
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            FieldKind::Date
                | FieldKind::Phone
                | FieldKind::Email
                | FieldKind::Amount
                | FieldKind::Integer
                | FieldKind::Pincode
                | FieldKind::Ifsc
                | FieldKind::AccountNumber
        )
    }

    /// Find the substring of `text` that holds a value of this kind.
    pub fn locate<'t>(&self, text: &'t str) -> Option<&'t str> {
        let found = match self {
            FieldKind::Date => date_candidates().iter().find_map(|re| re.find(text)),
            FieldKind::Phone => phone_regex().find(text),
            FieldKind::Email => email_regex().find(text),
            FieldKind::Amount => amount_regex().find(text),
            FieldKind::Integer => integer_regex()
                .find(text)
                .or_else(|| number_words_regex().find(text)),
            FieldKind::Pincode => pincode_regex().find(text),
            FieldKind::Ifsc => ifsc_regex().find(text),
            FieldKind::AccountNumber => account_regex().find(text),
            _ => None,
        };
        found.map(|m| m.as_str())
    }

    pub fn normalize(&self, value: &Value) -> Result<Value, NormalizeError> {
        let raw = match value {
            Value::Null => return Err(NormalizeError::Empty),
            Value::String(text) => text.trim().to_string(),
            Value::Bool(flag) if *self == FieldKind::YesNo => return Ok(json!(flag)),
            Value::Number(number) => number.to_string(),
            other => other.to_string(),
        };
        if raw.is_empty() {
            return Err(NormalizeError::Empty);
        }

        let invalid = || NormalizeError::Invalid {
            kind: self.label(),
            value: raw.clone(),
        };

        match self {
            FieldKind::Text | FieldKind::Address => Ok(json!(collapse_whitespace(&raw))),
            FieldKind::Name | FieldKind::City => normalize_name(&raw).map(Value::from).ok_or_else(invalid),
            FieldKind::Date => normalize_date(&raw).map(Value::from).ok_or_else(invalid),
            FieldKind::Phone => normalize_phone(&raw).map(Value::from).ok_or_else(invalid),
            FieldKind::Email => email_regex()
                .find(&raw)
                .map(|m| json!(m.as_str().to_ascii_lowercase()))
                .ok_or_else(invalid),
            FieldKind::Amount => normalize_amount(&raw).map(Value::from).ok_or_else(invalid),
            FieldKind::Integer => normalize_integer(&raw).map(Value::from).ok_or_else(invalid),
            FieldKind::Pincode => pincode_regex()
                .find(&raw)
                .map(|m| json!(m.as_str()))
                .ok_or_else(invalid),
            FieldKind::Ifsc => ifsc_regex()
                .find(&raw)
                .map(|m| json!(m.as_str().to_ascii_uppercase()))
                .ok_or_else(invalid),
            FieldKind::AccountNumber => account_regex()
                .find(&raw)
                .map(|m| json!(m.as_str()))
                .ok_or_else(invalid),
            FieldKind::YesNo => normalize_yes_no(&raw).map(Value::from).ok_or_else(invalid),
        }
    }
}

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex compiles"))
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(
        &RE,
        r"\+91[\s-]?[6-9]\d{4}[\s-]?\d{5}\b|\b0?[6-9]\d{4}[\s-]?\d{5}\b",
    )
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
}

fn amount_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(
        &RE,
        r"(?i)\d[\d,]*(?:\.\d+)?\s*(?:k\b|thousand\b|lakhs?\b|lacs?\b|crores?\b|cr\b)?",
    )
}

fn integer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"\b\d{1,4}\b")
}

/// A run of spelled-out numbers such as "three" or "thirty six".
fn number_words_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let word = "(?:sixty|fifty|forty|thirty|twenty|eighteen|fifteen|twelve|eleven|ten|nine|eight|seven|six|five|four|three|two|one)";
        Regex::new(&format!(r"(?i)\b{word}(?:[\s-]+{word})*\b")).expect("static regex compiles")
    })
}

fn pincode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"\b\d{6}\b")
}

fn ifsc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"(?i)\b[a-z]{4}0[a-z0-9]{6}\b")
}

fn account_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"\b\d{9,18}\b")
}

fn ordinal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b")
}

fn date_candidates() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"\b\d{4}-\d{2}-\d{2}\b",
            r"\b\d{1,2}[/-]\d{1,2}[/-]\d{4}\b",
            r"(?i)\b\d{1,2}(?:st|nd|rd|th)?\s+[a-z]+,?\s+\d{4}\b",
            r"(?i)\b[a-z]+\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}\b",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("static regex compiles"))
        .collect()
    })
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_name(raw: &str) -> Option<String> {
    let cleaned = collapse_whitespace(raw.trim_matches(|c: char| c == ',' || c == '.'));
    let valid = cleaned.chars().any(char::is_alphabetic)
        && cleaned
            .chars()
            .all(|c| c.is_alphabetic() || matches!(c, ' ' | '.' | '\'' | '-'));
    if !valid {
        return None;
    }

    let titled = cleaned
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    Some(titled)
}

fn normalize_date(raw: &str) -> Option<String> {
    const FORMATS: [&str; 8] = [
        "%Y-%m-%d",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%d %B %Y",
        "%d %b %Y",
        "%B %d %Y",
        "%b %d %Y",
        "%Y/%m/%d",
    ];

    let candidate = date_candidates()
        .iter()
        .find_map(|re| re.find(raw))
        .map(|m| m.as_str())
        .unwrap_or(raw);
    let cleaned = ordinal_regex().replace_all(candidate, "$1").replace(',', "");
    let cleaned = collapse_whitespace(&cleaned);

    FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
}

fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let local = match digits.len() {
        10 => digits.as_str(),
        11 if digits.starts_with('0') => &digits[1..],
        12 if digits.starts_with("91") => &digits[2..],
        _ => return None,
    };
    match local.chars().next() {
        Some('6'..='9') => Some(local.to_string()),
        _ => None,
    }
}

fn normalize_amount(raw: &str) -> Option<u64> {
    let lowered = raw.to_ascii_lowercase();
    let found = amount_regex().find(&lowered)?.as_str();
    let number: String = found
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(|c| *c != ',')
        .collect();
    let value: f64 = number.parse().ok()?;
    let unit = found[found.len().min(number_len(found))..].trim();
    let multiplier = match unit {
        "k" | "thousand" => 1_000.0,
        "lakh" | "lakhs" | "lac" | "lacs" => 100_000.0,
        "crore" | "crores" | "cr" => 10_000_000.0,
        _ => 1.0,
    };
    let total = value * multiplier;
    (total.is_finite() && total >= 0.0).then(|| total.round() as u64)
}

fn number_len(found: &str) -> usize {
    found
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == ',' || *c == '.'))
        .map(|(index, _)| index)
        .unwrap_or(found.len())
}

fn normalize_integer(raw: &str) -> Option<u64> {
    if let Some(found) = integer_regex().find(raw) {
        return found.as_str().parse().ok();
    }

    let mut total = 0u64;
    let mut matched = false;
    for word in raw
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|word| !word.is_empty())
    {
        if let Some(value) = number_word(word) {
            total += value;
            matched = true;
        }
    }
    matched.then_some(total)
}

fn number_word(word: &str) -> Option<u64> {
    let value = match word {
        "one" | "a" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "fifteen" => 15,
        "eighteen" => 18,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        _ => return None,
    };
    Some(value)
}

fn normalize_yes_no(raw: &str) -> Option<bool> {
    let lowered = raw.to_ascii_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphabetic() && c != '\'')
        .filter(|word| !word.is_empty())
        .collect();

    const NEGATIVE: [&str; 7] = ["no", "not", "don't", "disagree", "decline", "reject", "nope"];
    const POSITIVE: [&str; 7] = ["yes", "agree", "accept", "sure", "ok", "okay", "y"];

    if words.iter().any(|word| NEGATIVE.contains(word)) {
        Some(false)
    } else if words.iter().any(|word| POSITIVE.contains(word)) {
        Some(true)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(kind: FieldKind, raw: &str) -> Result<Value, NormalizeError> {
        kind.normalize(&json!(raw))
    }

    #[test]
    fn names_are_title_cased() {
        assert_eq!(normalize(FieldKind::Name, "priya  sharma").unwrap(), json!("Priya Sharma"));
        assert!(normalize(FieldKind::Name, "12345").is_err());
    }

    #[test]
    fn dates_accept_common_spellings() {
        assert_eq!(normalize(FieldKind::Date, "1990-01-15").unwrap(), json!("1990-01-15"));
        assert_eq!(normalize(FieldKind::Date, "15/01/1990").unwrap(), json!("1990-01-15"));
        assert_eq!(
            normalize(FieldKind::Date, "I was born on 15 January 1990").unwrap(),
            json!("1990-01-15")
        );
        assert_eq!(
            normalize(FieldKind::Date, "January 15th, 1990").unwrap(),
            json!("1990-01-15")
        );
        assert!(normalize(FieldKind::Date, "sometime in spring").is_err());
    }

    #[test]
    fn phones_strip_country_prefix() {
        assert_eq!(normalize(FieldKind::Phone, "+91 98765 43210").unwrap(), json!("9876543210"));
        assert_eq!(normalize(FieldKind::Phone, "09876543210").unwrap(), json!("9876543210"));
        assert!(normalize(FieldKind::Phone, "12345").is_err());
        assert!(normalize(FieldKind::Phone, "1234567890").is_err());
    }

    #[test]
    fn amounts_understand_indian_units() {
        assert_eq!(normalize(FieldKind::Amount, "75,000").unwrap(), json!(75_000));
        assert_eq!(normalize(FieldKind::Amount, "5 lakhs").unwrap(), json!(500_000));
        assert_eq!(normalize(FieldKind::Amount, "1.5 crore").unwrap(), json!(15_000_000));
        assert_eq!(normalize(FieldKind::Amount, "50k").unwrap(), json!(50_000));
        assert!(normalize(FieldKind::Amount, "a lot").is_err());
    }

    #[test]
    fn integers_accept_digits_and_words() {
        assert_eq!(normalize(FieldKind::Integer, "36 months").unwrap(), json!(36));
        assert_eq!(normalize(FieldKind::Integer, "three years").unwrap(), json!(3));
        assert_eq!(normalize(FieldKind::Integer, "thirty six").unwrap(), json!(36));
    }

    #[test]
    fn bank_identifiers_are_validated() {
        assert_eq!(normalize(FieldKind::Ifsc, "hdfc0001234").unwrap(), json!("HDFC0001234"));
        assert!(normalize(FieldKind::Ifsc, "HDFC1234").is_err());
        assert_eq!(
            normalize(FieldKind::AccountNumber, "A/C 123456789012").unwrap(),
            json!("123456789012")
        );
        assert_eq!(normalize(FieldKind::Pincode, "Bengaluru 560001").unwrap(), json!("560001"));
    }

    #[test]
    fn consent_reads_negations_first() {
        assert_eq!(normalize(FieldKind::YesNo, "Yes, I agree").unwrap(), json!(true));
        assert_eq!(normalize(FieldKind::YesNo, "I do not agree").unwrap(), json!(false));
        assert!(normalize(FieldKind::YesNo, "maybe later").is_err());
        assert_eq!(FieldKind::YesNo.normalize(&json!(true)).unwrap(), json!(true));
    }

    #[test]
    fn empty_values_are_rejected() {
        assert_eq!(FieldKind::Text.normalize(&Value::Null), Err(NormalizeError::Empty));
        assert_eq!(normalize(FieldKind::Text, "   "), Err(NormalizeError::Empty));
    }

    #[test]
    fn locate_picks_patterns_out_of_sentences() {
        let text = "9876543210, priya@email.com";
        assert_eq!(FieldKind::Phone.locate(text), Some("9876543210"));
        assert_eq!(FieldKind::Email.locate(text), Some("priya@email.com"));
        assert_eq!(FieldKind::Text.locate(text), None);
    }

    #[test]
    fn integer_locate_falls_back_to_number_words() {
        assert_eq!(FieldKind::Integer.locate("about 4 years"), Some("4"));
        assert_eq!(FieldKind::Integer.locate("for three years"), Some("three"));
        assert_eq!(FieldKind::Integer.locate("Thirty six months"), Some("Thirty six"));
        assert_eq!(FieldKind::Integer.locate("a few years at One97"), None);
    }
}
