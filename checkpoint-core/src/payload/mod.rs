//! Barcode payload parsing.
//!
//! National ID barcodes carry an `@`-delimited field list. Two layouts are
//! understood: the full nine-slot record and a legacy layout where only the
//! document number in slot 4 is reliable.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

const DELIMITER: char = '@';
const DOCUMENT_SLOT: usize = 4;
const MIN_FULL_FIELDS: usize = 8;

static DOCUMENT_NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{7,9}$").expect("document number regex should compile")
});

/// Why a payload could not be turned into an identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRejection {
    #[error("payload has no field delimiter")]
    NoDelimiter,
    #[error("payload has {found} fields, full record needs at least {MIN_FULL_FIELDS}")]
    TooFewFields { found: usize },
    #[error("payload has no document number field")]
    MissingDniField,
    #[error("document number {0:?} is not 7 to 9 digits")]
    InvalidDocumentNumber(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// All nine slots; fewer than eight fields is a rejection.
    #[default]
    Full,
    /// Only slot 4 is read.
    Minimal,
}

/// Validated 7 to 9 ASCII digit document number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentNumber(String);

impl DocumentNumber {
    pub fn parse(value: &str) -> Result<Self, ParseRejection> {
        let trimmed = value.trim();
        if DOCUMENT_NUMBER_PATTERN.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ParseRejection::InvalidDocumentNumber(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Thousands-grouped rendering used on operator screens, e.g. `12.345.678`.
    pub fn grouped(&self) -> String {
        let digits = self.0.as_bytes();
        let mut out = String::with_capacity(digits.len() + 2);
        for (idx, digit) in digits.iter().enumerate() {
            if idx > 0 && (digits.len() - idx) % 3 == 0 {
                out.push('.');
            }
            out.push(char::from(*digit));
        }
        out
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity fields extracted from one payload. Built only by [`parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    document_type: String,
    surname: String,
    given_names: String,
    sex: String,
    document_number: DocumentNumber,
    issue_variant: String,
    birth_date: String,
    issue_date: String,
    procedure_number: String,
    raw: String,
}

impl IdentityRecord {
    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    pub fn surname(&self) -> &str {
        &self.surname
    }

    pub fn given_names(&self) -> &str {
        &self.given_names
    }

    pub fn sex(&self) -> &str {
        &self.sex
    }

    pub fn document_number(&self) -> &DocumentNumber {
        &self.document_number
    }

    pub fn issue_variant(&self) -> &str {
        &self.issue_variant
    }

    pub fn birth_date(&self) -> &str {
        &self.birth_date
    }

    pub fn issue_date(&self) -> &str {
        &self.issue_date
    }

    pub fn procedure_number(&self) -> &str {
        &self.procedure_number
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_names, self.surname)
            .trim()
            .to_string()
    }
}

/// Result of parsing in either mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Record(IdentityRecord),
    DocumentOnly(DocumentNumber),
}

impl Parsed {
    pub fn document_number(&self) -> &DocumentNumber {
        match self {
            Parsed::Record(record) => record.document_number(),
            Parsed::DocumentOnly(number) => number,
        }
    }
}

fn split_fields(raw: &str) -> Result<Vec<&str>, ParseRejection> {
    if !raw.contains(DELIMITER) {
        return Err(ParseRejection::NoDelimiter);
    }
    Ok(raw.split(DELIMITER).map(str::trim).collect())
}

/// Parses a full nine-slot record.
pub fn parse(raw: &str) -> Result<IdentityRecord, ParseRejection> {
    let fields = split_fields(raw)?;
    if fields.len() < MIN_FULL_FIELDS {
        return Err(ParseRejection::TooFewFields {
            found: fields.len(),
        });
    }

    let slot = |idx: usize| fields.get(idx).copied().unwrap_or_default().to_string();
    let document_number = DocumentNumber::parse(fields[DOCUMENT_SLOT])?;

    Ok(IdentityRecord {
        document_type: slot(0),
        surname: slot(1),
        given_names: slot(2),
        sex: slot(3),
        document_number,
        issue_variant: slot(5),
        birth_date: slot(6),
        issue_date: slot(7),
        procedure_number: slot(8),
        raw: raw.to_string(),
    })
}

/// Reads only the document number in slot 4 (legacy payloads).
pub fn parse_document_number(raw: &str) -> Result<DocumentNumber, ParseRejection> {
    let fields = split_fields(raw)?;
    let value = fields
        .get(DOCUMENT_SLOT)
        .ok_or(ParseRejection::MissingDniField)?;
    DocumentNumber::parse(value)
}

/// Parses in the requested mode.
pub fn parse_with(raw: &str, mode: ParseMode) -> Result<Parsed, ParseRejection> {
    match mode {
        ParseMode::Full => parse(raw).map(Parsed::Record),
        ParseMode::Minimal => parse_document_number(raw).map(Parsed::DocumentOnly),
    }
}

/// Full parse, falling back to slot-4 extraction when the payload is a
/// shorter legacy layout.
pub fn parse_lenient(raw: &str) -> Result<Parsed, ParseRejection> {
    match parse(raw) {
        Ok(record) => Ok(Parsed::Record(record)),
        Err(ParseRejection::TooFewFields { .. }) => {
            parse_document_number(raw).map(Parsed::DocumentOnly)
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "@DOE@JOHN@M@12345678@A@01/01/1990@01/01/2020@999";

    #[test]
    fn full_record_from_sample() {
        let record = parse(SAMPLE).unwrap();
        assert_eq!(record.document_number().as_str(), "12345678");
        assert_eq!(record.surname(), "DOE");
        assert_eq!(record.given_names(), "JOHN");
        assert_eq!(record.sex(), "M");
        assert_eq!(record.issue_variant(), "A");
        assert_eq!(record.birth_date(), "01/01/1990");
        assert_eq!(record.issue_date(), "01/01/2020");
        assert_eq!(record.procedure_number(), "999");
        assert_eq!(record.document_type(), "");
        assert_eq!(record.raw(), SAMPLE);
    }

    #[test]
    fn fields_are_trimmed() {
        let record = parse("00 @ DOE @ JOHN @M@ 12345678 @A@x@y").unwrap();
        assert_eq!(record.document_type(), "00");
        assert_eq!(record.surname(), "DOE");
        assert_eq!(record.document_number().as_str(), "12345678");
        assert_eq!(record.procedure_number(), "");
    }

    #[test]
    fn short_payloads_never_yield_a_record() {
        let mut payload = String::from("a");
        for count in 1..MIN_FULL_FIELDS {
            assert!(matches!(
                parse(&payload),
                Err(ParseRejection::NoDelimiter | ParseRejection::TooFewFields { .. })
            ), "{count} fields accepted");
            payload.push_str("@12345678");
        }
    }

    #[test]
    fn document_number_pattern_is_enforced() {
        for bad in [
            "",
            "123456",
            "1234567890",
            "12a45678",
            "12.345.678",
            "١٢٣٤٥٦٧٨",
            "１２３４５６７８",
        ] {
            let payload = format!("@DOE@JOHN@M@{bad}@A@01/01/1990@01/01/2020@999");
            assert!(
                matches!(parse(&payload), Err(ParseRejection::InvalidDocumentNumber(_))),
                "{bad:?} accepted"
            );
        }
        for good in ["1234567", "123456789"] {
            assert!(DocumentNumber::parse(good).is_ok());
        }
        assert!(DocumentNumber::parse("٣٠١١١٢٢٢").is_err());
    }

    #[test]
    fn missing_delimiter() {
        assert_eq!(parse("12345678"), Err(ParseRejection::NoDelimiter));
        assert_eq!(
            parse_document_number("12345678"),
            Err(ParseRejection::NoDelimiter)
        );
    }

    #[test]
    fn minimal_mode_reads_slot_four() {
        assert_eq!(
            parse_document_number("x@y@z@w@ 30111222 ").unwrap().as_str(),
            "30111222"
        );
        assert_eq!(
            parse_document_number("x@y@z"),
            Err(ParseRejection::MissingDniField)
        );
    }

    #[test]
    fn lenient_falls_back_for_legacy_layout() {
        let parsed = parse_lenient("x@y@z@w@30111222").unwrap();
        assert_eq!(parsed, Parsed::DocumentOnly(DocumentNumber("30111222".into())));

        let parsed = parse_lenient(SAMPLE).unwrap();
        assert!(matches!(parsed, Parsed::Record(_)));
    }

    #[test]
    fn parse_is_deterministic() {
        assert_eq!(parse(SAMPLE), parse(SAMPLE));
        assert_eq!(
            parse_with(SAMPLE, ParseMode::Minimal).unwrap().document_number(),
            parse_with(SAMPLE, ParseMode::Full).unwrap().document_number()
        );
    }

    #[test]
    fn grouped_rendering() {
        assert_eq!(DocumentNumber::parse("12345678").unwrap().grouped(), "12.345.678");
        assert_eq!(DocumentNumber::parse("1234567").unwrap().grouped(), "1.234.567");
        assert_eq!(DocumentNumber::parse("123456789").unwrap().grouped(), "123.456.789");
    }
}
