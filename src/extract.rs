//! Field extraction for a single delimited record
//!
//! Extraction never fails: a record that cannot be split into the expected
//! fields degrades to placeholder values and is flagged as malformed, so one
//! bad line never aborts a worker.

use anyhow::{anyhow, Result};

/// Period used when the date field is missing or unparseable
pub const UNKNOWN_PERIOD: &str = "--";

/// Fields derived from one record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordFields {
    /// Normalized full identity (whitespace stripped)
    pub full_id: String,
    /// Short identity used for the most-frequent ranking
    pub short_id: String,
    /// Period bucket for the histogram
    pub period: String,
    pub malformed: bool,
}

impl RecordFields {
    /// Placeholder values for a record that could not be parsed
    pub fn placeholder() -> Self {
        Self {
            full_id: String::new(),
            short_id: String::new(),
            period: UNKNOWN_PERIOD.to_string(),
            malformed: true,
        }
    }
}

/// Maps one raw record to the fields the aggregation needs.
///
/// Implementations are shared by every worker, so they must be pure.
pub trait RecordExtractor: Send + Sync {
    fn extract(&self, record: &str) -> RecordFields;
}

impl<F> RecordExtractor for F
where
    F: Fn(&str) -> RecordFields + Send + Sync,
{
    fn extract(&self, record: &str) -> RecordFields {
        self(record)
    }
}

/// Positions of the interesting fields within a split record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub separator: char,
    /// Zero-based index of the `LAST, FIRST MIDDLE` name field
    pub identity_field: usize,
    /// Zero-based index of the `MMDDYYYY` date field
    pub period_field: usize,
}

impl Default for FieldLayout {
    fn default() -> Self {
        Self {
            separator: '|',
            identity_field: 7,
            period_field: 13,
        }
    }
}

impl FieldLayout {
    pub fn validate(&self) -> Result<()> {
        if self.identity_field == self.period_field {
            return Err(anyhow!(
                "identity field and period field must differ (both are {})",
                self.identity_field
            ));
        }
        if self.separator == '\n' || self.separator == '\r' {
            return Err(anyhow!("separator cannot be a line terminator"));
        }
        Ok(())
    }
}

/// Extractor for separator-delimited contribution-style records
#[derive(Debug, Clone, Default)]
pub struct DelimitedExtractor {
    layout: FieldLayout,
}

impl DelimitedExtractor {
    pub fn new(layout: FieldLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }
}

impl RecordExtractor for DelimitedExtractor {
    fn extract(&self, record: &str) -> RecordFields {
        let fields: Vec<&str> = record.split(self.layout.separator).collect();
        let (Some(name), Some(date)) = (
            fields.get(self.layout.identity_field),
            fields.get(self.layout.period_field),
        ) else {
            return RecordFields::placeholder();
        };

        let name = name.trim();
        let period = period_from_date(date.trim());

        RecordFields {
            full_id: name.chars().filter(|c| !c.is_whitespace()).collect(),
            short_id: short_identity(name),
            malformed: period.is_none(),
            period: period.unwrap_or(UNKNOWN_PERIOD).to_string(),
        }
    }
}

/// First given name from `LAST, FIRST MIDDLE`; falls back to the first token
fn short_identity(name: &str) -> String {
    let given = match name.find(", ") {
        Some(idx) => &name[idx + 2..],
        None => name,
    };
    given
        .split_whitespace()
        .next()
        .unwrap_or("")
        .replace(',', "")
}

/// Leading `MM` of an eight-character `MMDDYYYY` date; the characters
/// themselves are not checked
fn period_from_date(date: &str) -> Option<&str> {
    if date.len() == 8 && date.is_char_boundary(2) {
        Some(&date[..2])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, date: &str) -> String {
        let mut fields = vec!["C00000000", "N", "M2", "P", "201901", "15", "IND"];
        fields.push(name);
        fields.extend(["CITY", "ST", "00000", "EMPLOYER", "JOB"]);
        fields.push(date);
        fields.extend(["100", "", "ID"]);
        fields.join("|")
    }

    #[test]
    fn test_extracts_name_and_month() {
        let extractor = DelimitedExtractor::default();
        let fields = extractor.extract(&record("SMITH, JOHN A", "01152019"));

        assert_eq!(fields.full_id, "SMITH,JOHNA");
        assert_eq!(fields.short_id, "JOHN");
        assert_eq!(fields.period, "01");
        assert!(!fields.malformed);
    }

    #[test]
    fn test_trailing_comma_in_given_name_is_stripped() {
        let extractor = DelimitedExtractor::default();
        let fields = extractor.extract(&record("DOE, JANE, JR", "12312019"));
        assert_eq!(fields.short_id, "JANE");
        assert_eq!(fields.period, "12");
    }

    #[test]
    fn test_name_without_comma_uses_first_token() {
        let extractor = DelimitedExtractor::default();
        let fields = extractor.extract(&record("ACME PAC", "03012019"));
        assert_eq!(fields.short_id, "ACME");
        assert_eq!(fields.full_id, "ACMEPAC");
    }

    #[test]
    fn test_short_record_degrades_to_placeholder() {
        let extractor = DelimitedExtractor::default();
        let fields = extractor.extract("only|three|fields");
        assert_eq!(fields, RecordFields::placeholder());

        let fields = extractor.extract("");
        assert!(fields.malformed);
        assert_eq!(fields.period, UNKNOWN_PERIOD);
    }

    #[test]
    fn test_bad_date_keeps_identity() {
        let extractor = DelimitedExtractor::default();
        let fields = extractor.extract(&record("SMITH, JOHN", "2019"));
        assert_eq!(fields.short_id, "JOHN");
        assert_eq!(fields.period, UNKNOWN_PERIOD);
        assert!(fields.malformed);
    }

    #[test]
    fn test_period_is_taken_from_any_eight_character_date() {
        let extractor = DelimitedExtractor::default();

        let fields = extractor.extract(&record("SMITH, JOHN", "ab012020"));
        assert_eq!(fields.period, "ab");
        assert!(!fields.malformed);

        let fields = extractor.extract(&record("SMITH, JOHN", "0101202"));
        assert_eq!(fields.period, UNKNOWN_PERIOD);
        assert!(fields.malformed);

        // Eight bytes, but the split would land inside a character
        let fields = extractor.extract(&record("SMITH, JOHN", "1é01202"));
        assert_eq!(fields.period, UNKNOWN_PERIOD);
        assert!(fields.malformed);
    }

    #[test]
    fn test_custom_layout() {
        let extractor = DelimitedExtractor::new(FieldLayout {
            separator: ',',
            identity_field: 0,
            period_field: 1,
        });
        let fields = extractor.extract("\"Lovelace; Ada\",07041843");
        assert_eq!(fields.period, "07");
        assert_eq!(fields.short_id, "\"Lovelace;");
    }

    #[test]
    fn test_layout_validation() {
        assert!(FieldLayout::default().validate().is_ok());
        let layout = FieldLayout {
            separator: '|',
            identity_field: 3,
            period_field: 3,
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_closure_extractor() {
        let extractor = |record: &str| RecordFields {
            full_id: record.to_string(),
            short_id: record.to_string(),
            period: "x".to_string(),
            malformed: false,
        };
        assert_eq!(extractor.extract("abc").full_id, "abc");
    }
}
