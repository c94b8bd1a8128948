use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static PAN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").expect("Failed to compile PAN regex"));

/// One trainee's enrollment and certification data.
///
/// Field names follow the JSON the records backend produces (`srNo`, `panNumber`, ...),
/// so exports of that backend can be loaded as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub sr_no: u32,
    pub name: String,
    pub pan_number: String,
    #[serde(default)]
    pub lic_regd_number: String,
    #[serde(default)]
    pub branch: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("name is empty")]
    EmptyName,
    #[error("invalid PAN '{0}' (expected format ABCDE1234F)")]
    InvalidPan(String),
    #[error("sequence number must be positive")]
    ZeroSequence,
    #[error("training ends ({end}) before it starts ({start})")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

pub fn is_valid_pan(pan: &str) -> bool {
    PAN_PATTERN.is_match(pan)
}

impl StudentRecord {
    /// Human-readable label for progress reporting.
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() {
            self.pan_number.trim()
        } else {
            name
        }
    }

    /// Identifier used in error lists: the PAN when present, otherwise the sequence number.
    pub fn identifier(&self) -> String {
        let pan = self.pan_number.trim();
        if pan.is_empty() {
            format!("#{}", self.sr_no)
        } else {
            pan.to_string()
        }
    }

    /// Certificate reference printed on the document, e.g. `BS0042`.
    pub fn certificate_ref(&self) -> String {
        format!("BS{:04}", self.sr_no)
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        if self.name.trim().is_empty() {
            return Err(RecordError::EmptyName);
        }
        if !is_valid_pan(&self.pan_number) {
            return Err(RecordError::InvalidPan(self.pan_number.clone()));
        }
        if self.sr_no == 0 {
            return Err(RecordError::ZeroSequence);
        }
        if self.end_date < self.start_date {
            return Err(RecordError::EndBeforeStart {
                start: self.start_date,
                end: self.end_date,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StudentRecord {
        StudentRecord {
            sr_no: 7,
            name: "Asha Verma".to_string(),
            pan_number: "ABCDE1234F".to_string(),
            lic_regd_number: "LIC-991".to_string(),
            branch: "Jaipur".to_string(),
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2023, 1, 5).unwrap(),
        }
    }

    #[test]
    fn test_pan_pattern() {
        assert!(is_valid_pan("ABCDE1234F"));
        assert!(!is_valid_pan("abcde1234f"));
        assert!(!is_valid_pan("ABCD1234F"));
        assert!(!is_valid_pan("ABCDE12345"));
        assert!(!is_valid_pan(" ABCDE1234F"));
    }

    #[test]
    fn test_validate_accepts_good_record() {
        assert_eq!(record().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut r = record();
        r.name = "   ".to_string();
        assert_eq!(r.validate(), Err(RecordError::EmptyName));

        let mut r = record();
        r.pan_number = "XYZ".to_string();
        assert!(matches!(r.validate(), Err(RecordError::InvalidPan(_))));

        let mut r = record();
        r.sr_no = 0;
        assert_eq!(r.validate(), Err(RecordError::ZeroSequence));

        let mut r = record();
        r.end_date = NaiveDate::from_ymd_opt(2022, 12, 31).unwrap();
        assert!(matches!(r.validate(), Err(RecordError::EndBeforeStart { .. })));
    }

    #[test]
    fn test_certificate_ref_is_zero_padded() {
        assert_eq!(record().certificate_ref(), "BS0007");
        let mut r = record();
        r.sr_no = 12345;
        assert_eq!(r.certificate_ref(), "BS12345");
    }

    #[test]
    fn test_labels_fall_back() {
        let mut r = record();
        r.name.clear();
        assert_eq!(r.display_name(), "ABCDE1234F");
        r.pan_number.clear();
        assert_eq!(r.identifier(), "#7");
    }

    #[test]
    fn test_deserializes_backend_json() {
        let json = r#"{"srNo":3,"name":"Vik","panNumber":"BBBBB2222B","licRegdNumber":"L1",
            "branch":"Ajmer","startDate":"2023-02-01","endDate":"2023-02-05"}"#;
        let r: StudentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.sr_no, 3);
        assert_eq!(r.pan_number, "BBBBB2222B");
        assert_eq!(r.end_date, NaiveDate::from_ymd_opt(2023, 2, 5).unwrap());
    }
}
