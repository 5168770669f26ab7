use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::VerificationOutcome;
use crate::processing::text_correction::{similarity, token_set_similarity, token_sort_similarity};
use crate::utils::VerifierError;

const RECORD_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%d-%b-%Y"];
const DEFAULT_NAME_THRESHOLD: f64 = 70.0;

/// Applicant data submitted alongside the card, as stored by the intake system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicantRecord {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub middle_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(rename = "dateOfbirth", default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub gender: String,
    /// Base64 encoded 12-digit number.
    #[serde(rename = "aadhar_number", default)]
    pub aadhaar_number: String,
}

impl ApplicantRecord {
    pub fn from_json_file(path: &Path) -> Result<Self, VerifierError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn full_name(&self) -> String {
        [&self.first_name, &self.middle_name, &self.last_name]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn birth_date(&self) -> Option<NaiveDate> {
        let text = self.date_of_birth.trim();
        RECORD_DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
    }

    /// The decoded number, digits only. Falls back to the raw value when it
    /// is not valid base64.
    pub fn decoded_aadhaar(&self) -> Option<String> {
        let raw = self.aadhaar_number.trim();
        if raw.is_empty() {
            return None;
        }
        let text = general_purpose::STANDARD
            .decode(raw)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| raw.to_string());
        let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
        (!digits.is_empty()).then_some(digits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordDecision {
    Accept,
    #[serde(rename = "Manual Review")]
    ManualReview,
}

/// Field-by-field agreement between a card and an applicant record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordComparison {
    pub name_score: f64,
    pub name_match: bool,
    pub dob_match: bool,
    pub gender_match: bool,
    pub aadhaar_match: bool,
    pub decision: RecordDecision,
}

pub struct RecordMatcher {
    name_threshold: f64,
}

impl Default for RecordMatcher {
    fn default() -> Self {
        RecordMatcher {
            name_threshold: DEFAULT_NAME_THRESHOLD,
        }
    }
}

impl RecordMatcher {
    pub fn new(name_threshold: f64) -> Self {
        RecordMatcher { name_threshold }
    }

    pub fn compare(&self, outcome: &VerificationOutcome, record: &ApplicantRecord) -> RecordComparison {
        let expected_name = record.full_name();
        let name_score = match outcome.extracted_name.as_deref() {
            Some(name) if !expected_name.is_empty() => {
                let score = similarity(name, &expected_name)
                    .max(token_sort_similarity(name, &expected_name))
                    .max(token_set_similarity(name, &expected_name));
                (score * 100.0).round() / 100.0
            }
            _ => 0.0,
        };
        let name_match = name_score >= self.name_threshold;

        let dob_match = match (outcome.extracted_dob.as_deref(), record.birth_date()) {
            (Some(extracted), Some(expected)) => NaiveDate::parse_from_str(extracted, "%d-%b-%Y")
                .map(|date| date == expected)
                .unwrap_or(false),
            _ => false,
        };

        let gender_match = match outcome.extracted_gender.as_deref() {
            Some(extracted) => {
                let expected = Self::canonical_gender(&record.gender);
                !expected.is_empty() && Self::canonical_gender(extracted) == expected
            }
            None => false,
        };

        let aadhaar_match = match (outcome.extracted_aadhaar.as_deref(), record.decoded_aadhaar()) {
            (Some(extracted), Some(expected)) => extracted == expected,
            _ => false,
        };

        let decision = if name_match && dob_match && gender_match && aadhaar_match {
            RecordDecision::Accept
        } else {
            RecordDecision::ManualReview
        };

        RecordComparison {
            name_score,
            name_match,
            dob_match,
            gender_match,
            aadhaar_match,
            decision,
        }
    }

    fn canonical_gender(value: &str) -> String {
        match value.trim().to_lowercase().as_str() {
            "m" | "male" => "male".to_string(),
            "f" | "female" => "female".to_string(),
            "t" | "transgender" | "other" => "other".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, Status};

    fn outcome() -> VerificationOutcome {
        VerificationOutcome {
            extracted_name: Some("Shubham Avinash Sawant".to_string()),
            extracted_gender: Some("Male".to_string()),
            extracted_dob: Some("15-Jun-1998".to_string()),
            extracted_aadhaar: Some("123412341234".to_string()),
            aadhaar_refnum: None,
            decision: Decision::Verified,
            status: Status::Success,
            ocr_confidence: 90.0,
        }
    }

    fn record() -> ApplicantRecord {
        serde_json::from_str(
            r#"{
                "first_name": "Shubham",
                "middle_name": "Avinash",
                "last_name": "Sawant",
                "dateOfbirth": "1998-06-15",
                "gender": "male",
                "aadhar_number": "MTIzNDEyMzQxMjM0"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_matching_record_is_accepted() {
        let comparison = RecordMatcher::default().compare(&outcome(), &record());
        assert_eq!(comparison.name_score, 100.0);
        assert!(comparison.dob_match && comparison.gender_match && comparison.aadhaar_match);
        assert_eq!(comparison.decision, RecordDecision::Accept);
    }

    #[test]
    fn test_name_order_and_typos_tolerated() {
        let mut card = outcome();
        card.extracted_name = Some("Sawant Shubam Avinash".to_string());
        let comparison = RecordMatcher::default().compare(&card, &record());
        assert!(comparison.name_match, "score {}", comparison.name_score);
    }

    #[test]
    fn test_card_without_middle_name_matches() {
        let mut card = outcome();
        card.extracted_name = Some("Shubham Sawant".to_string());
        let comparison = RecordMatcher::default().compare(&card, &record());
        assert_eq!(comparison.name_score, 100.0);
        assert!(comparison.name_match);
        assert_eq!(comparison.decision, RecordDecision::Accept);
    }

    #[test]
    fn test_mismatched_number_needs_review() {
        let mut applicant = record();
        applicant.aadhaar_number = general_purpose::STANDARD.encode("999999999999");
        let comparison = RecordMatcher::default().compare(&outcome(), &applicant);
        assert!(!comparison.aadhaar_match);
        assert_eq!(comparison.decision, RecordDecision::ManualReview);
    }

    #[test]
    fn test_record_date_formats() {
        for value in ["1998-06-15", "15-06-1998", "15/06/1998", "15-Jun-1998"] {
            let applicant = ApplicantRecord {
                date_of_birth: value.to_string(),
                ..record()
            };
            assert_eq!(applicant.birth_date(), NaiveDate::from_ymd_opt(1998, 6, 15), "{}", value);
        }
    }

    #[test]
    fn test_missing_fields_never_match() {
        let mut card = outcome();
        card.extracted_name = None;
        card.extracted_gender = None;
        let comparison = RecordMatcher::default().compare(&card, &ApplicantRecord::default());
        assert!(!comparison.name_match && !comparison.gender_match && !comparison.aadhaar_match);
        assert_eq!(comparison.decision, RecordDecision::ManualReview);
    }

    #[test]
    fn test_transgender_equals_other() {
        let mut card = outcome();
        card.extracted_gender = Some("Other".to_string());
        let applicant = ApplicantRecord {
            gender: "Transgender".to_string(),
            ..record()
        };
        assert!(RecordMatcher::default().compare(&card, &applicant).gender_match);
    }
}
