use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::Field;
use crate::utils::VerifierError;

/// Relative importance of each field in the overall confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub id_number: f64,
    pub date_of_birth: f64,
    pub gender: f64,
    pub reference_number: f64,
    pub name: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        FieldWeights {
            id_number: 0.40,
            date_of_birth: 0.22,
            gender: 0.18,
            reference_number: 0.12,
            name: 0.08,
        }
    }
}

impl FieldWeights {
    pub fn weight(&self, field: Field) -> f64 {
        match field {
            Field::IdNumber => self.id_number,
            Field::DateOfBirth => self.date_of_birth,
            Field::Gender => self.gender,
            Field::ReferenceNumber => self.reference_number,
            Field::Name => self.name,
        }
    }

    pub fn total(&self) -> f64 {
        Field::ALL.iter().map(|field| self.weight(*field)).sum()
    }
}

/// Configuration bundle for a verification run. Every key is optional when
/// loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Tesseract language code(s), e.g. `eng` or `eng+hin`.
    pub ocr_language: String,
    pub target_dpi: u32,
    pub confidence_threshold_high: f64,
    pub confidence_threshold_low: f64,
    /// Words that can never be part of a printed name.
    pub stop_words: Vec<String>,
    /// Labels that introduce the reference number.
    pub reference_labels: Vec<String>,
    pub reference_min_digits: usize,
    pub reference_max_digits: usize,
    pub field_weights: FieldWeights,
    /// Confidence multiplier for a date of birth that only carries the year.
    pub year_only_completeness: f64,
    pub min_age_years: i32,
    pub max_age_years: i32,
    pub max_skew_degrees: f32,
    /// Retry OCR at 90/180/270 degrees when a page misses fields at 0.
    pub try_rotations: bool,
    /// "Today" for the DOB plausibility check; the local date when unset.
    pub reference_date: Option<NaiveDate>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        VerifierConfig {
            ocr_language: "eng".to_string(),
            target_dpi: 300,
            confidence_threshold_high: 70.0,
            confidence_threshold_low: 40.0,
            stop_words: default_stop_words(),
            reference_labels: default_reference_labels(),
            reference_min_digits: 14,
            reference_max_digits: 28,
            field_weights: FieldWeights::default(),
            year_only_completeness: 0.5,
            min_age_years: 5,
            max_age_years: 120,
            max_skew_degrees: 5.0,
            try_rotations: true,
            reference_date: None,
        }
    }
}

fn default_stop_words() -> Vec<String> {
    [
        "government of india",
        "government",
        "india",
        "aadhaar",
        "aadhar",
        "uidai",
        "unique identification",
        "authority",
        "dob",
        "birth",
        "year",
        "male",
        "female",
        "transgender",
        "issue",
        "issued",
        "enrolment",
        "enrollment",
        "address",
        "vid",
        "download",
        "date",
        "signature",
        "valid",
        "help",
        "www",
    ]
    .iter()
    .map(|word| word.to_string())
    .collect()
}

fn default_reference_labels() -> Vec<String> {
    [
        "enrolment no",
        "enrollment no",
        "enrolment number",
        "reference no",
        "reference number",
        "ref no",
        "vid",
    ]
    .iter()
    .map(|label| label.to_string())
    .collect()
}

impl VerifierConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, VerifierError> {
        let text = std::fs::read_to_string(path)?;
        let config: VerifierConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VerifierError> {
        let in_range = |value: f64| (0.0..=100.0).contains(&value);
        if !in_range(self.confidence_threshold_high) || !in_range(self.confidence_threshold_low) {
            return Err(VerifierError::InvalidConfig(
                "confidence thresholds must be within 0..=100".to_string(),
            ));
        }
        if self.confidence_threshold_low > self.confidence_threshold_high {
            return Err(VerifierError::InvalidConfig(format!(
                "confidence_threshold_low ({}) exceeds confidence_threshold_high ({})",
                self.confidence_threshold_low, self.confidence_threshold_high
            )));
        }
        if self.target_dpi == 0 {
            return Err(VerifierError::InvalidConfig("target_dpi must be positive".to_string()));
        }
        if self.ocr_language.trim().is_empty() {
            return Err(VerifierError::InvalidConfig("ocr_language is empty".to_string()));
        }
        if self.reference_min_digits > self.reference_max_digits {
            return Err(VerifierError::InvalidConfig(
                "reference_min_digits exceeds reference_max_digits".to_string(),
            ));
        }
        let weights = &self.field_weights;
        if Field::ALL.iter().any(|field| weights.weight(*field) < 0.0) || weights.total() <= 0.0 {
            return Err(VerifierError::InvalidConfig(
                "field weights must be non-negative and not all zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.year_only_completeness) {
            return Err(VerifierError::InvalidConfig(
                "year_only_completeness must be within 0..=1".to_string(),
            ));
        }
        if self.min_age_years < 0 || self.min_age_years > self.max_age_years {
            return Err(VerifierError::InvalidConfig(
                "age window must satisfy 0 <= min_age_years <= max_age_years".to_string(),
            ));
        }
        Ok(())
    }

    /// The date the DOB plausibility check is evaluated against.
    pub fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}
