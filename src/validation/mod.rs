pub mod checksum;
pub mod date;
pub mod record;

pub use checksum::Verhoeff;
pub use date::DateValidator;
pub use record::{ApplicantRecord, RecordComparison, RecordDecision, RecordMatcher};

use chrono::NaiveDate;
use log::debug;

use crate::models::{
    ExtractedFields, Field, FieldCheck, ReasonCode, ValidationIssue, ValidationResult, VerifierConfig,
};

/// Annotates extracted fields with checksum and plausibility results.
/// Never alters the extracted values.
pub struct Validator {
    min_age_years: i32,
    max_age_years: i32,
}

impl Validator {
    pub fn new(config: &VerifierConfig) -> Self {
        Validator {
            min_age_years: config.min_age_years,
            max_age_years: config.max_age_years,
        }
    }

    pub fn validate(&self, fields: &ExtractedFields, today: NaiveDate) -> ValidationResult {
        let mut issues = Vec::new();

        let id_number = fields.id_number.as_deref().map(|number| {
            if Verhoeff::is_valid(number) {
                FieldCheck::pass()
            } else {
                issues.push(ValidationIssue {
                    field: Field::IdNumber,
                    reason: ReasonCode::ChecksumMismatch,
                    message: format!("Verhoeff checksum failed for {}", number),
                });
                FieldCheck::fail(ReasonCode::ChecksumMismatch)
            }
        });

        let date_of_birth = fields.date_of_birth.as_ref().map(|dob| {
            if DateValidator::is_plausible(dob, today, self.min_age_years, self.max_age_years) {
                FieldCheck::pass()
            } else {
                issues.push(ValidationIssue {
                    field: Field::DateOfBirth,
                    reason: ReasonCode::ImplausibleDate,
                    message: format!("Date of birth {} is outside the plausible range", dob.normalized()),
                });
                FieldCheck::fail(ReasonCode::ImplausibleDate)
            }
        });

        let gender = fields.gender.map(|_| FieldCheck::pass());

        for issue in &issues {
            debug!("Validation issue: {}", issue.message);
        }

        ValidationResult {
            is_valid: issues.is_empty(),
            id_number,
            date_of_birth,
            gender,
            issues,
        }
    }
}
