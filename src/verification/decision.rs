use crate::models::{Decision, ExtractedFields, Status, ValidationResult, VerifierConfig};

/// Maps fields, validation and confidence onto the three-way decision.
pub struct DecisionEngine {
    threshold_high: f64,
    threshold_low: f64,
}

impl DecisionEngine {
    pub fn new(config: &VerifierConfig) -> Self {
        DecisionEngine {
            threshold_high: config.confidence_threshold_high,
            threshold_low: config.confidence_threshold_low,
        }
    }

    /// Rules apply in order: no ID, then low confidence, then the
    /// checksum-and-high-confidence bar; anything else needs review.
    pub fn decide(&self, fields: &ExtractedFields, validation: &ValidationResult, confidence: f64) -> Decision {
        if fields.id_number.is_none() {
            return Decision::NotVerified;
        }
        if confidence < self.threshold_low {
            return Decision::NotVerified;
        }
        if validation.checksum_passed() && confidence >= self.threshold_high {
            return Decision::Verified;
        }
        Decision::ManualReview
    }

    pub fn status(decision: Decision) -> Status {
        match decision {
            Decision::Verified => Status::Success,
            Decision::ManualReview => Status::Partial,
            Decision::NotVerified => Status::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldCheck, ReasonCode};

    fn fields(with_id: bool) -> ExtractedFields {
        ExtractedFields {
            id_number: with_id.then(|| "123412341234".to_string()),
            ..ExtractedFields::default()
        }
    }

    fn validation(checksum: Option<bool>) -> ValidationResult {
        ValidationResult {
            is_valid: checksum.unwrap_or(true),
            id_number: checksum.map(|ok| {
                if ok {
                    FieldCheck::pass()
                } else {
                    FieldCheck::fail(ReasonCode::ChecksumMismatch)
                }
            }),
            date_of_birth: None,
            gender: None,
            issues: Vec::new(),
        }
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(&VerifierConfig::default())
    }

    #[test]
    fn test_missing_id_is_never_verified() {
        assert_eq!(engine().decide(&fields(false), &validation(None), 99.0), Decision::NotVerified);
    }

    #[test]
    fn test_threshold_boundaries() {
        let engine = engine();
        let (f, ok) = (fields(true), validation(Some(true)));
        assert_eq!(engine.decide(&f, &ok, 70.0), Decision::Verified);
        assert_eq!(engine.decide(&f, &ok, 69.99), Decision::ManualReview);
        assert_eq!(engine.decide(&f, &ok, 40.0), Decision::ManualReview);
        assert_eq!(engine.decide(&f, &ok, 39.99), Decision::NotVerified);
    }

    #[test]
    fn test_checksum_failure_caps_at_review() {
        let engine = engine();
        let bad = validation(Some(false));
        assert_eq!(engine.decide(&fields(true), &bad, 95.0), Decision::ManualReview);
        assert_eq!(engine.decide(&fields(true), &bad, 10.0), Decision::NotVerified);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(DecisionEngine::status(Decision::Verified), Status::Success);
        assert_eq!(DecisionEngine::status(Decision::ManualReview), Status::Partial);
        assert_eq!(DecisionEngine::status(Decision::NotVerified), Status::Failed);
    }
}
