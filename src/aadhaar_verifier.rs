use chrono::NaiveDate;
use log::{debug, info};

use crate::models::*;
use crate::processing::{ExtractionHints, FieldExtractor, OcrEngine, PdfRasterizer, Preprocessor};
use crate::utils::VerifierError;
use crate::validation::{ApplicantRecord, Validator};
use crate::verification::{ConfidenceAggregator, DecisionEngine};

const CORE_FIELDS: usize = 4;

/// Outcome of one run together with the intermediate results behind it.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub outcome: VerificationOutcome,
    pub fields: ExtractedFields,
    pub validation: ValidationResult,
    /// Page the outcome was taken from.
    pub page_index: usize,
    /// Clockwise rotation (degrees) that produced the outcome.
    pub rotation: u16,
    pub fragment_count: usize,
}

impl VerificationReport {
    /// Ordering key: more core fields first, then higher confidence.
    fn beats(&self, other: &VerificationReport) -> bool {
        let mine = self.fields.core_fields_found();
        let theirs = other.fields.core_fields_found();
        mine > theirs || (mine == theirs && self.outcome.ocr_confidence > other.outcome.ocr_confidence)
    }

    fn is_complete(&self) -> bool {
        self.fields.core_fields_found() == CORE_FIELDS
    }
}

/// Runs the whole pipeline: rasterize, preprocess, OCR, extract, validate,
/// score and decide.
pub struct AadhaarVerifier<'a> {
    config: VerifierConfig,
    engine: &'a dyn OcrEngine,
    rasterizer: PdfRasterizer,
    preprocessor: Preprocessor,
    extractor: FieldExtractor,
    validator: Validator,
    aggregator: ConfidenceAggregator,
    decision_engine: DecisionEngine,
}

impl<'a> AadhaarVerifier<'a> {
    pub fn new(config: &VerifierConfig, engine: &'a dyn OcrEngine) -> Result<Self, VerifierError> {
        config.validate()?;
        Ok(AadhaarVerifier {
            config: config.clone(),
            engine,
            rasterizer: PdfRasterizer::new(config.target_dpi),
            preprocessor: Preprocessor::new(config.max_skew_degrees),
            extractor: FieldExtractor::new(config),
            validator: Validator::new(config),
            aggregator: ConfidenceAggregator::new(config),
            decision_engine: DecisionEngine::new(config),
        })
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn verify(&self, document: &RawDocument) -> Result<VerificationReport, VerifierError> {
        self.verify_against(document, None)
    }

    /// Verifies a document submitted with applicant data. The record's name
    /// steers which printed name is taken when a card shows several.
    pub fn verify_against(
        &self,
        document: &RawDocument,
        record: Option<&ApplicantRecord>,
    ) -> Result<VerificationReport, VerifierError> {
        info!("Verifying {} using the {} OCR engine", document.source, self.engine.name());
        let pages = self.rasterizer.rasterize(document)?;
        let today = self.config.today();
        let expected_name = record.map(ApplicantRecord::full_name);
        let hints = ExtractionHints {
            name: expected_name.as_deref(),
        };

        let mut best: Option<VerificationReport> = None;
        for page in &pages {
            let candidate = self.verify_page(page, &hints, today)?;
            let complete = candidate.is_complete();
            if best.as_ref().map_or(true, |current| candidate.beats(current)) {
                best = Some(candidate);
            }
            if complete {
                break;
            }
        }

        let report = best.ok_or_else(|| {
            VerifierError::EmptyDocument(format!("{} contains no pages", document.source))
        })?;
        info!(
            "{}: {} ({} core fields, confidence {:.2}, page {}, rotation {})",
            document.source,
            report.outcome.decision,
            report.fields.core_fields_found(),
            report.outcome.ocr_confidence,
            report.page_index + 1,
            report.rotation
        );
        Ok(report)
    }

    /// Same as `verify` but never fails: errors become `{"error": ...}`.
    pub fn respond(&self, document: &RawDocument) -> VerificationResponse {
        self.verify(document).map(|report| report.outcome).into()
    }

    /// Runs extraction, validation and scoring on fragments that were
    /// recognized elsewhere.
    pub fn verify_fragments(&self, fragments: &[OcrFragment]) -> VerificationReport {
        self.verify_fragments_against(fragments, None)
    }

    pub fn verify_fragments_against(
        &self,
        fragments: &[OcrFragment],
        record: Option<&ApplicantRecord>,
    ) -> VerificationReport {
        let expected_name = record.map(ApplicantRecord::full_name);
        let hints = ExtractionHints {
            name: expected_name.as_deref(),
        };
        self.assess(fragments, &hints, 0, 0, self.config.today())
    }

    fn verify_page(
        &self,
        page: &PageImage,
        hints: &ExtractionHints,
        today: NaiveDate,
    ) -> Result<VerificationReport, VerifierError> {
        let mut best = self.evaluate(page, hints, 0, today)?;
        if best.is_complete() || !self.config.try_rotations {
            return Ok(best);
        }

        for turns in 1..=3u8 {
            let rotated = Preprocessor::rotate_quarter(page, turns);
            let candidate = self.evaluate(&rotated, hints, turns as u16 * 90, today)?;
            debug!(
                "Page {} at {} degrees: {} core fields, confidence {:.2}",
                page.page_index + 1,
                candidate.rotation,
                candidate.fields.core_fields_found(),
                candidate.outcome.ocr_confidence
            );
            if candidate.beats(&best) {
                best = candidate;
            }
            if best.is_complete() {
                break;
            }
        }
        Ok(best)
    }

    fn evaluate(
        &self,
        page: &PageImage,
        hints: &ExtractionHints,
        rotation: u16,
        today: NaiveDate,
    ) -> Result<VerificationReport, VerifierError> {
        let preprocessed = self.preprocessor.preprocess(page)?;
        let fragments = self.engine.recognize(&preprocessed, &self.config.ocr_language)?;
        debug!(
            "Page {} at {} degrees: {} fragments",
            page.page_index + 1,
            rotation,
            fragments.len()
        );
        Ok(self.assess(&fragments, hints, page.page_index, rotation, today))
    }

    fn assess(
        &self,
        fragments: &[OcrFragment],
        hints: &ExtractionHints,
        page_index: usize,
        rotation: u16,
        today: NaiveDate,
    ) -> VerificationReport {
        let fields = self.extractor.extract_guided(fragments, hints);
        let validation = self.validator.validate(&fields, today);
        let ocr_confidence = self.aggregator.aggregate(&fields, fragments);
        let decision = self.decision_engine.decide(&fields, &validation, ocr_confidence);

        let outcome = VerificationOutcome {
            extracted_name: fields.name.clone(),
            extracted_gender: fields.gender.map(|gender| gender.to_string()),
            extracted_dob: fields.date_of_birth_text(),
            extracted_aadhaar: fields.id_number.clone(),
            aadhaar_refnum: fields.reference_number.clone(),
            decision,
            status: DecisionEngine::status(decision),
            ocr_confidence,
        };

        VerificationReport {
            outcome,
            fields,
            validation,
            page_index,
            rotation,
            fragment_count: fragments.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoText;

    impl OcrEngine for NoText {
        fn name(&self) -> &str {
            "no-text"
        }

        fn recognize(&self, _image: &PreprocessedImage, _language: &str) -> Result<Vec<OcrFragment>, VerifierError> {
            Ok(Vec::new())
        }
    }

    fn card_fragments() -> Vec<OcrFragment> {
        let words: [(&str, u32, u32); 7] = [
            ("Shubham", 40, 100),
            ("Avinash", 180, 100),
            ("Sawant", 320, 100),
            ("DOB:", 40, 150),
            ("15/06/1998", 120, 150),
            ("Male", 40, 200),
            ("1234", 40, 300),
        ];
        let mut fragments: Vec<OcrFragment> = words
            .iter()
            .map(|(text, x, y)| OcrFragment::new(*text, BoundingBox::new(*x, *y, 100, 30), 0.95))
            .collect();
        fragments.push(OcrFragment::new("1234", BoundingBox::new(160, 300, 100, 30), 0.95));
        fragments.push(OcrFragment::new("1234", BoundingBox::new(280, 300, 100, 30), 0.95));
        fragments
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = VerifierConfig {
            confidence_threshold_low: 90.0,
            ..VerifierConfig::default()
        };
        assert!(matches!(
            AadhaarVerifier::new(&config, &NoText),
            Err(VerifierError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_verify_fragments_happy_path() {
        let verifier = AadhaarVerifier::new(&VerifierConfig::default(), &NoText).unwrap();
        let report = verifier.verify_fragments(&card_fragments());

        assert_eq!(report.outcome.decision, Decision::Verified);
        assert_eq!(report.outcome.status, Status::Success);
        assert_eq!(report.outcome.extracted_gender.as_deref(), Some("Male"));
        assert_eq!(report.outcome.extracted_dob.as_deref(), Some("15-Jun-1998"));
        assert_eq!(report.fragment_count, 9);
    }

    #[test]
    fn test_record_name_selects_printed_name() {
        let verifier = AadhaarVerifier::new(&VerifierConfig::default(), &NoText).unwrap();
        let mut fragments = vec![
            OcrFragment::new("Vishwanath Pandurang Kulkarni", BoundingBox::new(40, 40, 400, 30), 0.95),
            OcrFragment::new("Shubham Sawant", BoundingBox::new(40, 90, 200, 30), 0.95),
        ];
        fragments.extend(card_fragments().into_iter().skip(3));
        let record = ApplicantRecord {
            first_name: "Shubham".to_string(),
            middle_name: "Avinash".to_string(),
            last_name: "Sawant".to_string(),
            ..ApplicantRecord::default()
        };

        let unguided = verifier.verify_fragments(&fragments);
        assert_eq!(unguided.outcome.extracted_name.as_deref(), Some("Vishwanath Pandurang Kulkarni"));

        let guided = verifier.verify_fragments_against(&fragments, Some(&record));
        assert_eq!(guided.outcome.extracted_name.as_deref(), Some("Shubham Sawant"));
        assert_eq!(guided.fields.fragments_for(Field::Name), vec![1]);
    }

    #[test]
    fn test_no_fragments_is_not_verified() {
        let verifier = AadhaarVerifier::new(&VerifierConfig::default(), &NoText).unwrap();
        let report = verifier.verify_fragments(&[]);

        assert_eq!(report.outcome.decision, Decision::NotVerified);
        assert_eq!(report.outcome.status, Status::Failed);
        assert_eq!(report.outcome.ocr_confidence, 0.0);
        assert!(report.outcome.extracted_aadhaar.is_none());
    }

    #[test]
    fn test_non_pdf_becomes_error_response() {
        let verifier = AadhaarVerifier::new(&VerifierConfig::default(), &NoText).unwrap();
        let response = verifier.respond(&RawDocument::new("card.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0]));
        match response {
            VerificationResponse::Error { error } => assert!(error.starts_with("UnsupportedFormat")),
            other => panic!("expected error, got {:?}", other),
        }
    }
}
