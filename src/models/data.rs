use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::utils::VerifierError;

/// Uploaded document bytes, assumed to be a PDF.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Filename or URL the bytes came from.
    pub source: String,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(source: impl Into<String>, bytes: Vec<u8>) -> Self {
        RawDocument {
            source: source.into(),
            bytes,
        }
    }
}

/// A single rasterized page.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: DynamicImage,
    pub dpi: u32,
    pub page_index: usize,
}

/// Page after the preprocessing sequence; replaces the PageImage in the pipeline.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub image: GrayImage,
    pub dpi: u32,
    pub page_index: usize,
    /// Rotation applied by deskew, in degrees.
    pub skew_degrees: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height.max(1)
    }

    pub fn center_y(&self) -> u32 {
        self.y + self.height / 2
    }
}

/// One recognized text token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrFragment {
    pub text: String,
    pub bbox: BoundingBox,
    /// Recognition confidence in [0, 1].
    pub confidence: f32,
}

impl OcrFragment {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        OcrFragment {
            text: text.into(),
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    IdNumber,
    DateOfBirth,
    Gender,
    Name,
    ReferenceNumber,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::IdNumber,
        Field::DateOfBirth,
        Field::Gender,
        Field::Name,
        Field::ReferenceNumber,
    ];
}

/// Association between an extracted field and one OCR fragment (by index)
/// that contributed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FieldLink {
    pub field: Field,
    pub fragment: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatePrecision {
    Full,
    /// Only the year was printed; day and month are the `01-Jan` placeholder.
    YearOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthDate {
    pub date: NaiveDate,
    pub precision: DatePrecision,
}

impl BirthDate {
    pub fn full(date: NaiveDate) -> Self {
        BirthDate {
            date,
            precision: DatePrecision::Full,
        }
    }

    pub fn year_only(year: i32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, 1, 1).map(|date| BirthDate {
            date,
            precision: DatePrecision::YearOnly,
        })
    }

    /// `DD-Mon-YYYY`, e.g. `15-Jun-1998`.
    pub fn normalized(&self) -> String {
        self.date.format("%d-%b-%Y").to_string()
    }
}

/// Accumulator filled by the field extractor.
#[derive(Debug, Clone, Default)]
pub struct ExtractedFields {
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<BirthDate>,
    pub id_number: Option<String>,
    pub reference_number: Option<String>,
    pub links: BTreeSet<FieldLink>,
}

impl ExtractedFields {
    pub fn link(&mut self, field: Field, fragments: &[usize]) {
        for &fragment in fragments {
            self.links.insert(FieldLink { field, fragment });
        }
    }

    /// Indices of the fragments that contributed to `field`, ascending.
    pub fn fragments_for(&self, field: Field) -> Vec<usize> {
        self.links
            .iter()
            .filter(|link| link.field == field)
            .map(|link| link.fragment)
            .collect()
    }

    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::IdNumber => self.id_number.is_some(),
            Field::DateOfBirth => self.date_of_birth.is_some(),
            Field::Gender => self.gender.is_some(),
            Field::Name => self.name.is_some(),
            Field::ReferenceNumber => self.reference_number.is_some(),
        }
    }

    /// Number of the four card fields (name, gender, DOB, ID) that were found.
    pub fn core_fields_found(&self) -> usize {
        [Field::Name, Field::Gender, Field::DateOfBirth, Field::IdNumber]
            .iter()
            .filter(|field| self.has(**field))
            .count()
    }

    pub fn date_of_birth_text(&self) -> Option<String> {
        self.date_of_birth.map(|dob| dob.normalized())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReasonCode {
    ChecksumMismatch,
    ImplausibleDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCheck {
    pub passed: bool,
    pub reason: Option<ReasonCode>,
}

impl FieldCheck {
    pub fn pass() -> Self {
        FieldCheck {
            passed: true,
            reason: None,
        }
    }

    pub fn fail(reason: ReasonCode) -> Self {
        FieldCheck {
            passed: false,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: Field,
    pub reason: ReasonCode,
    pub message: String,
}

/// Per-field validation annotations. A `None` check means the field was absent.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub id_number: Option<FieldCheck>,
    pub date_of_birth: Option<FieldCheck>,
    pub gender: Option<FieldCheck>,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn checksum_passed(&self) -> bool {
        self.id_number.map(|check| check.passed).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "Verified")]
    Verified,
    #[serde(rename = "Manual Review")]
    ManualReview,
    #[serde(rename = "Not Verified")]
    NotVerified,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Verified => "Verified",
            Decision::ManualReview => "Manual Review",
            Decision::NotVerified => "Not Verified",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Success,
    Partial,
    Failed,
}

/// The externally visible result of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationOutcome {
    pub extracted_name: Option<String>,
    pub extracted_gender: Option<String>,
    pub extracted_dob: Option<String>,
    pub extracted_aadhaar: Option<String>,
    pub aadhaar_refnum: Option<String>,
    pub decision: Decision,
    pub status: Status,
    /// Overall OCR confidence in [0, 100].
    pub ocr_confidence: f64,
}

/// Either a complete outcome or a single top-level error, never a mix.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VerificationResponse {
    Outcome(VerificationOutcome),
    Error { error: String },
}

impl VerificationResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, VerificationResponse::Error { .. })
    }
}

impl From<Result<VerificationOutcome, VerifierError>> for VerificationResponse {
    fn from(result: Result<VerificationOutcome, VerifierError>) -> Self {
        match result {
            Ok(outcome) => VerificationResponse::Outcome(outcome),
            Err(err) => VerificationResponse::Error {
                error: err.to_string(),
            },
        }
    }
}
