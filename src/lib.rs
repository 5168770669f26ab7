pub mod aadhaar_verifier;
pub mod batch;
pub mod models;
pub mod processing;
pub mod utils;
pub mod validation;
pub mod verification;

pub use aadhaar_verifier::{AadhaarVerifier, VerificationReport};
pub use models::{RawDocument, VerificationOutcome, VerificationResponse, VerifierConfig};
pub use processing::OcrEngine;
pub use utils::VerifierError;
