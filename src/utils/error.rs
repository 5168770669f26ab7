use thiserror::Error;

/// Errors that halt a verification run.
///
/// Field absence and checksum failures are not errors; they flow through the
/// decision engine as lower-confidence results.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// The input bytes are not a parseable PDF.
    #[error("UnsupportedFormat: {0}")]
    UnsupportedFormat(String),

    /// The PDF parsed but produced no pages.
    #[error("EmptyDocument: {0}")]
    EmptyDocument(String),

    /// The OCR backend could not be initialised or invoked.
    #[error("OcrEngineUnavailable: {0}")]
    OcrEngineUnavailable(String),

    #[error("ImageProcessing: {0}")]
    ImageProcessing(String),

    #[error("InvalidConfig: {0}")]
    InvalidConfig(String),

    #[error("Io: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<lopdf::Error> for VerifierError {
    fn from(err: lopdf::Error) -> Self {
        VerifierError::UnsupportedFormat(format!("failed to parse PDF: {}", err))
    }
}

impl From<image::ImageError> for VerifierError {
    fn from(err: image::ImageError) -> Self {
        VerifierError::ImageProcessing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_starts_with_kind() {
        let err = VerifierError::UnsupportedFormat("not a PDF".to_string());
        assert!(err.to_string().starts_with("UnsupportedFormat"));

        let err = VerifierError::OcrEngineUnavailable("tesseract missing".to_string());
        assert_eq!(err.to_string(), "OcrEngineUnavailable: tesseract missing");
    }
}
