pub mod extractors;
pub mod image;
pub mod layout;
pub mod ocr;
pub mod pdf;
pub mod text_correction;

pub use extractors::{ExtractionHints, FieldExtractor, FieldMatcher};
pub use image::Preprocessor;
pub use layout::FragmentStream;
pub use ocr::{default_engine, parse_tsv, OcrEngine, UnavailableEngine};
#[cfg(feature = "tesseract")]
pub use ocr::TesseractEngine;
pub use pdf::PdfRasterizer;
