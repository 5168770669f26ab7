use crate::models::{BoundingBox, OcrFragment, PreprocessedImage};
use crate::utils::VerifierError;

/// Text recognizer handed to the pipeline for each run.
///
/// Implementations return word-level fragments with bounding boxes and a
/// confidence in [0, 1]. They must not filter or reinterpret the text beyond
/// dropping empty tokens.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, image: &PreprocessedImage, language: &str) -> Result<Vec<OcrFragment>, VerifierError>;
}

/// Tesseract backed recognizer. A fresh Tesseract handle is created per call,
/// so one engine can be shared across threads.
#[cfg(feature = "tesseract")]
pub struct TesseractEngine {
    tessdata_dir: Option<std::path::PathBuf>,
}

#[cfg(feature = "tesseract")]
impl TesseractEngine {
    pub fn new(tessdata_dir: Option<std::path::PathBuf>) -> Self {
        TesseractEngine { tessdata_dir }
    }

    fn encode_png(image: &PreprocessedImage) -> Result<Vec<u8>, VerifierError> {
        let mut buffer = Vec::new();
        image::DynamicImage::ImageLuma8(image.image.clone())
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)?;
        Ok(buffer)
    }
}

#[cfg(feature = "tesseract")]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &PreprocessedImage, language: &str) -> Result<Vec<OcrFragment>, VerifierError> {
        let datapath = match &self.tessdata_dir {
            Some(dir) => Some(dir.to_str().ok_or_else(|| {
                VerifierError::OcrEngineUnavailable(format!("invalid tessdata path {:?}", dir))
            })?),
            None => None,
        };
        let png = Self::encode_png(image)?;

        let tess = tesseract::Tesseract::new(datapath, Some(language))
            .map_err(|e| VerifierError::OcrEngineUnavailable(format!("{e:?}")))?;
        let mut tess = tess
            .set_image_from_mem(&png)
            .map_err(|e| VerifierError::OcrEngineUnavailable(format!("{e:?}")))?
            .set_source_resolution(image.dpi as i32);
        let tsv = tess
            .get_tsv_text(0)
            .map_err(|e| VerifierError::OcrEngineUnavailable(format!("{e:?}")))?;

        let fragments = parse_tsv(&tsv);
        log::debug!(
            "Tesseract recognized {} words on page {}",
            fragments.len(),
            image.page_index + 1
        );
        Ok(fragments)
    }
}

/// Stand-in used when the crate is built without an OCR backend.
pub struct UnavailableEngine;

impl OcrEngine for UnavailableEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn recognize(&self, _image: &PreprocessedImage, _language: &str) -> Result<Vec<OcrFragment>, VerifierError> {
        Err(VerifierError::OcrEngineUnavailable(
            "built without an OCR backend (enable the `tesseract` feature)".to_string(),
        ))
    }
}

/// The best engine this build offers: Tesseract when compiled in, otherwise
/// the unavailable stand-in.
#[cfg(feature = "tesseract")]
pub fn default_engine(tessdata_dir: Option<std::path::PathBuf>) -> Box<dyn OcrEngine> {
    Box::new(TesseractEngine::new(tessdata_dir))
}

#[cfg(not(feature = "tesseract"))]
pub fn default_engine(tessdata_dir: Option<std::path::PathBuf>) -> Box<dyn OcrEngine> {
    if let Some(dir) = tessdata_dir {
        log::warn!("Ignoring tessdata directory {:?}: no OCR backend compiled in", dir);
    }
    Box::new(UnavailableEngine)
}

/// Parses Tesseract TSV output into word fragments.
///
/// Columns: level page_num block_num par_num line_num word_num left top width
/// height conf text. Only level 5 (word) rows with non-empty text are kept.
/// Confidence is scaled from 0-100 to 0-1; Tesseract's `-1` becomes 0.
pub fn parse_tsv(tsv: &str) -> Vec<OcrFragment> {
    let mut fragments = Vec::new();

    for line in tsv.lines() {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 12 {
            continue;
        }
        // Header row fails this parse
        match columns[0].trim().parse::<u32>() {
            Ok(5) => {}
            _ => continue,
        }

        let text = columns[11].trim();
        if text.is_empty() {
            continue;
        }
        let conf: f32 = match columns[10].trim().parse() {
            Ok(conf) => conf,
            Err(_) => continue,
        };
        let bbox = match parse_bounding_box(columns[6], columns[7], columns[8], columns[9]) {
            Some(bbox) => bbox,
            None => continue,
        };

        let confidence = if conf < 0.0 { 0.0 } else { conf / 100.0 };
        fragments.push(OcrFragment::new(text, bbox, confidence));
    }

    fragments
}

fn parse_bounding_box(left: &str, top: &str, width: &str, height: &str) -> Option<BoundingBox> {
    Some(BoundingBox {
        x: left.trim().parse().ok()?,
        y: top.trim().parse().ok()?,
        width: width.trim().parse().ok()?,
        height: height.trim().parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_words() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t800\t500\t-1\t\n\
             4\t1\t1\t1\t1\t0\t40\t100\t300\t30\t-1\t\n\
             5\t1\t1\t1\t1\t1\t40\t100\t120\t30\t96.5\tShubham\n\
             5\t1\t1\t1\t1\t2\t170\t101\t110\t29\t91\tSawant\n"
        );
        let fragments = parse_tsv(&tsv);

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "Shubham");
        assert_eq!(fragments[0].bbox, BoundingBox::new(40, 100, 120, 30));
        assert!((fragments[0].confidence - 0.965).abs() < 1e-6);
        assert!((fragments[1].confidence - 0.91).abs() < 1e-6);
    }

    #[test]
    fn test_parse_tsv_negative_confidence_and_blank_words() {
        let tsv = format!(
            "{HEADER}\n\
             5\t1\t1\t1\t1\t1\t10\t10\t20\t20\t-1\t1234\n\
             5\t1\t1\t1\t1\t2\t40\t10\t20\t20\t88\t   \n\
             5\t1\t1\t1\t1\t3\tx\t10\t20\t20\t88\tbad\n"
        );
        let fragments = parse_tsv(&tsv);

        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "1234");
        assert_eq!(fragments[0].confidence, 0.0);
    }

    #[test]
    fn test_parse_tsv_empty_input() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv(HEADER).is_empty());
    }

    #[test]
    fn test_unavailable_engine_reports_error() {
        let image = PreprocessedImage {
            image: GrayImage::new(4, 4),
            dpi: 300,
            page_index: 0,
            skew_degrees: 0.0,
        };
        let err = UnavailableEngine.recognize(&image, "eng").unwrap_err();
        assert!(matches!(err, VerifierError::OcrEngineUnavailable(_)));
        assert!(err.to_string().starts_with("OcrEngineUnavailable"));
    }

    #[cfg(feature = "tesseract")]
    #[test]
    fn test_tesseract_rejects_missing_tessdata() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TesseractEngine::new(Some(dir.path().to_path_buf()));
        let image = PreprocessedImage {
            image: GrayImage::from_pixel(64, 32, image::Luma([255])),
            dpi: 300,
            page_index: 0,
            skew_degrees: 0.0,
        };
        assert!(matches!(
            engine.recognize(&image, "eng"),
            Err(VerifierError::OcrEngineUnavailable(_))
        ));
    }
}
