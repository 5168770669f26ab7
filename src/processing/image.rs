use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use log::debug;

use crate::models::{PageImage, PreprocessedImage};
use crate::utils::VerifierError;

const THRESHOLD_BIAS: i64 = 10;
const SKEW_STEP_DEGREES: f32 = 0.5;
/// Longest side of the copy used for skew estimation.
const SKEW_SAMPLE_DIMENSION: u32 = 800;

/// Page cleanup ahead of OCR: grayscale, median denoise, adaptive threshold
/// and deskew, always in that order.
pub struct Preprocessor {
    max_skew_degrees: f32,
}

impl Preprocessor {
    pub fn new(max_skew_degrees: f32) -> Self {
        Preprocessor {
            max_skew_degrees: max_skew_degrees.abs(),
        }
    }

    pub fn preprocess(&self, page: &PageImage) -> Result<PreprocessedImage, VerifierError> {
        let (width, height) = (page.image.width(), page.image.height());
        if width == 0 || height == 0 {
            return Err(VerifierError::ImageProcessing(format!(
                "page {} has zero size",
                page.page_index + 1
            )));
        }

        let gray = page.image.to_luma8();
        let denoised = median_filter(&gray, 1, 1);
        let binary = Self::adaptive_threshold(&denoised, Self::threshold_window(page.dpi), THRESHOLD_BIAS);

        let skew = self.estimate_skew(&binary);
        let image = if skew == 0.0 {
            binary
        } else {
            let rotated = rotate_about_center(&binary, skew.to_radians(), Interpolation::Bilinear, Luma([255]));
            Self::binarize(&rotated, 128)
        };
        debug!(
            "Preprocessed page {} ({}x{} at {} dpi, deskew {:.1} deg)",
            page.page_index + 1,
            width,
            height,
            page.dpi,
            skew
        );

        Ok(PreprocessedImage {
            image,
            dpi: page.dpi,
            page_index: page.page_index,
            skew_degrees: skew,
        })
    }

    /// Rotates a page clockwise by `turns` quarter turns.
    pub fn rotate_quarter(page: &PageImage, turns: u8) -> PageImage {
        let image = match turns % 4 {
            1 => page.image.rotate90(),
            2 => page.image.rotate180(),
            3 => page.image.rotate270(),
            _ => page.image.clone(),
        };
        PageImage {
            image,
            dpi: page.dpi,
            page_index: page.page_index,
        }
    }

    /// Local-mean window: roughly a tenth of an inch, always odd.
    fn threshold_window(dpi: u32) -> u32 {
        (dpi / 10).max(15) | 1
    }

    /// Adaptive thresholding against the local mean, using a summed-area
    /// table so every window sum is O(1).
    fn adaptive_threshold(gray: &GrayImage, window: u32, bias: i64) -> GrayImage {
        let (width, height) = gray.dimensions();
        let (w, h) = (width as usize, height as usize);

        let mut integral = vec![0u64; (w + 1) * (h + 1)];
        for y in 0..h {
            let mut row_sum = 0u64;
            for x in 0..w {
                row_sum += gray.get_pixel(x as u32, y as u32)[0] as u64;
                integral[(y + 1) * (w + 1) + x + 1] = integral[y * (w + 1) + x + 1] + row_sum;
            }
        }

        let half = (window / 2) as usize;
        ImageBuffer::from_fn(width, height, |x, y| {
            let (x, y) = (x as usize, y as usize);
            let (x0, y0) = (x.saturating_sub(half), y.saturating_sub(half));
            let (x1, y1) = ((x + half + 1).min(w), (y + half + 1).min(h));
            let sum = integral[y1 * (w + 1) + x1] + integral[y0 * (w + 1) + x0]
                - integral[y0 * (w + 1) + x1]
                - integral[y1 * (w + 1) + x0];
            let count = ((x1 - x0) * (y1 - y0)) as u64;
            let threshold = (sum / count) as i64 - bias;
            let value = gray.get_pixel(x as u32, y as u32)[0] as i64;
            Luma([if value > threshold { 255 } else { 0 }])
        })
    }

    fn binarize(gray: &GrayImage, level: u8) -> GrayImage {
        ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([if gray.get_pixel(x, y)[0] >= level { 255 } else { 0 }])
        })
    }

    /// Rotation (degrees) that best straightens text lines, searched over
    /// ±max_skew in half-degree steps by projection-profile sharpness.
    fn estimate_skew(&self, binary: &GrayImage) -> f32 {
        if self.max_skew_degrees < SKEW_STEP_DEGREES {
            return 0.0;
        }

        let longest = binary.width().max(binary.height());
        let sample = if longest > SKEW_SAMPLE_DIMENSION {
            let scale = SKEW_SAMPLE_DIMENSION as f32 / longest as f32;
            let width = ((binary.width() as f32 * scale) as u32).max(1);
            let height = ((binary.height() as f32 * scale) as u32).max(1);
            imageops::resize(binary, width, height, FilterType::Triangle)
        } else {
            binary.clone()
        };

        if !sample.pixels().any(|p| p[0] < 128) {
            return 0.0;
        }

        // Candidates ordered by magnitude so ties resolve to the smaller angle
        let steps = (self.max_skew_degrees / SKEW_STEP_DEGREES).floor() as i32;
        let mut best_angle = 0.0;
        let mut best_score = Self::profile_score(&sample);
        for step in 1..=steps {
            for angle in [step as f32 * SKEW_STEP_DEGREES, -(step as f32) * SKEW_STEP_DEGREES] {
                let rotated = rotate_about_center(&sample, angle.to_radians(), Interpolation::Nearest, Luma([255]));
                let score = Self::profile_score(&rotated);
                if score > best_score {
                    best_score = score;
                    best_angle = angle;
                }
            }
        }
        best_angle
    }

    /// Sum of squared dark-pixel counts per row; peaks when text rows are level.
    fn profile_score(image: &GrayImage) -> u64 {
        image
            .rows()
            .map(|row| {
                let dark = row.filter(|p| p[0] < 128).count() as u64;
                dark * dark
            })
            .sum()
    }
}
