use std::collections::HashMap;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbImage};
use log::{debug, info, warn};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::models::{PageImage, RawDocument};
use crate::utils::VerifierError;

const POINTS_PER_INCH: f64 = 72.0;
/// A4 in points, used when a page carries no usable MediaBox.
const DEFAULT_MEDIA_BOX: (f64, f64) = (595.0, 842.0);
const MAX_DIMENSION: u32 = 7000;
const MAX_INHERITANCE_DEPTH: usize = 32;
const MAX_FORM_DEPTH: usize = 2;

/// Converts PDF pages into raster images at a fixed target resolution.
///
/// Scanned ID cards are stored as embedded raster XObjects, so each page is
/// rasterized from its largest embedded image and resampled to the target DPI.
pub struct PdfRasterizer {
    target_dpi: u32,
}

impl PdfRasterizer {
    pub fn new(target_dpi: u32) -> Self {
        PdfRasterizer { target_dpi }
    }

    pub fn rasterize(&self, document: &RawDocument) -> Result<Vec<PageImage>, VerifierError> {
        if !has_pdf_header(&document.bytes) {
            return Err(VerifierError::UnsupportedFormat(format!(
                "{} is not a PDF document",
                document.source
            )));
        }

        let pdf = Document::load_mem(&document.bytes)?;
        let pages = pdf.get_pages();
        if pages.is_empty() {
            return Err(VerifierError::EmptyDocument(format!(
                "{} contains no pages",
                document.source
            )));
        }

        info!("Rasterizing {} page(s) from {}", pages.len(), document.source);
        pages
            .values()
            .enumerate()
            .map(|(page_index, page_id)| self.rasterize_page(&pdf, *page_id, page_index))
            .collect()
    }

    fn rasterize_page(
        &self,
        pdf: &Document,
        page_id: ObjectId,
        page_index: usize,
    ) -> Result<PageImage, VerifierError> {
        let (page_width, page_height) = media_box(pdf, page_id).unwrap_or(DEFAULT_MEDIA_BOX);

        let (name, image) = match largest_page_image(pdf, page_id) {
            Some(found) => found,
            None => {
                warn!(
                    "Page {} has no decodable raster image; vector content is not rendered",
                    page_index + 1
                );
                let width = points_to_pixels(page_width, self.target_dpi);
                let height = points_to_pixels(page_height, self.target_dpi);
                return Ok(PageImage {
                    image: DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([255]))),
                    dpi: self.target_dpi,
                    page_index,
                });
            }
        };

        // Width the image is drawn at; the whole page when the placement is unknown
        let drawn_width = name
            .and_then(|name| image_placements(pdf, page_id).remove(&name))
            .filter(|(width, _)| *width >= 1.0)
            .map_or(page_width, |(width, _)| width);
        let native_dpi = (image.width() as f64 / (drawn_width / POINTS_PER_INCH)).round();
        let native_dpi = if native_dpi.is_finite() && native_dpi >= 1.0 {
            native_dpi as u32
        } else {
            self.target_dpi
        };
        debug!(
            "Page {}: {}x{} px, estimated {} dpi",
            page_index + 1,
            image.width(),
            image.height(),
            native_dpi
        );

        let (image, dpi) = self.resample(image, native_dpi);
        Ok(PageImage {
            image,
            dpi,
            page_index,
        })
    }

    /// Rescales to the target DPI when the native resolution is more than 10% off.
    fn resample(&self, image: DynamicImage, native_dpi: u32) -> (DynamicImage, u32) {
        let mut scale = self.target_dpi as f64 / native_dpi as f64;
        if (scale - 1.0).abs() <= 0.1 {
            return (image, native_dpi);
        }

        let longest = image.width().max(image.height()) as f64;
        if longest * scale > MAX_DIMENSION as f64 {
            scale = MAX_DIMENSION as f64 / longest;
        }
        let width = ((image.width() as f64 * scale).round() as u32).max(1);
        let height = ((image.height() as f64 * scale).round() as u32).max(1);
        let dpi = ((native_dpi as f64 * scale).round() as u32).max(1);
        (image.resize_exact(width, height, FilterType::CatmullRom), dpi)
    }
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    // Readers tolerate leading garbage before the header within the first KiB
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(5).any(|w| w == b"%PDF-")
}

fn points_to_pixels(points: f64, dpi: u32) -> u32 {
    let pixels = (points / POINTS_PER_INCH * dpi as f64).round();
    (pixels.max(1.0) as u32).min(MAX_DIMENSION)
}

fn resolve<'a>(pdf: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => pdf.get_object(*id).ok(),
        other => Some(other),
    }
}

fn object_to_f64(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(*value as f64),
        _ => None,
    }
}

/// Looks a page attribute up on the page or any ancestor in the page tree.
fn inherited<'a>(pdf: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = pdf.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(pdf, value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = pdf.get_dictionary(parent).ok()?;
    }
    None
}

fn media_box(pdf: &Document, page_id: ObjectId) -> Option<(f64, f64)> {
    let values = inherited(pdf, page_id, b"MediaBox")?.as_array().ok()?;
    if values.len() != 4 {
        return None;
    }
    let coords: Vec<f64> = values
        .iter()
        .filter_map(|value| resolve(pdf, value).and_then(object_to_f64))
        .collect();
    if coords.len() != 4 {
        return None;
    }
    let width = (coords[2] - coords[0]).abs();
    let height = (coords[3] - coords[1]).abs();
    if width < 1.0 || height < 1.0 {
        return None;
    }
    Some((width, height))
}

/// Largest decodable image on the page. The XObject name is returned for
/// images the page content draws directly, not for ones nested in forms.
fn largest_page_image(pdf: &Document, page_id: ObjectId) -> Option<(Option<Vec<u8>>, DynamicImage)> {
    let resources = inherited(pdf, page_id, b"Resources")?.as_dict().ok()?;
    let mut images = Vec::new();
    collect_images(pdf, resources, 0, &mut images);
    images
        .into_iter()
        .max_by_key(|(_, image)| image.width() as u64 * image.height() as u64)
}

fn multiply(m: [f64; 6], ctm: [f64; 6]) -> [f64; 6] {
    [
        m[0] * ctm[0] + m[1] * ctm[2],
        m[0] * ctm[1] + m[1] * ctm[3],
        m[2] * ctm[0] + m[3] * ctm[2],
        m[2] * ctm[1] + m[3] * ctm[3],
        m[4] * ctm[0] + m[5] * ctm[2] + ctm[4],
        m[4] * ctm[1] + m[5] * ctm[3] + ctm[5],
    ]
}

/// Drawn size in points of each XObject painted by the page content, keyed
/// by resource name. Only the first `Do` of a name is recorded.
fn image_placements(pdf: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, (f64, f64)> {
    let mut placements = HashMap::new();
    let content = match pdf
        .get_page_content(page_id)
        .ok()
        .and_then(|bytes| Content::decode(&bytes).ok())
    {
        Some(content) => content,
        None => return placements,
    };

    let mut ctm = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
    let mut saved: Vec<[f64; 6]> = Vec::new();
    for operation in &content.operations {
        match operation.operator.as_str() {
            "q" => saved.push(ctm),
            "Q" => ctm = saved.pop().unwrap_or(ctm),
            "cm" => {
                let values: Vec<f64> = operation.operands.iter().filter_map(object_to_f64).collect();
                if let [a, b, c, d, e, f] = values[..] {
                    ctm = multiply([a, b, c, d, e, f], ctm);
                }
            }
            "Do" => {
                if let Some(Ok(name)) = operation.operands.first().map(Object::as_name) {
                    let width = ctm[0].hypot(ctm[1]);
                    let height = ctm[2].hypot(ctm[3]);
                    placements.entry(name.to_vec()).or_insert((width, height));
                }
            }
            _ => {}
        }
    }
    placements
}

fn collect_images(
    pdf: &Document,
    resources: &Dictionary,
    depth: usize,
    out: &mut Vec<(Option<Vec<u8>>, DynamicImage)>,
) {
    let xobjects = match resources
        .get(b"XObject")
        .ok()
        .and_then(|object| resolve(pdf, object))
        .and_then(|object| object.as_dict().ok())
    {
        Some(xobjects) => xobjects,
        None => return,
    };

    for (name, object) in xobjects.iter() {
        let stream = match resolve(pdf, object).and_then(|object| object.as_stream().ok()) {
            Some(stream) => stream,
            None => continue,
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(subtype) if subtype == b"Image" => match decode_image(pdf, stream) {
                Some(image) => out.push(((depth == 0).then(|| name.clone()), image)),
                None => debug!("Skipping undecodable image XObject {}", String::from_utf8_lossy(name)),
            },
            Ok(subtype) if subtype == b"Form" && depth < MAX_FORM_DEPTH => {
                if let Some(form_resources) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|object| resolve(pdf, object))
                    .and_then(|object| object.as_dict().ok())
                {
                    collect_images(pdf, form_resources, depth + 1, out);
                }
            }
            _ => {}
        }
    }
}

fn stream_filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(names)) => names
            .iter()
            .filter_map(|object| object.as_name().ok().map(|name| name.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

fn color_components(pdf: &Document, color_space: Option<&Object>) -> Option<usize> {
    let color_space = resolve(pdf, color_space?)?;
    match color_space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Some(1),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(3),
            b"DeviceCMYK" | b"CMYK" => Some(4),
            _ => None,
        },
        Object::Array(parts) => {
            let family = parts.first()?.as_name().ok()?;
            if family != b"ICCBased" {
                return None;
            }
            let profile = resolve(pdf, parts.get(1)?)?.as_stream().ok()?;
            profile
                .dict
                .get(b"N")
                .and_then(Object::as_i64)
                .ok()
                .map(|n| n as usize)
        }
        _ => None,
    }
}

fn decode_image(pdf: &Document, stream: &Stream) -> Option<DynamicImage> {
    let filters = stream_filters(stream);

    if filters.iter().any(|filter| filter == b"DCTDecode") {
        if filters.len() != 1 {
            return None;
        }
        return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg).ok();
    }

    let width = stream.dict.get(b"Width").and_then(Object::as_i64).ok()?;
    let height = stream.dict.get(b"Height").and_then(Object::as_i64).ok()?;
    if width <= 0 || height <= 0 {
        return None;
    }
    let (width, height) = (width as u32, height as u32);

    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    if bits != 8 {
        return None;
    }

    let data = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream.decompressed_content().ok()?
    };

    let components = color_components(pdf, stream.dict.get(b"ColorSpace").ok())?;
    let expected = width as usize * height as usize * components;
    if data.len() < expected {
        return None;
    }
    let mut data = data;
    data.truncate(expected);

    match components {
        1 => GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
        4 => {
            let rgb: Vec<u8> = data
                .chunks_exact(4)
                .flat_map(|cmyk| {
                    let k = 255 - cmyk[3] as u16;
                    [
                        ((255 - cmyk[0] as u16) * k / 255) as u8,
                        ((255 - cmyk[1] as u16) * k / 255) as u8,
                        ((255 - cmyk[2] as u16) * k / 255) as u8,
                    ]
                })
                .collect();
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use std::io::Cursor;

    fn pdf_with_image(image: Option<Stream>, media_box: [i64; 4]) -> Vec<u8> {
        let content = format!("q {} 0 0 {} 0 0 cm /Im0 Do Q", media_box[2], media_box[3]);
        pdf_with_content(image, media_box, &content)
    }

    fn pdf_with_content(image: Option<Stream>, media_box: [i64; 4], content: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut xobjects = Dictionary::new();
        if let Some(image) = image {
            let image_id = doc.add_object(image);
            xobjects.set("Im0", image_id);
        }
        let resources_id = doc.add_object(dictionary! { "XObject" => xobjects });
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => media_box.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn raw_gray_stream(width: u32, height: u32, value: u8) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![value; (width * height) as usize],
        )
    }

    #[test]
    fn test_rejects_non_pdf_bytes() {
        let document = RawDocument::new("photo.png", b"\x89PNG\r\n\x1a\nnot a pdf".to_vec());
        let result = PdfRasterizer::new(300).rasterize(&document);
        assert!(matches!(result, Err(VerifierError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_rejects_truncated_pdf() {
        let document = RawDocument::new("broken.pdf", b"%PDF-1.4\n%garbage".to_vec());
        let result = PdfRasterizer::new(300).rasterize(&document);
        assert!(matches!(result, Err(VerifierError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_extracts_embedded_image_at_target_dpi() {
        // 300 px across a 72 pt (one inch) page is already 300 dpi
        let bytes = pdf_with_image(Some(raw_gray_stream(300, 150, 40)), [0, 0, 72, 36]);
        let pages = PdfRasterizer::new(300)
            .rasterize(&RawDocument::new("card.pdf", bytes))
            .unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].dpi, 300);
        assert_eq!(pages[0].image.width(), 300);
        assert_eq!(pages[0].image.to_luma8().get_pixel(10, 10)[0], 40);
    }

    #[test]
    fn test_upsamples_low_resolution_scan() {
        // 100 px per inch should be scaled up three times
        let bytes = pdf_with_image(Some(raw_gray_stream(100, 50, 200)), [0, 0, 72, 36]);
        let pages = PdfRasterizer::new(300)
            .rasterize(&RawDocument::new("card.pdf", bytes))
            .unwrap();

        assert_eq!(pages[0].dpi, 300);
        assert_eq!(pages[0].image.width(), 300);
        assert_eq!(pages[0].image.height(), 150);
    }

    #[test]
    fn test_decodes_jpeg_image() {
        let gray = GrayImage::from_pixel(64, 32, Luma([90]));
        let mut jpeg = Vec::new();
        DynamicImage::ImageLuma8(gray)
            .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 64,
                "Height" => 32,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        );
        let bytes = pdf_with_image(Some(stream), [0, 0, 64, 32]);
        let pages = PdfRasterizer::new(72)
            .rasterize(&RawDocument::new("card.pdf", bytes))
            .unwrap();

        assert_eq!(pages[0].image.width(), 64);
        let pixel = pages[0].image.to_luma8().get_pixel(20, 10)[0];
        assert!((pixel as i32 - 90).abs() <= 4);
    }

    #[test]
    fn test_page_without_images_is_blank() {
        let bytes = pdf_with_image(None, [0, 0, 144, 72]);
        let pages = PdfRasterizer::new(100)
            .rasterize(&RawDocument::new("text.pdf", bytes))
            .unwrap();

        assert_eq!(pages[0].image.width(), 200);
        assert_eq!(pages[0].image.height(), 100);
        assert!(pages[0].image.to_luma8().pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_native_dpi_follows_image_placement() {
        // A 600 px card drawn two inches wide on an A4 page is 300 dpi
        let content = "q 1 0 0 1 100 500 cm q 144 0 0 72 0 0 cm /Im0 Do Q Q";
        let bytes = pdf_with_content(Some(raw_gray_stream(600, 300, 120)), [0, 0, 595, 842], content);
        let pages = PdfRasterizer::new(300)
            .rasterize(&RawDocument::new("a4.pdf", bytes))
            .unwrap();

        assert_eq!(pages[0].dpi, 300);
        assert_eq!(pages[0].image.width(), 600);
        assert_eq!(pages[0].image.height(), 300);
    }

    #[test]
    fn test_placement_matrix_composition() {
        let scaled = multiply([144.0, 0.0, 0.0, 72.0, 0.0, 0.0], [2.0, 0.0, 0.0, 2.0, 10.0, 20.0]);
        assert_eq!(scaled, [288.0, 0.0, 0.0, 144.0, 10.0, 20.0]);
    }
}
