//! Image export: [`RasterSurface`] → PNG [`ImageArtifact`].
//!
//! PNG is lossless, so "maximum quality" needs no extra knob: the only
//! compression applied is the format's own. The same encoder also produces
//! the base64 `ImageData` attached to vision-model requests.

use crate::error::ConversionError;
use crate::pipeline::render::RasterSurface;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{ImageFormat, RgbaImage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

pub const IMAGE_MEDIA_TYPE: &str = "image/png";
pub const IMAGE_EXTENSION: &str = "png";

static RE_PDF_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.pdf$").unwrap());

/// The encoded output of a conversion. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    pub name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

impl ImageArtifact {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// `report.pdf` / `report.PDF` → `report.png`; any other name gets `.png` appended.
pub fn output_name(suggested: &str) -> String {
    let base = RE_PDF_SUFFIX.replace(suggested, "");
    format!("{base}.{IMAGE_EXTENSION}")
}

/// PNG-encode an RGBA bitmap.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Encode `surface` and name it after `suggested_name`.
pub fn export(surface: &RasterSurface, suggested_name: &str) -> Result<ImageArtifact, ConversionError> {
    let bytes = encode_png(&surface.image).map_err(|e| ConversionError::Encode {
        detail: e.to_string(),
    })?;
    if bytes.is_empty() {
        return Err(ConversionError::Encode {
            detail: "encoder produced no payload".into(),
        });
    }

    let name = output_name(suggested_name);
    debug!("Encoded {} → {} bytes PNG", name, bytes.len());

    Ok(ImageArtifact {
        name,
        media_type: IMAGE_MEDIA_TYPE.to_string(),
        bytes: bytes.into(),
        width: surface.width(),
        height: surface.height(),
    })
}

/// Encode a page image as a base64 PNG for the vision-model request.
///
/// `detail: "high"` lets GPT-4-class models tile the full page instead of
/// reading a single downscaled overview.
pub fn encode_for_vision(image: &RgbaImage) -> Result<ImageData, image::ImageError> {
    let buf = encode_png(image)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, IMAGE_MEDIA_TYPE).with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::PageSize;
    use image::Rgba;

    fn surface(w: u32, h: u32) -> RasterSurface {
        RasterSurface {
            image: RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])),
            page: 1,
            scale: 1.0,
            page_size: PageSize {
                width: w as f32,
                height: h as f32,
            },
        }
    }

    #[test]
    fn output_name_strips_pdf_suffix_case_insensitively() {
        assert_eq!(output_name("report.pdf"), "report.png");
        assert_eq!(output_name("Report.PDF"), "Report.png");
        assert_eq!(output_name("cv.final.Pdf"), "cv.final.png");
    }

    #[test]
    fn output_name_appends_when_no_pdf_suffix() {
        assert_eq!(output_name("notes.txt"), "notes.txt.png");
        assert_eq!(output_name("resume"), "resume.png");
        assert_eq!(output_name("pdf"), "pdf.png");
        assert_eq!(output_name("a.pdf.bak"), "a.pdf.bak.png");
    }

    #[test]
    fn export_produces_png_artifact() {
        let a = export(&surface(10, 12), "report.pdf").expect("export");
        assert_eq!(a.name, "report.png");
        assert_eq!(a.media_type, "image/png");
        assert_eq!((a.width, a.height), (10, 12));
        assert!(a.bytes.starts_with(b"\x89PNG"));

        let back = image::load_from_memory_with_format(&a.bytes, ImageFormat::Png)
            .unwrap()
            .into_rgba8();
        assert_eq!(back.dimensions(), (10, 12));
        assert_eq!(back.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn vision_payload_is_base64_png() {
        let data = encode_for_vision(&RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))).unwrap();
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(b"\x89PNG"));
    }
}
