//! Page rasterisation: PDF bytes → [`RasterSurface`].
//!
//! ## Why spawn_blocking?
//!
//! pdfium is CPU-bound and keeps thread-local state. [`rasterize`] moves the
//! decode and render onto the blocking pool so the async workers keep
//! serving uploads and storage calls while a page paints.
//!
//! ## Sizing
//!
//! The surface is the page's intrinsic size in points multiplied by the
//! scale, truncated to whole pixels, with no padding or cropping. At the
//! default scale of 4 a 612×792 pt page becomes 2448×3168 px.
//!
//! A viewport larger than `max_pixels` is refused before the engine is asked
//! to allocate anything; pages are never downscaled to fit.
//!
//! The engine is reached through [`PdfEngine`] so the pipeline can run
//! against a stub in tests and against pdfium in production.

use crate::convert::ConversionStage;
use crate::error::ConversionError;
use crate::library::LibraryHandle;
use crate::progress::{emit_stage, ProgressCallback};
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Intrinsic page size in PDF points (1/72 in).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// An initialised PDF rendering library.
pub trait PdfEngine: Send + Sync {
    /// Human-readable identification, e.g. `pdfium 7690`.
    fn describe(&self) -> String;

    /// Parse a document held in memory.
    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn PdfDoc + 'a>, String>;
}

/// A parsed document. Page indices are 0-based here.
pub trait PdfDoc {
    fn page_count(&self) -> usize;

    fn page_size(&self, index: usize) -> Result<PageSize, String>;

    /// Paint page `index` into a `width`×`height` RGBA bitmap.
    fn render(&self, index: usize, width: u32, height: u32) -> Result<RgbaImage, String>;
}

/// A fully painted page.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    pub image: RgbaImage,
    /// 1-indexed page number.
    pub page: usize,
    pub scale: f32,
    pub page_size: PageSize,
}

impl RasterSurface {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Pixel dimensions of a page at `scale`.
///
/// Returns `None` for non-finite or non-positive results.
pub fn viewport(size: PageSize, scale: f32) -> Option<(u32, u32)> {
    // Tolerate float noise just below an integer (e.g. 2447.9998).
    let px = |pts: f32| -> Option<u32> {
        let v = (pts as f64) * (scale as f64);
        if !v.is_finite() || v < 1.0 || v > u32::MAX as f64 {
            return None;
        }
        Some((v + 1e-4).floor() as u32)
    };
    Some((px(size.width)?, px(size.height)?))
}

/// Rasterise `page` (1-indexed) of `bytes` on the blocking pool.
pub async fn rasterize(
    handle: &LibraryHandle,
    bytes: Arc<[u8]>,
    page: usize,
    scale: f32,
    max_pixels: u64,
    progress: Option<ProgressCallback>,
) -> Result<RasterSurface, ConversionError> {
    let engine = Arc::clone(handle);
    tokio::task::spawn_blocking(move || {
        rasterize_blocking(engine.as_ref(), &bytes, page, scale, max_pixels, progress.as_ref())
    })
    .await
    .map_err(|e| ConversionError::Render {
        page,
        detail: format!("render task panicked: {e}"),
    })?
}

/// Blocking implementation of [`rasterize`].
pub fn rasterize_blocking(
    engine: &dyn PdfEngine,
    bytes: &[u8],
    page: usize,
    scale: f32,
    max_pixels: u64,
    progress: Option<&ProgressCallback>,
) -> Result<RasterSurface, ConversionError> {
    emit_stage(progress, ConversionStage::Decoding);

    if bytes.is_empty() {
        return Err(ConversionError::Decode {
            detail: "document is empty".into(),
        });
    }

    let doc = engine
        .open(bytes)
        .map_err(|detail| ConversionError::Decode { detail })?;

    let total = doc.page_count();
    info!("Document decoded: {} pages", total);
    if page == 0 || page > total {
        return Err(ConversionError::PageRange { page, total });
    }
    let index = page - 1;

    emit_stage(progress, ConversionStage::Rendering);

    let render_err = |detail: String| ConversionError::Render { page, detail };

    let size = doc.page_size(index).map_err(render_err)?;
    let (width, height) = viewport(size, scale).ok_or_else(|| {
        render_err(format!(
            "invalid viewport for {}x{} pt at scale {scale}",
            size.width, size.height
        ))
    })?;
    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        return Err(render_err(format!(
            "{width}x{height} px exceeds the {max_pixels} pixel budget"
        )));
    }

    let image = doc.render(index, width, height).map_err(render_err)?;
    if image.dimensions() != (width, height) {
        return Err(render_err(format!(
            "engine painted {}x{} px, expected {}x{}",
            image.width(),
            image.height(),
            width,
            height
        )));
    }

    debug!("Rendered page {} → {}x{} px", page, width, height);

    Ok(RasterSurface {
        image,
        page,
        scale,
        page_size: size,
    })
}

// ── pdfium ────────────────────────────────────────────────────────────────

/// [`PdfEngine`] backed by a bound pdfium library.
pub struct PdfiumEngine {
    pdfium: Pdfium,
    version: Option<String>,
}

impl PdfiumEngine {
    pub fn new(pdfium: Pdfium, version: Option<String>) -> Self {
        Self { pdfium, version }
    }
}

impl PdfEngine for PdfiumEngine {
    fn describe(&self) -> String {
        match self.version {
            Some(ref v) => format!("pdfium {v}"),
            None => "pdfium (PDFIUM_LIB_PATH)".to_string(),
        }
    }

    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn PdfDoc + 'a>, String> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| format!("{:?}", e))?;
        Ok(Box::new(PdfiumDoc { document }))
    }
}

struct PdfiumDoc<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumDoc<'a> {
    fn page(&self, index: usize) -> Result<PdfPage<'a>, String> {
        let index = u16::try_from(index).map_err(|_| format!("page index {index} too large"))?;
        self.document
            .pages()
            .get(index)
            .map_err(|e| format!("{:?}", e))
    }
}

impl PdfDoc for PdfiumDoc<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_size(&self, index: usize) -> Result<PageSize, String> {
        let page = self.page(index)?;
        Ok(PageSize {
            width: page.width().value,
            height: page.height().value,
        })
    }

    fn render(&self, index: usize, width: u32, height: u32) -> Result<RgbaImage, String> {
        let page = self.page(index)?;
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32)
            .set_text_smoothing(true)
            .set_image_smoothing(true)
            .set_path_smoothing(true);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| format!("{:?}", e))?;
        Ok(bitmap.as_image().into_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const BUDGET: u64 = 1_000_000;

    struct OnePage;

    struct OnePageDoc;

    impl PdfEngine for OnePage {
        fn describe(&self) -> String {
            "stub".into()
        }
        fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn PdfDoc + 'a>, String> {
            if bytes.starts_with(b"%PDF") {
                Ok(Box::new(OnePageDoc))
            } else {
                Err("missing %PDF header".into())
            }
        }
    }

    impl PdfDoc for OnePageDoc {
        fn page_count(&self) -> usize {
            1
        }
        fn page_size(&self, _index: usize) -> Result<PageSize, String> {
            Ok(PageSize {
                width: 10.0,
                height: 20.0,
            })
        }
        fn render(&self, _index: usize, w: u32, h: u32) -> Result<RgbaImage, String> {
            Ok(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
        }
    }

    #[test]
    fn viewport_scales_letter_page() {
        let letter = PageSize {
            width: 612.0,
            height: 792.0,
        };
        assert_eq!(viewport(letter, 4.0), Some((2448, 3168)));
    }

    #[test]
    fn viewport_truncates_fractional_pixels() {
        let a4 = PageSize {
            width: 595.28,
            height: 841.89,
        };
        assert_eq!(viewport(a4, 1.0), Some((595, 841)));
    }

    #[test]
    fn viewport_rejects_degenerate_sizes() {
        let zero = PageSize {
            width: 0.0,
            height: 10.0,
        };
        assert_eq!(viewport(zero, 4.0), None);
        let nan = PageSize {
            width: f32::NAN,
            height: 10.0,
        };
        assert_eq!(viewport(nan, 4.0), None);
    }

    #[test]
    fn empty_input_fails_before_engine() {
        let err = rasterize_blocking(&OnePage, b"", 1, 4.0, BUDGET, None).unwrap_err();
        assert!(matches!(err, ConversionError::Decode { .. }));
    }

    #[test]
    fn non_pdf_is_decode_error() {
        let err = rasterize_blocking(&OnePage, b"hello", 1, 4.0, BUDGET, None).unwrap_err();
        assert_eq!(
            err,
            ConversionError::Decode {
                detail: "missing %PDF header".into()
            }
        );
    }

    #[test]
    fn page_out_of_range() {
        let err = rasterize_blocking(&OnePage, b"%PDF", 2, 4.0, BUDGET, None).unwrap_err();
        assert_eq!(err, ConversionError::PageRange { page: 2, total: 1 });
        let err = rasterize_blocking(&OnePage, b"%PDF", 0, 4.0, BUDGET, None).unwrap_err();
        assert_eq!(err, ConversionError::PageRange { page: 0, total: 1 });
    }

    #[test]
    fn surface_matches_viewport() {
        let s = rasterize_blocking(&OnePage, b"%PDF", 1, 4.0, BUDGET, None).unwrap();
        assert_eq!((s.width(), s.height()), (40, 80));
        assert_eq!(s.page, 1);
    }

    /// Paints nothing; records the last requested size.
    struct Poster {
        asked: std::sync::Mutex<Option<(u32, u32)>>,
    }

    struct PosterDoc<'a>(&'a Poster);

    impl PdfEngine for Poster {
        fn describe(&self) -> String {
            "poster".into()
        }
        fn open<'a>(&'a self, _bytes: &'a [u8]) -> Result<Box<dyn PdfDoc + 'a>, String> {
            Ok(Box::new(PosterDoc(self)))
        }
    }

    impl PdfDoc for PosterDoc<'_> {
        fn page_count(&self) -> usize {
            1
        }
        fn page_size(&self, _index: usize) -> Result<PageSize, String> {
            Ok(PageSize {
                width: 14400.0,
                height: 14400.0,
            })
        }
        fn render(&self, _index: usize, w: u32, h: u32) -> Result<RgbaImage, String> {
            *self.0.asked.lock().unwrap() = Some((w, h));
            Err("refusing to allocate".into())
        }
    }

    #[test]
    fn oversized_viewport_is_refused_before_render() {
        let engine = Poster {
            asked: std::sync::Mutex::new(None),
        };
        let err = rasterize_blocking(&engine, b"%PDF", 1, 4.0, 40_000_000, None).unwrap_err();
        assert_eq!(err.stage(), "render");
        assert!(err.to_string().contains("57600x57600"), "{err}");
        assert_eq!(*engine.asked.lock().unwrap(), None);
    }

    #[test]
    fn viewport_at_budget_is_rendered_unscaled() {
        // 10×20 pt at 4× is exactly 3200 px.
        let s = rasterize_blocking(&OnePage, b"%PDF", 1, 4.0, 3200, None).unwrap();
        assert_eq!((s.width(), s.height()), (40, 80));
        assert!(rasterize_blocking(&OnePage, b"%PDF", 1, 4.0, 3199, None).is_err());
    }
}
