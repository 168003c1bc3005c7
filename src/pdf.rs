//! pdfium-backed page source: bounds, clipped text extraction, render + crop.
//!
//! pdfium wraps a C++ library with thread-local state that is not safe to
//! call from async contexts, so every operation here clones the path, moves
//! onto `spawn_blocking`, and opens the document inside the blocking
//! closure. That is the same shape as a one-shot CLI run, and it keeps the
//! async runtime's worker threads free during CPU-heavy rasterisation.
//!
//! Coordinates: the public API speaks document space with a top-left origin
//! (like the clip geometry); pdfium's text API uses a bottom-left origin,
//! and the flip happens privately in [`clip_to_pdf_rect`].

use crate::error::KbError;
use crate::geometry::{ClipRect, PageBounds, PixelBox};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Handle to a source document. Cheap to clone; pages are loaded on demand.
#[derive(Debug, Clone)]
pub struct PdfSource {
    path: PathBuf,
    page_count: usize,
}

/// A rasterised page plus the scale that maps document points to its pixels.
pub struct RenderedPage {
    pub image: DynamicImage,
    /// Rendered image height / page height. Computed once per render.
    pub scale: f32,
}

impl RenderedPage {
    /// Crop to a pixel box (already clamped to the image bounds by
    /// [`crate::geometry::compute_crop_box`]).
    pub fn crop(&self, b: &PixelBox) -> DynamicImage {
        self.image.crop_imm(b.x0, b.y0, b.width(), b.height())
    }
}

impl PdfSource {
    /// Open a source document, validating the PDF magic bytes before pdfium
    /// ever sees the file, and caching the page count.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, KbError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(KbError::FileNotFound { path });
        }
        let mut magic = [0u8; 4];
        let mut file = std::fs::File::open(&path).map_err(|_| KbError::FileNotFound {
            path: path.clone(),
        })?;
        if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
            return Err(KbError::NotAPdf { path, magic });
        }

        let count_path = path.clone();
        let page_count = tokio::task::spawn_blocking(move || -> Result<usize, KbError> {
            let pdfium = Pdfium::default();
            let document = open_document(&pdfium, &count_path)?;
            Ok(document.pages().len() as usize)
        })
        .await
        .map_err(|e| KbError::Internal(format!("open task panicked: {e}")))??;

        info!("Opened '{}' with {} pages", path.display(), page_count);
        Ok(Self { path, page_count })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    fn check_ordinal(&self, page: usize) -> Result<(), KbError> {
        if page == 0 || page > self.page_count {
            return Err(KbError::PageOutOfRange {
                page,
                total: self.page_count,
            });
        }
        Ok(())
    }

    /// Geometric bounds of a page (1-based ordinal), top-left origin.
    pub async fn page_bounds(&self, page: usize) -> Result<PageBounds, KbError> {
        self.check_ordinal(page)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<PageBounds, KbError> {
            let pdfium = Pdfium::default();
            let document = open_document(&pdfium, &path)?;
            let pages = document.pages();
            let pdf_page = get_page(&pages, &path, page)?;
            Ok(PageBounds::new(
                0.0,
                0.0,
                pdf_page.width().value,
                pdf_page.height().value,
            ))
        })
        .await
        .map_err(|e| KbError::Internal(format!("bounds task panicked: {e}")))?
    }

    /// Selectable text inside the clip rectangle, verbatim. Deterministic,
    /// no model involved; may be empty for image-only pages.
    pub async fn extract_text(&self, page: usize, clip: ClipRect) -> Result<String, KbError> {
        self.check_ordinal(page)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<String, KbError> {
            let pdfium = Pdfium::default();
            let document = open_document(&pdfium, &path)?;
            let pages = document.pages();
            let pdf_page = get_page(&pages, &path, page)?;
            let text = pdf_page.text().map_err(|e| KbError::CorruptPdf {
                path: path.clone(),
                detail: format!("{e:?}"),
            })?;
            let rect = clip_to_pdf_rect(clip, pdf_page.height().value);
            Ok(text.inside_rect(rect))
        })
        .await
        .map_err(|e| KbError::Internal(format!("extract task panicked: {e}")))?
    }

    /// Rasterise a full page, capped at `max_pixels` on either dimension,
    /// and compute its render scale.
    pub async fn render_page(&self, page: usize, max_pixels: u32) -> Result<RenderedPage, KbError> {
        self.check_ordinal(page)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<RenderedPage, KbError> {
            let pdfium = Pdfium::default();
            let document = open_document(&pdfium, &path)?;
            let pages = document.pages();
            let pdf_page = get_page(&pages, &path, page)?;

            let render_config = PdfRenderConfig::new()
                .set_target_width(max_pixels as i32)
                .set_maximum_height(max_pixels as i32);

            let bitmap =
                pdf_page
                    .render_with_config(&render_config)
                    .map_err(|e| KbError::CorruptPdf {
                        path: path.clone(),
                        detail: format!("rasterisation failed: {e:?}"),
                    })?;
            let image = bitmap.as_image();

            let page_height = pdf_page.height().value;
            if page_height <= 0.0 {
                return Err(KbError::InvalidScale { scale: 0.0 });
            }
            let scale = image.height() as f32 / page_height;

            debug!(
                "Rendered page {} → {}x{} px (scale {:.4})",
                page,
                image.width(),
                image.height(),
                scale
            );
            Ok(RenderedPage { image, scale })
        })
        .await
        .map_err(|e| KbError::Internal(format!("render task panicked: {e}")))?
    }
}

fn open_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, KbError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| KbError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}

fn get_page<'a>(
    pages: &PdfPages<'a>,
    path: &Path,
    page: usize,
) -> Result<PdfPage<'a>, KbError> {
    pages
        .get((page - 1) as u16)
        .map_err(|e| KbError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("page {page}: {e:?}"),
        })
}

/// Flip a top-left-origin clip rectangle into pdfium's bottom-left space.
fn clip_to_pdf_rect(clip: ClipRect, page_height: f32) -> PdfRect {
    PdfRect::new(
        PdfPoints::new(page_height - clip.y1),
        PdfPoints::new(clip.x0),
        PdfPoints::new(page_height - clip.y0),
        PdfPoints::new(clip.x1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_rect_flips_vertical_axis() {
        let clip = ClipRect {
            x0: 10.0,
            y0: 60.0,
            x1: 600.0,
            y1: 762.0,
        };
        let rect = clip_to_pdf_rect(clip, 792.0);
        assert_eq!(rect.bottom().value, 30.0);
        assert_eq!(rect.top().value, 732.0);
        assert_eq!(rect.left().value, 10.0);
        assert_eq!(rect.right().value, 600.0);
    }

    // Validation happens before pdfium is loaded, so these run without a
    // libpdfium on the test machine.

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = PdfSource::open(dir.path().join("nope.pdf")).await.unwrap_err();
        assert!(matches!(err, KbError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_magic_bytes_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"<html>not a pdf</html>").unwrap();

        let err = PdfSource::open(&path).await.unwrap_err();
        match err {
            KbError::NotAPdf { magic, .. } => assert_eq!(&magic, b"<htm"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
