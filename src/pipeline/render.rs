//! Page rasterisation behind the [`PageRenderer`] seam.
//!
//! pdfium uses thread-local state and blocks on CPU work, so every call goes
//! through `tokio::task::spawn_blocking`. [`PdfiumRenderer`] opens the
//! document afresh for each page and drops the bitmap, page and document
//! handles before returning: with rolls running to thousands of pages, at
//! most one page image is alive at a time and no pdfium handle outlives the
//! call that created it.

use crate::error::{PageError, RollError};
use crate::output::DocumentMetadata;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const POINTS_PER_INCH: f32 = 72.0;

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-indexed page number in the document.
    pub page_num: usize,
    /// Resolution the page was rendered at.
    pub dpi: u32,
    pub image: DynamicImage,
}

impl RenderedPage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Rasterises one page of an already-opened document.
///
/// Opening the document is the fatal step and happens before a renderer
/// exists; a failure here only costs the page.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Total pages in the document.
    fn page_count(&self) -> usize;

    /// Render the 0-indexed page at `dpi`.
    async fn render_page(&self, page_index: usize, dpi: u32) -> Result<RenderedPage, PageError>;
}

/// [`PageRenderer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    path: PathBuf,
    password: Option<String>,
    max_pixels: u32,
    metadata: DocumentMetadata,
}

impl PdfiumRenderer {
    /// Open the roll, reading its metadata. Every failure here is fatal.
    pub async fn open(
        path: &Path,
        password: Option<&str>,
        max_pixels: u32,
    ) -> Result<Self, RollError> {
        let metadata = extract_metadata(path, password).await?;
        info!(pages = metadata.page_count, "Roll opened");
        Ok(Self {
            path: path.to_path_buf(),
            password: password.map(str::to_string),
            max_pixels,
            metadata,
        })
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    fn page_count(&self) -> usize {
        self.metadata.page_count
    }

    async fn render_page(&self, page_index: usize, dpi: u32) -> Result<RenderedPage, PageError> {
        let page_num = page_index + 1;
        let path = self.path.clone();
        let password = self.password.clone();
        let max_pixels = self.max_pixels;

        let image = tokio::task::spawn_blocking(move || {
            render_page_blocking(&path, password.as_deref(), max_pixels, page_index, dpi)
        })
        .await
        .map_err(|e| format!("render task panicked: {e}"))
        .and_then(|r| r)
        .map_err(|detail| PageError::RenderFailed {
            page: page_num,
            dpi,
            detail,
        })?;

        debug!(
            page = page_num,
            dpi,
            width = image.width(),
            height = image.height(),
            "Rendered page"
        );

        Ok(RenderedPage {
            page_num,
            dpi,
            image,
        })
    }
}

fn render_page_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    max_pixels: u32,
    page_index: usize,
    dpi: u32,
) -> Result<DynamicImage, String> {
    let pdfium = bind_pdfium().map_err(|e| e.to_string())?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| format!("{e:?}"))?;

    let index = u16::try_from(page_index)
        .map_err(|_| format!("page index {page_index} exceeds u16 maximum"))?;
    let page = document
        .pages()
        .get(index)
        .map_err(|e| format!("{e:?}"))?;

    let (width, height) =
        target_dimensions(page.width().value, page.height().value, dpi, max_pixels);

    let render_config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_maximum_height(height as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| format!("{e:?}"))?;

    Ok(bitmap.as_image())
}

/// Pixel size for a page of the given size in points at `dpi`, with the
/// longest edge capped at `max_pixels` and aspect ratio preserved.
pub fn target_dimensions(
    width_points: f32,
    height_points: f32,
    dpi: u32,
    max_pixels: u32,
) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let longest = raw_w.max(raw_h);
    if longest <= max_pixels as f32 {
        return (raw_w as u32, raw_h as u32);
    }

    warn!(
        raw_width = raw_w as u32,
        raw_height = raw_h as u32,
        max_pixels,
        "Page dimensions capped"
    );
    let ratio = max_pixels as f32 / longest;
    let w = ((raw_w * ratio) as u32).clamp(1, max_pixels);
    let h = ((raw_h * ratio) as u32).clamp(1, max_pixels);
    (w, h)
}

/// Bind pdfium: `PDFIUM_DYNAMIC_LIB_PATH`, then the working directory, then
/// the system library path.
fn bind_pdfium() -> Result<Pdfium, RollError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        if !path.is_empty() {
            return Pdfium::bind_to_library(&path)
                .map(Pdfium::new)
                .map_err(|e| RollError::PdfiumBindingFailed(format!("{path}: {e}")));
        }
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| RollError::PdfiumBindingFailed(e.to_string()))
}

fn map_load_error(e: PdfiumError, path: &Path, password: Option<&str>) -> RollError {
    let detail = format!("{e:?}");
    if detail.to_lowercase().contains("password") {
        if password.is_some() {
            RollError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            RollError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        RollError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}

/// Read document metadata without rendering any page.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, RollError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| RollError::Internal(format!("Metadata task panicked: {e}")))?
}

fn extract_metadata_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, RollError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| map_load_error(e, pdf_path, password))?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}
