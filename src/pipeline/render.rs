//! PDF rasterisation: render one page of in-memory PDF bytes to a PNG.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! [`render_page`] moves the work onto Tokio's blocking pool so the async
//! workers keep fetching and uploading other pages while one renders.
//!
//! ## Handle lifetimes
//!
//! The document, page and bitmap handles are plain locals inside
//! [`PdfiumRenderer::render_with`]. They are released when that function
//! returns, on the error paths as well, so hundreds of page conversions in
//! one process do not accumulate native memory.

use crate::error::PageError;
use crate::pipeline::encode;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

static PDFIUM_LOCK: Mutex<()> = Mutex::new(());

/// Output of rendering one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Opaque RGB PNG.
    pub png: Vec<u8>,
    /// URI link targets in the order pdfium reports them; duplicates kept.
    pub embedded_links: Vec<String>,
    pub width: u32,
    pub height: u32,
}

/// Capability boundary around a PDF rasteriser.
///
/// Both methods are blocking; call them through [`render_page`] /
/// [`count_pages`] from async code.
pub trait PageRenderer: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, pdf: &[u8]) -> Result<u32, PageError>;

    /// Render page `page_index` (0-based) at `scale` × 72 DPI.
    ///
    /// Fails with [`PageError::OutOfRange`] when `page_index` is not below
    /// the page count and [`PageError::Decode`] when `pdf` cannot be opened.
    fn render(&self, pdf: &[u8], page_index: u32, scale: f32) -> Result<RenderedPage, PageError>;
}

/// Render a page on the blocking pool.
pub async fn render_page(
    renderer: Arc<dyn PageRenderer>,
    pdf: Vec<u8>,
    page_index: u32,
    scale: f32,
) -> Result<RenderedPage, PageError> {
    tokio::task::spawn_blocking(move || renderer.render(&pdf, page_index, scale))
        .await
        .map_err(|e| PageError::Render {
            page: page_index + 1,
            detail: format!("Render task panicked: {}", e),
        })?
}

/// Count pages on the blocking pool.
pub async fn count_pages(renderer: Arc<dyn PageRenderer>, pdf: Vec<u8>) -> Result<u32, PageError> {
    tokio::task::spawn_blocking(move || renderer.page_count(&pdf))
        .await
        .map_err(|e| PageError::RendererUnavailable(format!("Page count task panicked: {}", e)))?
}

/// [`PageRenderer`] backed by pdfium.
///
/// pdfium serialises every call internally, so renders are also serialised
/// here. The lock is process-wide: it also keeps library initialisation and
/// teardown of separate renderer instances from interleaving.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    lib_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    /// Bind to the system pdfium library on each use.
    pub fn new() -> Self {
        Self { lib_path: None }
    }

    /// Bind to the pdfium library at `path` on each use.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            lib_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, PageError> {
        let bindings = match &self.lib_path {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| PageError::RendererUnavailable(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }

    fn with_pdfium<T>(
        &self,
        f: impl FnOnce(&Pdfium) -> Result<T, PageError>,
    ) -> Result<T, PageError> {
        let _guard = PDFIUM_LOCK
            .lock()
            .map_err(|_| PageError::RendererUnavailable("renderer lock poisoned".into()))?;
        let pdfium = self.bind()?;
        f(&pdfium)
    }

    fn open<'a>(
        pdfium: &'a Pdfium,
        pdf: &'a [u8],
        page: u32,
    ) -> Result<PdfDocument<'a>, PageError> {
        pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| PageError::Decode {
                page,
                detail: format!("{:?}", e),
            })
    }

    fn render_with(
        pdfium: &Pdfium,
        pdf: &[u8],
        page_index: u32,
        scale: f32,
    ) -> Result<RenderedPage, PageError> {
        let page_number = page_index + 1;
        let document = Self::open(pdfium, pdf, page_number)?;
        let pages = document.pages();
        let total = pages.len() as u32;
        if page_index >= total {
            return Err(PageError::OutOfRange {
                page: page_number,
                total,
            });
        }

        let page = pages
            .get(page_index as u16)
            .map_err(|e| PageError::Render {
                page: page_number,
                detail: format!("{:?}", e),
            })?;

        let embedded_links: Vec<String> = page
            .links()
            .iter()
            .filter_map(|link| match link.action() {
                Some(PdfAction::Uri(action)) => action.uri().ok(),
                _ => None,
            })
            .collect();

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_clear_color(PdfColor::WHITE);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PageError::Render {
                page: page_number,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        let (width, height) = (image.width(), image.height());
        let png = encode::encode_png(&image).map_err(|e| PageError::Render {
            page: page_number,
            detail: format!("PNG encoding failed: {}", e),
        })?;

        debug!(
            "Rendered page {} → {}x{} px, {} links",
            page_number,
            width,
            height,
            embedded_links.len()
        );

        Ok(RenderedPage {
            png,
            embedded_links,
            width,
            height,
        })
    }
}

impl Default for PdfiumRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf: &[u8]) -> Result<u32, PageError> {
        self.with_pdfium(|pdfium| {
            let document = Self::open(pdfium, pdf, 0)?;
            Ok(document.pages().len() as u32)
        })
    }

    fn render(&self, pdf: &[u8], page_index: u32, scale: f32) -> Result<RenderedPage, PageError> {
        self.with_pdfium(|pdfium| Self::render_with(pdfium, pdf, page_index, scale))
    }
}
